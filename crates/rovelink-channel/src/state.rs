use std::fmt;
use std::time::Instant;

use serde::Serialize;

/// Externally visible connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Connecting,
    Connected,
    /// Lost or closed; a reconnect follows unless the channel was closed.
    Disconnected,
    /// The local socket resource is unusable. Terminal.
    FatalError,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::Disconnected => "disconnected",
            Status::FatalError => "fatal-error",
        };
        f.write_str(s)
    }
}

/// Internal connection phase. Several phases share one [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Constructed, not yet opened.
    Created,
    /// Closed by the owner.
    Closed,
    /// Server waiting for a client handshake (UDP) or stream (TCP).
    AwaitingPeer,
    /// TCP client waiting to start its next dial.
    DialPending,
    /// TCP client dial in flight.
    Dialing,
    /// Client handshake sent, waiting for the server's reply.
    Handshaking { since: Instant },
    /// TCP server holding an unverified stream.
    Verifying { since: Instant },
    Connected,
    /// Connection lost; the next monitor tick restarts it.
    Reconnecting,
    Fatal,
}

impl Phase {
    pub(crate) fn status(self) -> Status {
        match self {
            Phase::Created
            | Phase::AwaitingPeer
            | Phase::DialPending
            | Phase::Dialing
            | Phase::Handshaking { .. }
            | Phase::Verifying { .. } => Status::Connecting,
            Phase::Connected => Status::Connected,
            Phase::Closed | Phase::Reconnecting => Status::Disconnected,
            Phase::Fatal => Status::FatalError,
        }
    }

    /// Whether connection attempts are running.
    pub(crate) fn is_open(self) -> bool {
        !matches!(self, Phase::Created | Phase::Closed | Phase::Fatal)
    }
}

/// Phase tracking with de-duplicated status transitions.
#[derive(Debug)]
pub(crate) struct ConnectionState {
    phase: Phase,
    status: Status,
    was_connected: bool,
}

impl ConnectionState {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Created,
            status: Status::Connecting,
            was_connected: false,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn was_connected(&self) -> bool {
        self.was_connected
    }

    /// Move to `next`. Returns the new status only when it differs from the
    /// previous one. `Fatal` is absorbing.
    pub(crate) fn enter(&mut self, next: Phase) -> Option<Status> {
        if self.phase == Phase::Fatal {
            return None;
        }
        self.phase = next;
        let status = next.status();
        if status == Status::Connected {
            self.was_connected = true;
        }
        if status == self.status {
            return None;
        }
        self.status = status;
        Some(status)
    }
}
