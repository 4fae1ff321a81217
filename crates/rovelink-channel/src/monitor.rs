use std::time::Instant;

use crate::config::Timings;

/// What the liveness monitor wants done on this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessCheck {
    /// Nothing has been sent for the idle-send threshold.
    pub heartbeat_due: bool,
    /// Nothing has been received for the idle-connection timeout.
    pub receive_timed_out: bool,
    /// A provisional connection outlived the verification window.
    pub verify_expired: bool,
}

/// Send/receive timestamps of the current connection.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    timings: Timings,
    last_send: Instant,
    last_receive: Instant,
}

impl LivenessMonitor {
    pub fn new(timings: Timings, now: Instant) -> Self {
        Self {
            timings,
            last_send: now,
            last_receive: now,
        }
    }

    /// Restart both clocks, e.g. when a connection is established.
    pub fn reset(&mut self, now: Instant) {
        self.last_send = now;
        self.last_receive = now;
    }

    pub fn record_send(&mut self, now: Instant) {
        self.last_send = now;
    }

    pub fn record_receive(&mut self, now: Instant) {
        self.last_receive = now;
    }

    pub fn last_send(&self) -> Instant {
        self.last_send
    }

    pub fn last_receive(&self) -> Instant {
        self.last_receive
    }

    /// Evaluate the three checks.
    ///
    /// The idle checks only apply while `connected`; the verification check
    /// only while a provisional connection opened at `verifying_since`.
    pub fn check(
        &self,
        now: Instant,
        connected: bool,
        verifying_since: Option<Instant>,
    ) -> LivenessCheck {
        let t = &self.timings;
        LivenessCheck {
            heartbeat_due: connected
                && now.saturating_duration_since(self.last_send) >= t.idle_send_threshold,
            receive_timed_out: connected
                && now.saturating_duration_since(self.last_receive) >= t.idle_connection_timeout,
            verify_expired: verifying_since
                .is_some_and(|since| now.saturating_duration_since(since) >= t.tcp_verify_window),
        }
    }
}
