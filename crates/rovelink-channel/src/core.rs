use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use rovelink_frame::{
    decode_udp, encode_tcp, encode_udp, Message, MessageId, MessageType, Protocol, TcpCodec,
    MAX_MESSAGE_LENGTH,
};
use rovelink_transport::TransportError;
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ChannelConfig, Role};
use crate::error::{ChannelError, Result};
use crate::event::ChannelEvent;
use crate::handshake::{handshake_message, verify_handshake};
use crate::monitor::LivenessMonitor;
use crate::qos::QosSampler;
use crate::state::{ConnectionState, Phase, Status};

/// First sequence id a channel hands out.
pub const INITIAL_SEND_ID: MessageId = 1;

/// Side effects requested by [`ChannelCore`], drained with
/// [`ChannelCore::poll_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Send one UDP datagram.
    Datagram { to: SocketAddr, bytes: Bytes },
    /// Write bytes to the current TCP stream.
    Stream(Bytes),
    /// Open a TCP stream to the address.
    Dial(SocketAddr),
    /// Drop the current TCP stream and any dial in flight.
    DropStream,
    /// Notify observers.
    Event(ChannelEvent),
}

/// Connection logic of one channel, free of I/O.
///
/// Every input carries the time it happened at. The driver feeds socket
/// readiness, stream lifecycle and monitor ticks in, then executes the
/// queued [`Output`]s in order.
#[derive(Debug)]
pub struct ChannelCore {
    config: ChannelConfig,
    state: ConnectionState,
    monitor: LivenessMonitor,
    qos: QosSampler,
    next_send_id: MessageId,
    last_received_id: Option<MessageId>,
    peer: Option<SocketAddr>,
    /// Stream peer of a TCP connection that has not been verified yet.
    pending_peer: Option<SocketAddr>,
    read_ahead: BytesMut,
    codec: TcpCodec,
    last_error: Option<String>,
    outputs: VecDeque<Output>,
}

impl ChannelCore {
    pub fn new(config: ChannelConfig, now: Instant) -> Self {
        Self {
            monitor: LivenessMonitor::new(config.timings, now),
            qos: QosSampler::new(config.timings.qos_interval),
            config,
            state: ConnectionState::new(),
            next_send_id: INITIAL_SEND_ID,
            last_received_id: None,
            peer: None,
            pending_peer: None,
            read_ahead: BytesMut::new(),
            codec: TcpCodec::new(),
            last_error: None,
            outputs: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn was_connected(&self) -> bool {
        self.state.was_connected()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn messages_up(&self) -> u64 {
        self.qos.messages_up()
    }

    pub fn messages_down(&self) -> u64 {
        self.qos.messages_down()
    }

    /// Whether connection attempts are running.
    pub fn is_open(&self) -> bool {
        self.state.phase().is_open()
    }

    /// Whether a TCP server is ready to take a new stream.
    pub fn awaiting_stream(&self) -> bool {
        self.config.protocol == Protocol::Tcp && self.state.phase() == Phase::AwaitingPeer
    }

    pub fn poll_output(&mut self) -> Option<Output> {
        self.outputs.pop_front()
    }

    /// Enter the fatal state. Nothing is retried afterwards.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(%reason, "channel failed");
        self.drop_stream();
        self.last_error = Some(reason.clone());
        self.enter(Phase::Fatal, Some(reason));
    }

    /// Begin connection attempts. Returns false if already open or failed.
    pub fn open(&mut self, now: Instant) -> bool {
        match self.state.phase() {
            Phase::Fatal => {
                warn!("open ignored, channel has failed");
                false
            }
            Phase::Created | Phase::Closed => {
                info!(address = %self.config.address, "opening channel");
                self.start(now);
                true
            }
            _ => false,
        }
    }

    /// Stop connection attempts. Returns false if there was nothing to stop,
    /// so teardown runs at most once per open.
    pub fn close(&mut self, now: Instant) -> bool {
        if matches!(self.state.phase(), Phase::Closed | Phase::Fatal) {
            return false;
        }
        info!("closing channel");
        self.drop_stream();
        self.reset_connection_vars(now);
        self.enter(Phase::Closed, None);
        true
    }

    /// Frame and transmit an application payload.
    pub fn send_message(&mut self, now: Instant, payload: Bytes) -> Result<MessageId> {
        if payload.len() > MAX_MESSAGE_LENGTH {
            warn!(size = payload.len(), "outbound message rejected, payload too large");
            return Err(ChannelError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_LENGTH,
            });
        }
        if self.state.phase() != Phase::Connected {
            let status = self.status();
            warn!(%status, "outbound message rejected, channel not connected");
            return Err(ChannelError::NotConnected(status));
        }

        let id = self.take_id()?;
        self.transmit(now, &Message::normal(id, payload));
        self.qos.record_sent(id, now);
        Ok(id)
    }

    /// Periodic liveness tick.
    pub fn tick(&mut self, now: Instant) {
        match self.state.phase() {
            Phase::Reconnecting => {
                info!("reconnecting");
                self.start(now);
            }
            Phase::DialPending => self.dial(),
            Phase::Handshaking { since } => match self.config.protocol {
                Protocol::Udp => self.send_handshake(now),
                Protocol::Tcp => {
                    if self.monitor.check(now, false, Some(since)).verify_expired {
                        warn!("no server handshake within verification window");
                        self.restart(now, "server handshake timed out".to_string());
                    }
                }
            },
            Phase::Verifying { since } => {
                if self.monitor.check(now, false, Some(since)).verify_expired {
                    warn!(peer = ?self.pending_peer, "no client handshake within verification window");
                    self.restart(now, "client handshake timed out".to_string());
                }
            }
            Phase::Connected => {
                let check = self.monitor.check(now, true, None);
                if check.receive_timed_out {
                    self.restart(now, "peer stopped responding".to_string());
                } else if check.heartbeat_due {
                    self.send_heartbeat(now);
                }
            }
            Phase::Created | Phase::Closed | Phase::AwaitingPeer | Phase::Dialing | Phase::Fatal => {}
        }
    }

    /// One UDP datagram arrived from `from`.
    pub fn handle_datagram(&mut self, now: Instant, from: SocketAddr, data: &[u8]) {
        if self.config.protocol != Protocol::Udp || !self.is_open() {
            return;
        }
        let msg = match decode_udp(data) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(%from, len = data.len(), %err, "discarding malformed datagram");
                return;
            }
        };

        match self.config.role {
            Role::Server if msg.kind == MessageType::ClientHandshake => {
                self.accept_udp_client(now, from, msg);
            }
            Role::Server => {
                if self.peer == Some(from) && self.state.phase() == Phase::Connected {
                    self.handle_message(now, msg);
                } else {
                    debug!(%from, kind = %msg.kind, "ignoring datagram from unverified sender");
                }
            }
            Role::Client => {
                if from == self.config.address {
                    self.handle_message(now, msg);
                } else {
                    debug!(%from, "ignoring datagram from unexpected sender");
                }
            }
        }
    }

    /// A TCP stream was established: dialled by a client, accepted by a server.
    pub fn stream_connected(&mut self, now: Instant, peer: SocketAddr) {
        match (self.config.role, self.state.phase()) {
            (Role::Client, Phase::Dialing) => {
                info!(%peer, "stream connected, sending handshake");
                self.read_ahead.clear();
                self.enter(Phase::Handshaking { since: now }, None);
                self.send_handshake(now);
            }
            (Role::Server, Phase::AwaitingPeer) => {
                info!(%peer, "stream accepted, awaiting handshake");
                self.read_ahead.clear();
                self.pending_peer = Some(peer);
                self.enter(Phase::Verifying { since: now }, None);
            }
            (_, phase) => {
                debug!(%peer, ?phase, "unexpected stream, dropping it");
                self.outputs.push_back(Output::DropStream);
            }
        }
    }

    /// Bytes read from the current TCP stream.
    pub fn stream_bytes(&mut self, now: Instant, data: &[u8]) {
        if !self.holds_stream() {
            return;
        }
        self.read_ahead.extend_from_slice(data);
        loop {
            match self.codec.decode(&mut self.read_ahead) {
                Ok(Some(msg)) => self.handle_message(now, msg),
                Ok(None) => break,
                Err(err) => warn!(%err, "discarding malformed frame"),
            }
        }
    }

    /// The current TCP stream hit EOF or an error.
    pub fn stream_closed(&mut self, now: Instant, reason: &str) {
        if !self.holds_stream() {
            return;
        }
        info!(reason, "stream closed");
        self.restart(now, format!("stream closed: {reason}"));
    }

    /// A TCP dial failed before any stream existed.
    pub fn dial_failed(&mut self, _now: Instant, err: TransportError) {
        if self.state.phase() != Phase::Dialing {
            return;
        }
        if err.is_fatal() {
            self.fail(err.to_string());
            return;
        }
        debug!(%err, "dial failed, retrying");
        self.last_error = Some(err.to_string());
        self.enter(Phase::DialPending, None);
    }

    /// A socket operation failed.
    pub fn socket_error(&mut self, now: Instant, err: TransportError) {
        if !self.is_open() {
            return;
        }
        if err.is_fatal() {
            self.fail(err.to_string());
            return;
        }
        match self.config.protocol {
            // A dead UDP peer is caught by the liveness monitor.
            Protocol::Udp => warn!(%err, "datagram socket error"),
            Protocol::Tcp => {
                warn!(%err, "stream socket error");
                self.restart(now, err.to_string());
            }
        }
    }

    fn holds_stream(&self) -> bool {
        self.config.protocol == Protocol::Tcp
            && matches!(
                self.state.phase(),
                Phase::Handshaking { .. } | Phase::Verifying { .. } | Phase::Connected
            )
    }

    fn enter(&mut self, phase: Phase, reason: Option<String>) {
        if let Some(status) = self.state.enter(phase) {
            self.outputs.push_back(Output::Event(ChannelEvent::StatusChanged {
                status,
                peer: self.peer,
                reason,
            }));
        }
    }

    fn start(&mut self, now: Instant) {
        self.reset_connection_vars(now);
        match (self.config.protocol, self.config.role) {
            (_, Role::Server) => self.enter(Phase::AwaitingPeer, None),
            (Protocol::Udp, Role::Client) => {
                self.peer = Some(self.config.address);
                self.enter(Phase::Handshaking { since: now }, None);
                self.send_handshake(now);
            }
            (Protocol::Tcp, Role::Client) => {
                self.peer = Some(self.config.address);
                self.dial();
            }
        }
    }

    /// Go back to the role's waiting point without a status change.
    fn resume(&mut self, now: Instant) {
        match (self.config.protocol, self.config.role) {
            (_, Role::Server) => self.enter(Phase::AwaitingPeer, None),
            (Protocol::Udp, Role::Client) => self.enter(Phase::Handshaking { since: now }, None),
            (Protocol::Tcp, Role::Client) => self.enter(Phase::DialPending, None),
        }
    }

    /// Drop the current connection. A connected channel reports Disconnected
    /// and restarts on the next tick; a connecting one quietly starts over.
    fn restart(&mut self, now: Instant, reason: String) {
        self.last_error = Some(reason.clone());
        self.drop_stream();
        self.reset_connection_vars(now);
        if self.state.phase() == Phase::Connected {
            warn!(%reason, "connection lost");
            self.enter(Phase::Reconnecting, Some(reason));
        } else {
            debug!(%reason, "connection attempt reset");
            self.resume(now);
        }
    }

    fn dial(&mut self) {
        self.enter(Phase::Dialing, None);
        self.outputs.push_back(Output::Dial(self.config.address));
    }

    fn drop_stream(&mut self) {
        if self.config.protocol == Protocol::Tcp {
            self.outputs.push_back(Output::DropStream);
        }
    }

    fn reset_connection_vars(&mut self, now: Instant) {
        self.last_received_id = None;
        self.pending_peer = None;
        self.read_ahead.clear();
        self.qos.reset();
        self.monitor.reset(now);
    }

    fn connected(&mut self, now: Instant) {
        self.monitor.reset(now);
        info!(peer = ?self.peer, "connected");
        self.enter(Phase::Connected, None);
    }

    fn set_peer(&mut self, peer: SocketAddr) {
        if self.peer != Some(peer) {
            info!(%peer, "peer address changed");
            self.peer = Some(peer);
            self.qos.reset();
            self.outputs
                .push_back(Output::Event(ChannelEvent::PeerAddressChanged(peer)));
        }
    }

    fn take_id(&mut self) -> Result<MessageId> {
        let id = self.next_send_id;
        match id.checked_add(1) {
            Some(next) => {
                self.next_send_id = next;
                Ok(id)
            }
            None => {
                error!("sequence ids exhausted");
                Err(ChannelError::SequenceExhausted)
            }
        }
    }

    fn transmit(&mut self, now: Instant, msg: &Message) {
        let mut buf = BytesMut::new();
        let encoded = match self.config.protocol {
            Protocol::Udp => encode_udp(msg, &mut buf),
            Protocol::Tcp => encode_tcp(msg, &mut buf),
        };
        if let Err(err) = encoded {
            warn!(kind = %msg.kind, %err, "failed to encode message");
            return;
        }
        let bytes = buf.freeze();

        match self.config.protocol {
            Protocol::Udp => {
                let Some(to) = self.peer else {
                    debug!(kind = %msg.kind, "no peer address, message dropped");
                    return;
                };
                self.outputs.push_back(Output::Datagram { to, bytes });
            }
            Protocol::Tcp => self.outputs.push_back(Output::Stream(bytes)),
        }
        trace!(kind = %msg.kind, id = msg.id, "sent");
        self.monitor.record_send(now);
    }

    fn send_handshake(&mut self, now: Instant) {
        if let Ok(id) = self.take_id() {
            let msg = handshake_message(self.config.role, id, &self.config.name);
            self.transmit(now, &msg);
        }
    }

    fn send_heartbeat(&mut self, now: Instant) {
        if let Ok(id) = self.take_id() {
            self.transmit(now, &Message::heartbeat(id));
        }
    }

    fn accept_udp_client(&mut self, now: Instant, from: SocketAddr, msg: Message) {
        if let Err(err) = verify_handshake(Role::Server, &self.config.name, &msg) {
            warn!(%from, %err, "rejected client handshake");
            return;
        }
        self.set_peer(from);
        // A repeated handshake means the client restarted its sequence.
        self.last_received_id = None;
        self.monitor.record_receive(now);
        self.send_handshake(now);
        if self.state.phase() != Phase::Connected {
            self.connected(now);
        }
    }

    fn handle_message(&mut self, now: Instant, msg: Message) {
        match msg.kind {
            MessageType::ServerHandshake => self.on_server_handshake(now, msg),
            MessageType::ClientHandshake => self.on_stream_client_handshake(now, msg),
            _ if self.state.phase() != Phase::Connected => {
                debug!(kind = %msg.kind, "ignoring message before handshake");
            }
            MessageType::Normal => {
                self.monitor.record_receive(now);
                self.on_normal(now, msg);
            }
            MessageType::Heartbeat => {
                self.monitor.record_receive(now);
                trace!(id = msg.id, "heartbeat");
            }
            MessageType::QosAck => {
                self.monitor.record_receive(now);
                if let Some(sample) = self.qos.acknowledge(msg.id, now) {
                    debug!(rtt_ms = sample.rtt.as_millis() as u64, "qos sample");
                    self.outputs
                        .push_back(Output::Event(ChannelEvent::QosUpdate(sample)));
                }
            }
        }
    }

    fn on_server_handshake(&mut self, now: Instant, msg: Message) {
        if self.config.role != Role::Client {
            debug!("ignoring server handshake on a server channel");
            return;
        }
        match self.state.phase() {
            Phase::Handshaking { .. } => {
                if let Err(err) = verify_handshake(Role::Client, &self.config.name, &msg) {
                    warn!(%err, "rejected server handshake");
                    if self.config.protocol == Protocol::Tcp {
                        self.restart(now, err.to_string());
                    }
                    return;
                }
                self.monitor.record_receive(now);
                self.last_received_id = None;
                self.connected(now);
            }
            Phase::Connected => self.monitor.record_receive(now),
            phase => debug!(?phase, "ignoring server handshake"),
        }
    }

    fn on_stream_client_handshake(&mut self, now: Instant, msg: Message) {
        if self.config.role != Role::Server {
            debug!("ignoring client handshake on a client channel");
            return;
        }
        match self.state.phase() {
            Phase::Verifying { .. } => {
                if let Err(err) = verify_handshake(Role::Server, &self.config.name, &msg) {
                    warn!(peer = ?self.pending_peer, %err, "rejected client handshake, resetting stream");
                    self.restart(now, err.to_string());
                    return;
                }
                if let Some(peer) = self.pending_peer.take() {
                    self.set_peer(peer);
                }
                self.monitor.record_receive(now);
                self.send_handshake(now);
                self.connected(now);
            }
            Phase::Connected => {
                self.monitor.record_receive(now);
                debug!("duplicate client handshake");
            }
            phase => debug!(?phase, "ignoring client handshake"),
        }
    }

    fn on_normal(&mut self, now: Instant, msg: Message) {
        if self.config.protocol == Protocol::Udp && self.config.drop_old_udp_packets {
            if let Some(last) = self.last_received_id {
                if msg.id <= last {
                    debug!(id = msg.id, last, "dropping stale datagram");
                    return;
                }
            }
        }
        self.last_received_id = Some(self.last_received_id.map_or(msg.id, |last| last.max(msg.id)));

        if let Some(acked) = self.qos.record_received(msg.id, now) {
            self.transmit(now, &Message::qos_ack(acked));
        }
        self.outputs
            .push_back(Output::Event(ChannelEvent::MessageReceived(msg.payload)));
    }
}
