use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::Bytes;
use rovelink_frame::{Protocol, MAX_MESSAGE_LENGTH};
use rovelink_transport::{
    accept_tcp, bind_tcp, bind_udp, connect_tcp, unspecified_for, TransportError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, info_span, warn, Dispatch, Instrument, Span};

use crate::config::{ChannelConfig, Role};
use crate::core::{ChannelCore, Output};
use crate::error::{ChannelError, Result};
use crate::event::{ChannelEvent, Observers};
use crate::route::{ChannelId, RouteTable, RouteTarget};
use crate::state::Status;

/// Large enough to see (and reject) datagrams over the payload limit.
const DATAGRAM_BUFFER_SIZE: usize = 2048;
const STREAM_CHUNK_SIZE: usize = 4096;

type DialFuture = Pin<Box<dyn Future<Output = rovelink_transport::Result<TcpStream>> + Send>>;

/// State published by the driver for the handle's accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    status: Status,
    peer: Option<SocketAddr>,
    local: Option<SocketAddr>,
    was_connected: bool,
    last_error: Option<String>,
}

enum Command {
    Open,
    Close,
    Send(Bytes),
    Subscribe(mpsc::UnboundedSender<ChannelEvent>),
    Route {
        target_id: ChannelId,
        target: Weak<dyn RouteTarget>,
    },
    Unroute(ChannelId),
}

/// A bidirectional telemetry link to one peer over UDP or TCP.
///
/// The handle is cheap to clone. All connection state lives in a driver task
/// that is spawned by [`Channel::new`] and exits once every handle is dropped.
///
/// # Example
///
/// ```no_run
/// use rovelink_channel::{Channel, ChannelConfig, Status};
/// use rovelink_frame::Protocol;
///
/// # async fn run() -> rovelink_channel::Result<()> {
/// let config = ChannelConfig::client("drive", Protocol::Udp, "10.0.0.2:5000".parse().unwrap());
/// let channel = Channel::new(config).await?;
/// channel.open()?;
/// channel.wait_for_status(Status::Connected).await?;
/// channel.send_message(&b"\x01\x02"[..])?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
}

struct Shared {
    id: ChannelId,
    config: ChannelConfig,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    span: Span,
    dispatch: Option<Dispatch>,
}

impl Shared {
    /// Run `f` inside this channel's span and subscriber.
    fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => {
                tracing::dispatcher::with_default(dispatch, || self.span.in_scope(f))
            }
            None => self.span.in_scope(f),
        }
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ChannelError::Closed)
    }

    fn send(&self, payload: Bytes) -> Result<()> {
        if payload.len() > MAX_MESSAGE_LENGTH {
            self.in_scope(|| {
                warn!(size = payload.len(), "outbound message rejected, payload too large");
            });
            return Err(ChannelError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_LENGTH,
            });
        }
        let status = self.snapshot.borrow().status;
        if status != Status::Connected {
            self.in_scope(|| warn!(%status, "outbound message rejected, channel not connected"));
            return Err(ChannelError::NotConnected(status));
        }
        self.command(Command::Send(payload))
    }
}

impl RouteTarget for Shared {
    fn channel_id(&self) -> ChannelId {
        self.id
    }

    fn forward(&self, payload: Bytes) -> Result<()> {
        self.send(payload)
    }
}

impl Channel {
    /// Create a channel and bind its socket.
    ///
    /// Only an invalid configuration is an error here. A bind failure leaves
    /// the channel in [`Status::FatalError`] with the cause in
    /// [`last_error`](Channel::last_error).
    pub async fn new(config: ChannelConfig) -> Result<Self> {
        Self::build(config, None).await
    }

    /// Like [`Channel::new`], but every log record of this channel goes to
    /// `dispatch` instead of the ambient default subscriber.
    pub async fn with_dispatch(config: ChannelConfig, dispatch: Dispatch) -> Result<Self> {
        Self::build(config, Some(dispatch)).await
    }

    async fn build(config: ChannelConfig, dispatch: Option<Dispatch>) -> Result<Self> {
        config.validate()?;

        let id = ChannelId::next();
        let make_span = || {
            info_span!(
                "channel",
                id = %id,
                name = %config.name,
                protocol = %config.protocol,
                role = %config.role,
            )
        };
        let span = match &dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, make_span),
            None => make_span(),
        };

        let bind = bind_endpoints(&config).instrument(span.clone());
        let bound = match &dispatch {
            Some(dispatch) => bind.with_subscriber(dispatch.clone()).await,
            None => bind.await,
        };

        let mut core = ChannelCore::new(config.clone(), Instant::now());
        let endpoints = match bound {
            Ok(endpoints) => endpoints,
            Err(err) => {
                let mut fail = || span.in_scope(|| core.fail(err.to_string()));
                match &dispatch {
                    Some(dispatch) => tracing::dispatcher::with_default(dispatch, fail),
                    None => fail(),
                }
                Endpoints::default()
            }
        };
        Ok(Self::spawn(id, config, core, endpoints, span, dispatch))
    }

    fn spawn(
        id: ChannelId,
        config: ChannelConfig,
        core: ChannelCore,
        endpoints: Endpoints,
        span: Span,
        dispatch: Option<Dispatch>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot_of(&core, &endpoints));

        let driver = Driver {
            core,
            commands: commands_rx,
            snapshot: snapshot_tx,
            observers: Observers::default(),
            routes: RouteTable::default(),
            udp: endpoints.udp,
            listener: endpoints.listener,
            stream: None,
            dial: None,
        };
        let task = driver.run().instrument(span.clone());
        match &dispatch {
            Some(dispatch) => tokio::spawn(task.with_subscriber(dispatch.clone())),
            None => tokio::spawn(task),
        };

        Self {
            shared: Arc::new(Shared {
                id,
                config,
                commands: commands_tx,
                snapshot: snapshot_rx,
                span,
                dispatch,
            }),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.shared.id
    }

    /// Begin connection attempts. Does nothing if already open; reopening
    /// after [`close`](Channel::close) binds the socket again.
    pub fn open(&self) -> Result<()> {
        self.shared.command(Command::Open)
    }

    /// Stop connection attempts and release the socket. Safe to repeat.
    pub fn close(&self) -> Result<()> {
        self.shared.command(Command::Close)
    }

    /// Send an application payload to the peer.
    ///
    /// Fails without side effects beyond a log line if the payload exceeds
    /// [`MAX_MESSAGE_LENGTH`] or the channel is not connected.
    ///
    /// `Ok` means the payload was queued for the driver task, not that it was
    /// transmitted. The connected check reads the last published status, so a
    /// disconnect or [`close`](Channel::close) the driver has not yet processed
    /// still returns `Ok`. The driver then drops the payload and logs it, as it
    /// does when the send-id counter is exhausted.
    pub fn send_message(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.shared.send(payload.into())
    }

    /// Register an observer. Events arrive in the order they happened.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.shared.command(Command::Subscribe(tx)).is_err() {
            self.shared
                .in_scope(|| debug!("subscribe on a stopped channel, no events will follow"));
        }
        rx
    }

    /// Forward every message received here to `other`'s send path.
    ///
    /// The edge does not keep `other` alive.
    pub fn route(&self, other: &Channel) -> Result<()> {
        if other.id() == self.id() {
            self.shared
                .in_scope(|| warn!("refusing to route a channel into itself"));
            return Err(ChannelError::InvalidConfig(
                "a channel cannot be routed into itself".to_string(),
            ));
        }
        let target: Weak<dyn RouteTarget> = Arc::<Shared>::downgrade(&other.shared);
        self.shared.command(Command::Route {
            target_id: other.id(),
            target,
        })
    }

    pub fn unroute(&self, other: &Channel) -> Result<()> {
        self.unroute_id(other.id())
    }

    /// Remove a routing edge by id, whether or not the target still exists.
    pub fn unroute_id(&self, target: ChannelId) -> Result<()> {
        self.shared.command(Command::Unroute(target))
    }

    pub fn status(&self) -> Status {
        self.shared.snapshot.borrow().status
    }

    pub fn peer_address(&self) -> Option<SocketAddr> {
        self.shared.snapshot.borrow().peer
    }

    /// Address the channel's socket is bound to, if any.
    pub fn local_address(&self) -> Option<SocketAddr> {
        self.shared.snapshot.borrow().local
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn protocol(&self) -> Protocol {
        self.shared.config.protocol
    }

    pub fn is_server(&self) -> bool {
        self.shared.config.is_server()
    }

    pub fn was_connected(&self) -> bool {
        self.shared.snapshot.borrow().was_connected
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.snapshot.borrow().last_error.clone()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Wait until the channel reports `wanted`.
    ///
    /// Returns [`ChannelError::Fatal`] if the channel fails first, and
    /// [`ChannelError::Closed`] if its driver has stopped.
    pub async fn wait_for_status(&self, wanted: Status) -> Result<Status> {
        let mut rx = self.shared.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| s.status == wanted || s.status == Status::FatalError)
            .await
            .map_err(|_| ChannelError::Closed)?;
        if snapshot.status == wanted {
            Ok(wanted)
        } else {
            Err(ChannelError::Fatal(
                snapshot.last_error.clone().unwrap_or_default(),
            ))
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("protocol", &self.shared.config.protocol)
            .field("role", &self.shared.config.role)
            .field("status", &self.status())
            .finish()
    }
}

#[derive(Default)]
struct Endpoints {
    udp: Option<UdpSocket>,
    listener: Option<TcpListener>,
}

impl Endpoints {
    fn local_addr(&self) -> Option<SocketAddr> {
        match (&self.udp, &self.listener) {
            (Some(udp), _) => udp.local_addr().ok(),
            (None, Some(listener)) => listener.local_addr().ok(),
            (None, None) => None,
        }
    }
}

/// Bind whatever socket the role needs. TCP clients bind nothing up front.
async fn bind_endpoints(config: &ChannelConfig) -> rovelink_transport::Result<Endpoints> {
    let mut endpoints = Endpoints::default();
    match (config.protocol, config.role) {
        (Protocol::Udp, Role::Server) => endpoints.udp = Some(bind_udp(config.address).await?),
        (Protocol::Udp, Role::Client) => {
            let local = config
                .local_address
                .unwrap_or_else(|| unspecified_for(config.address));
            endpoints.udp = Some(bind_udp(local).await?);
        }
        (Protocol::Tcp, Role::Server) => {
            endpoints.listener = Some(bind_tcp(config.address).await?);
        }
        (Protocol::Tcp, Role::Client) => {}
    }
    Ok(endpoints)
}

fn snapshot_of(core: &ChannelCore, endpoints: &Endpoints) -> Snapshot {
    Snapshot {
        status: core.status(),
        peer: core.peer(),
        local: endpoints.local_addr(),
        was_connected: core.was_connected(),
        last_error: core.last_error().map(str::to_owned),
    }
}

/// Owns the sockets and the core; runs until every handle is gone.
struct Driver {
    core: ChannelCore,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<Snapshot>,
    observers: Observers,
    routes: RouteTable,
    udp: Option<UdpSocket>,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    dial: Option<DialFuture>,
}

impl Driver {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.core.config().timings.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut datagram = vec![0u8; DATAGRAM_BUFFER_SIZE];
        let mut chunk = vec![0u8; STREAM_CHUNK_SIZE];

        // Bind failures during construction queue a status event.
        self.flush().await;

        loop {
            let awaiting_stream = self.core.awaiting_stream();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = ticker.tick() => self.core.tick(Instant::now()),
                received = recv_datagram(self.udp.as_ref(), &mut datagram) => match received {
                    Ok((len, from)) => self.core.handle_datagram(Instant::now(), from, &datagram[..len]),
                    Err(err) => self.core.socket_error(Instant::now(), TransportError::Io(err)),
                },
                accepted = accept_stream(self.listener.as_ref()), if awaiting_stream => match accepted {
                    Ok((stream, peer)) => {
                        self.stream = Some(stream);
                        self.core.stream_connected(Instant::now(), peer);
                    }
                    Err(err) => self.core.socket_error(Instant::now(), err),
                },
                read = read_stream(self.stream.as_mut(), &mut chunk) => match read {
                    Ok(0) => {
                        self.stream = None;
                        self.core.stream_closed(Instant::now(), "end of stream");
                    }
                    Ok(len) => self.core.stream_bytes(Instant::now(), &chunk[..len]),
                    Err(err) => {
                        self.stream = None;
                        self.core.stream_closed(Instant::now(), &err.to_string());
                    }
                },
                dialled = finish_dial(&mut self.dial) => match dialled {
                    Ok(stream) => {
                        let peer = stream
                            .peer_addr()
                            .unwrap_or_else(|_| self.core.config().address);
                        self.stream = Some(stream);
                        self.core.stream_connected(Instant::now(), peer);
                    }
                    Err(err) => self.core.dial_failed(Instant::now(), err),
                },
            }
            self.flush().await;
        }

        debug!("all handles dropped, shutting down");
        self.core.close(Instant::now());
        self.flush().await;
    }

    async fn handle_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::Open => {
                if self.needs_bind() && self.core.status() != Status::FatalError {
                    match bind_endpoints(self.core.config()).await {
                        Ok(endpoints) => {
                            self.udp = endpoints.udp;
                            self.listener = endpoints.listener;
                        }
                        Err(err) => {
                            self.core.fail(err.to_string());
                            return;
                        }
                    }
                }
                self.core.open(now);
            }
            Command::Close => {
                self.core.close(now);
            }
            Command::Send(payload) => {
                if let Err(err) = self.core.send_message(now, payload) {
                    debug!(%err, "queued message dropped");
                }
            }
            Command::Subscribe(tx) => {
                self.observers.add(tx);
                debug!(observers = self.observers.len(), "observer registered");
            }
            Command::Route { target_id, target } => {
                if self.routes.add(target_id, target) {
                    info!(target = %target_id, "route added");
                }
            }
            Command::Unroute(target_id) => {
                if self.routes.remove(target_id) {
                    info!(target = %target_id, "route removed");
                }
            }
        }
    }

    fn needs_bind(&self) -> bool {
        let config = self.core.config();
        match (config.protocol, config.role) {
            (Protocol::Udp, _) => self.udp.is_none(),
            (Protocol::Tcp, Role::Server) => self.listener.is_none(),
            (Protocol::Tcp, Role::Client) => false,
        }
    }

    /// Execute queued outputs. The snapshot is published first so observers
    /// reacting to an event see matching accessor values.
    async fn flush(&mut self) {
        self.publish();
        while let Some(output) = self.core.poll_output() {
            match output {
                Output::Datagram { to, bytes } => {
                    let Some(udp) = self.udp.as_ref() else {
                        continue;
                    };
                    if let Err(err) = udp.send_to(&bytes, to).await {
                        self.core.socket_error(Instant::now(), TransportError::Io(err));
                    }
                }
                Output::Stream(bytes) => {
                    let Some(stream) = self.stream.as_mut() else {
                        continue;
                    };
                    if let Err(err) = stream.write_all(&bytes).await {
                        self.stream = None;
                        self.core.stream_closed(Instant::now(), &err.to_string());
                    }
                }
                Output::Dial(addr) => {
                    debug!(%addr, "dialling");
                    let dial: DialFuture = Box::pin(connect_tcp(addr));
                    self.dial = Some(dial);
                }
                Output::DropStream => {
                    self.stream = None;
                    self.dial = None;
                }
                Output::Event(event) => {
                    self.publish();
                    self.observers.emit(&event);
                    if let ChannelEvent::MessageReceived(payload) = &event {
                        self.routes.deliver(payload);
                    }
                }
            }
        }
        self.release_if_stopped();
        self.publish();
    }

    /// Closed and failed channels hold no sockets.
    fn release_if_stopped(&mut self) {
        if self.core.is_open() {
            return;
        }
        if matches!(self.core.status(), Status::Disconnected | Status::FatalError)
            && (self.udp.is_some() || self.listener.is_some())
        {
            info!("releasing sockets");
            self.udp = None;
            self.listener = None;
            self.stream = None;
            self.dial = None;
        }
    }

    fn publish(&self) {
        let local = match (&self.udp, &self.listener) {
            (Some(udp), _) => udp.local_addr().ok(),
            (None, Some(listener)) => listener.local_addr().ok(),
            (None, None) => self.stream.as_ref().and_then(|s| s.local_addr().ok()),
        };
        let next = Snapshot {
            status: self.core.status(),
            peer: self.core.peer(),
            local,
            was_connected: self.core.was_connected(),
            last_error: self.core.last_error().map(str::to_owned),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn recv_datagram(
    socket: Option<&UdpSocket>,
    buf: &mut [u8],
) -> io::Result<(usize, SocketAddr)> {
    match socket {
        Some(socket) => socket.recv_from(buf).await,
        None => std::future::pending().await,
    }
}

async fn accept_stream(
    listener: Option<&TcpListener>,
) -> rovelink_transport::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => accept_tcp(listener).await,
        None => std::future::pending().await,
    }
}

async fn read_stream(stream: Option<&mut TcpStream>, buf: &mut [u8]) -> io::Result<usize> {
    match stream {
        Some(stream) => stream.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn finish_dial(dial: &mut Option<DialFuture>) -> rovelink_transport::Result<TcpStream> {
    let Some(pending) = dial.as_mut() else {
        return std::future::pending().await;
    };
    let result = pending.await;
    *dial = None;
    result
}
