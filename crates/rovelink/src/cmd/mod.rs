use std::future::Future;
use std::net::SocketAddr;

use clap::{Args, Subcommand};
use rovelink_channel::{Channel, ChannelConfig, ChannelEvent, Status};
use rovelink_transport::Protocol;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::exit::{channel_error, io_error, CliError, CliResult, TRANSPORT_ERROR};
use crate::output::OutputFormat;

pub mod listen;
pub mod relay;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a channel and print received messages.
    Listen(ListenArgs),
    /// Connect to a channel server and send messages.
    Send(SendArgs),
    /// Serve a channel and forward its messages to another server.
    Relay(RelayArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => block_on(listen::run(args, format)),
        Command::Send(args) => block_on(send::run(args, format)),
        Command::Relay(args) => block_on(relay::run(args)),
        Command::Version(args) => version::run(args),
    }
}

fn block_on<F: Future<Output = CliResult<i32>>>(command: F) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    runtime.block_on(command)
}

/// Options shared by every command that opens a channel.
#[derive(Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Channel name; both ends must agree.
    #[arg(long, env = "ROVELINK_CHANNEL_NAME", default_value = "rovelink")]
    pub name: String,
    /// Wire protocol (udp or tcp).
    #[arg(long, default_value = "udp")]
    pub protocol: Protocol,
    /// Discard UDP messages that arrive out of order.
    #[arg(long)]
    pub drop_old: bool,
}

impl ChannelArgs {
    pub fn server(&self, bind: SocketAddr) -> ChannelConfig {
        ChannelConfig::server(self.name.clone(), self.protocol, bind)
            .with_drop_old_udp_packets(self.drop_old)
    }

    pub fn client(&self, peer: SocketAddr) -> ChannelConfig {
        ChannelConfig::client(self.name.clone(), self.protocol, peer)
            .with_drop_old_udp_packets(self.drop_old)
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind.
    pub bind: SocketAddr,
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server address to connect to.
    pub peer: SocketAddr,
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Raw string payload.
    #[arg(long, conflicts_with = "hex")]
    pub data: Option<String>,
    /// Hex-encoded payload (e.g. 01ff64).
    #[arg(long, conflicts_with = "data")]
    pub hex: Option<String>,
    /// Number of times to send the payload.
    #[arg(long, default_value_t = 1)]
    pub repeat: usize,
    /// Delay between repeated sends (e.g. 100ms).
    #[arg(long, default_value = "50ms")]
    pub interval: String,
    /// Maximum time to wait for the handshake (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Time to stay connected after the last send, collecting QoS samples.
    #[arg(long, default_value = "1500ms")]
    pub linger: String,
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Address to serve the downstream channel on.
    pub bind: SocketAddr,
    /// Upstream server to forward to.
    pub peer: SocketAddr,
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Upstream wire protocol. Defaults to --protocol.
    #[arg(long)]
    pub upstream_protocol: Option<Protocol>,
    /// Upstream channel name. Defaults to --name.
    #[arg(long)]
    pub upstream_name: Option<String>,
    /// Also forward upstream messages back downstream.
    #[arg(long)]
    pub bidirectional: bool,
    /// Send a drive stop upstream whenever the downstream link drops.
    #[arg(long)]
    pub drive_failsafe: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Create a channel, subscribe to it and open it. A socket that cannot be
/// bound is reported here rather than as a later event.
pub(crate) async fn start_channel(
    config: ChannelConfig,
) -> CliResult<(Channel, UnboundedReceiver<ChannelEvent>)> {
    let channel = Channel::new(config)
        .await
        .map_err(|err| channel_error("channel setup failed", err))?;
    if channel.status() == Status::FatalError {
        let reason = channel
            .last_error()
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(CliError::new(
            TRANSPORT_ERROR,
            format!("channel '{}' failed: {reason}", channel.name()),
        ));
    }
    let events = channel.subscribe();
    channel
        .open()
        .map_err(|err| channel_error("channel open failed", err))?;
    Ok((channel, events))
}

/// Shared handling for status notifications. Returns an error once the
/// channel has failed for good.
pub(crate) fn on_status(
    channel: &Channel,
    status: Status,
    peer: Option<SocketAddr>,
    reason: Option<&str>,
) -> CliResult<()> {
    match status {
        Status::FatalError => Err(CliError::new(
            TRANSPORT_ERROR,
            format!(
                "channel '{}' failed: {}",
                channel.name(),
                reason.unwrap_or("unknown error")
            ),
        )),
        Status::Disconnected => {
            tracing::warn!(
                channel = channel.name(),
                reason = reason.unwrap_or("closed"),
                "disconnected"
            );
            Ok(())
        }
        status => {
            tracing::info!(
                channel = channel.name(),
                peer = ?peer,
                %status,
                "status changed"
            );
            Ok(())
        }
    }
}
