use rovelink_channel::{ChannelEvent, Status};
use rovelink_control::DriveMessage;
use tracing::{debug, info, warn};

use crate::cmd::{on_status, start_channel, RelayArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};

pub async fn run(args: RelayArgs) -> CliResult<i32> {
    let (downstream, mut down_events) = start_channel(args.channel.server(args.bind)).await?;

    let mut upstream_args = args.channel.clone();
    if let Some(protocol) = args.upstream_protocol {
        upstream_args.protocol = protocol;
    }
    if let Some(name) = &args.upstream_name {
        upstream_args.name = name.clone();
    }
    let (upstream, mut up_events) = start_channel(upstream_args.client(args.peer)).await?;

    downstream
        .route(&upstream)
        .map_err(|err| channel_error("route failed", err))?;
    if args.bidirectional {
        upstream
            .route(&downstream)
            .map_err(|err| channel_error("route failed", err))?;
    }
    info!(
        downstream = downstream.name(),
        upstream = upstream.name(),
        bind = %args.bind,
        peer = %args.peer,
        bidirectional = args.bidirectional,
        "relay running"
    );

    let mut downstream_connected = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = down_events.recv() => {
                let Some(event) = event else { break };
                if let ChannelEvent::StatusChanged { status, peer, reason } = event {
                    on_status(&downstream, status, peer, reason.as_deref())?;
                    let lost = downstream_connected && status != Status::Connected;
                    downstream_connected = status == Status::Connected;
                    if lost && args.drive_failsafe {
                        match upstream.send_message(DriveMessage::stop()) {
                            Ok(()) => info!("downstream lost, drive stop sent upstream"),
                            Err(err) => warn!(%err, "downstream lost, drive stop not sent"),
                        }
                    }
                }
            }
            event = up_events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ChannelEvent::StatusChanged { status, peer, reason } => {
                        on_status(&upstream, status, peer, reason.as_deref())?;
                    }
                    ChannelEvent::QosUpdate(sample) => {
                        debug!(
                            rtt_ms = sample.rtt.as_secs_f64() * 1000.0,
                            up = sample.messages_up,
                            "upstream qos"
                        );
                    }
                    _ => {}
                }
            }
        }
    }

    let _ = downstream.unroute(&upstream);
    let _ = downstream.close();
    let _ = upstream.close();
    Ok(SUCCESS)
}
