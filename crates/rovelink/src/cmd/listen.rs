use rovelink_channel::ChannelEvent;
use tracing::{debug, info};

use crate::cmd::{on_status, start_channel, ListenArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let (channel, mut events) = start_channel(args.channel.server(args.bind)).await?;
    info!(
        channel = channel.name(),
        protocol = %channel.protocol(),
        local = ?channel.local_address(),
        "listening"
    );

    let mut received = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ChannelEvent::MessageReceived(payload) => {
                        print_message(&payload, channel.name(), channel.peer_address(), format);
                        received += 1;
                        if args.count.is_some_and(|count| received >= count) {
                            break;
                        }
                    }
                    ChannelEvent::StatusChanged { status, peer, reason } => {
                        on_status(&channel, status, peer, reason.as_deref())?;
                    }
                    ChannelEvent::PeerAddressChanged(peer) => {
                        info!(channel = channel.name(), %peer, "new peer");
                    }
                    ChannelEvent::QosUpdate(sample) => {
                        debug!(
                            rtt_ms = sample.rtt.as_secs_f64() * 1000.0,
                            up = sample.messages_up,
                            down = sample.messages_down,
                            "qos"
                        );
                    }
                }
            }
        }
    }

    let _ = channel.close();
    Ok(SUCCESS)
}
