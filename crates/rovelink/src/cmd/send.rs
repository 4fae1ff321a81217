use std::time::Duration;

use bytes::Bytes;
use rovelink_channel::{ChannelEvent, Status};
use rovelink_frame::MAX_MESSAGE_LENGTH;

use crate::cmd::{on_status, start_channel, SendArgs};
use crate::exit::{channel_error, CliError, CliResult, DATA_INVALID, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, print_summary, OutputFormat, SendSummary};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let interval = parse_duration(&args.interval)?;
    let linger = parse_duration(&args.linger)?;
    let payload = Bytes::from(resolve_payload(&args)?);
    if payload.len() > MAX_MESSAGE_LENGTH {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "payload is {} bytes, the limit is {MAX_MESSAGE_LENGTH}",
                payload.len()
            ),
        ));
    }

    let (channel, mut events) = start_channel(args.channel.client(args.peer)).await?;

    match tokio::time::timeout(connect_timeout, channel.wait_for_status(Status::Connected)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => return Err(channel_error("connect failed", err)),
        Err(_) => {
            let _ = channel.close();
            return Err(CliError::new(
                TIMEOUT,
                format!(
                    "no handshake from {} within {}ms",
                    args.peer,
                    connect_timeout.as_millis()
                ),
            ));
        }
    }

    let mut summary = SendSummary {
        channel: channel.name().to_string(),
        protocol: channel.protocol().to_string(),
        peer: args.peer.to_string(),
        sent: 0,
        payload_size: payload.len(),
        qos_samples: 0,
        last_rtt_ms: None,
        messages_up: None,
    };
    for round in 0..args.repeat {
        if round > 0 {
            tokio::time::sleep(interval).await;
        }
        channel
            .send_message(payload.clone())
            .map_err(|err| channel_error("send failed", err))?;
        summary.sent += 1;
    }

    let deadline = tokio::time::sleep(linger);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                None => break,
                Some(ChannelEvent::QosUpdate(sample)) => summary.record_qos(&sample),
                Some(ChannelEvent::MessageReceived(reply)) => {
                    print_message(&reply, channel.name(), channel.peer_address(), format);
                }
                Some(ChannelEvent::StatusChanged { status, peer, reason }) => {
                    on_status(&channel, status, peer, reason.as_deref())?;
                }
                Some(ChannelEvent::PeerAddressChanged(_)) => {}
            },
        }
    }

    let _ = channel.close();
    print_summary(&summary, format);
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return decode_hex(hex);
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    Ok(Vec::new())
}

fn decode_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&digits)
        .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex ({err}): {input}")))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn decode_hex_accepts_spaced_digits() {
        assert_eq!(decode_hex("01ff64").unwrap(), vec![0x01, 0xFF, 0x64]);
        assert_eq!(decode_hex("01 FF 64").unwrap(), vec![0x01, 0xFF, 0x64]);
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn decode_hex_rejects_bad_input() {
        assert_eq!(decode_hex("abc").unwrap_err().code, USAGE);
        assert!(decode_hex("abc").unwrap_err().message.contains("--hex"));
        assert_eq!(decode_hex("zz").unwrap_err().code, USAGE);
        assert_eq!(decode_hex("é1").unwrap_err().code, USAGE);
    }
}
