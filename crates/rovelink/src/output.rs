use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rovelink_channel::QosSample;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    kind: &'static str,
    channel: &'a str,
    peer: Option<String>,
    payload_size: usize,
    payload: String,
    payload_hex: String,
    timestamp: String,
}

pub fn print_message(payload: &[u8], channel: &str, peer: Option<SocketAddr>, format: OutputFormat) {
    let peer = peer.map(|p| p.to_string());
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                kind: "message",
                channel,
                peer,
                payload_size: payload.len(),
                payload: payload_preview(payload),
                payload_hex: hex::encode(payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    channel.to_string(),
                    payload.len().to_string(),
                    peer.unwrap_or_else(|| "-".to_string()),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} size={} peer={} payload={}",
                channel,
                payload.len(),
                peer.as_deref().unwrap_or("-"),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

/// Outcome of a `send` run.
#[derive(Debug, Serialize)]
pub struct SendSummary {
    pub channel: String,
    pub protocol: String,
    pub peer: String,
    pub sent: usize,
    pub payload_size: usize,
    pub qos_samples: usize,
    pub last_rtt_ms: Option<f64>,
    pub messages_up: Option<u64>,
}

impl SendSummary {
    pub fn record_qos(&mut self, sample: &QosSample) {
        self.qos_samples += 1;
        self.last_rtt_ms = Some(sample.rtt.as_secs_f64() * 1000.0);
        self.messages_up = Some(sample.messages_up);
    }
}

pub fn print_summary(summary: &SendSummary, format: OutputFormat) {
    let rtt = summary
        .last_rtt_ms
        .map(|ms| format!("{ms:.2} ms"))
        .unwrap_or_else(|| "-".to_string());
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "PROTOCOL", "PEER", "SENT", "QOS SAMPLES", "LAST RTT"])
                .add_row(vec![
                    summary.channel.clone(),
                    summary.protocol.clone(),
                    summary.peer.clone(),
                    summary.sent.to_string(),
                    summary.qos_samples.to_string(),
                    rtt,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "channel={} protocol={} peer={} sent={} qos_samples={} last_rtt={}",
                summary.channel,
                summary.protocol,
                summary.peer,
                summary.sent,
                summary.qos_samples,
                rtt
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_text_and_binary() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0xFF, 0xFE]), "<binary 2 bytes>");
    }

    #[test]
    fn summary_serializes() {
        let mut summary = SendSummary {
            channel: "drive".into(),
            protocol: "udp".into(),
            peer: "127.0.0.1:5000".into(),
            sent: 3,
            payload_size: 2,
            qos_samples: 0,
            last_rtt_ms: None,
            messages_up: None,
        };
        summary.record_qos(&QosSample {
            rtt: std::time::Duration::from_millis(40),
            messages_up: 3,
            messages_down: 0,
        });
        let json: serde_json::Value = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["sent"], 3);
        assert_eq!(json["qos_samples"], 1);
        assert_eq!(json["last_rtt_ms"], 40.0);
    }
}
