use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use rovelink_frame::MAX_MESSAGE_LENGTH;
use rovelink_transport::Protocol;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// Period of the liveness monitor tick.
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

/// Outbound silence after which a heartbeat is sent.
pub const IDLE_SEND_THRESHOLD: Duration = Duration::from_millis(1000);

/// Inbound silence after which a connected channel is dropped.
pub const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Time a provisionally open TCP connection has to complete its handshake.
pub const TCP_VERIFY_WINDOW: Duration = Duration::from_millis(5000);

/// Minimum spacing between QoS acknowledgements.
pub const QOS_UPDATE_INTERVAL: Duration = Duration::from_millis(1000);

/// Which end of the handshake a channel plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => f.write_str("server"),
            Role::Client => f.write_str("client"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" => Ok(Role::Server),
            "client" => Ok(Role::Client),
            other => Err(format!("unknown role '{other}' (expected server or client)")),
        }
    }
}

/// Timer settings for the liveness monitor and QoS sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub monitor_interval: Duration,
    pub idle_send_threshold: Duration,
    pub idle_connection_timeout: Duration,
    pub tcp_verify_window: Duration,
    pub qos_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            monitor_interval: MONITOR_INTERVAL,
            idle_send_threshold: IDLE_SEND_THRESHOLD,
            idle_connection_timeout: IDLE_CONNECTION_TIMEOUT,
            tcp_verify_window: TCP_VERIFY_WINDOW,
            qos_interval: QOS_UPDATE_INTERVAL,
        }
    }
}

/// Construction-time settings of a channel.
///
/// `address` is the local bind address for servers and the remote peer for
/// clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Name exchanged in the handshake; both ends must agree.
    pub name: String,
    pub role: Role,
    pub protocol: Protocol,
    pub address: SocketAddr,
    /// Local bind address for UDP clients. Defaults to the wildcard address
    /// of the peer's family on an ephemeral port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_address: Option<SocketAddr>,
    /// Discard UDP messages whose id is not newer than the last one seen.
    #[serde(default)]
    pub drop_old_udp_packets: bool,
    #[serde(default)]
    pub timings: Timings,
}

impl ChannelConfig {
    /// A server channel bound on `bind`.
    pub fn server(name: impl Into<String>, protocol: Protocol, bind: SocketAddr) -> Self {
        Self::new(name.into(), Role::Server, protocol, bind)
    }

    /// A client channel connecting to `peer`.
    pub fn client(name: impl Into<String>, protocol: Protocol, peer: SocketAddr) -> Self {
        Self::new(name.into(), Role::Client, protocol, peer)
    }

    fn new(name: String, role: Role, protocol: Protocol, address: SocketAddr) -> Self {
        Self {
            name,
            role,
            protocol,
            address,
            local_address: None,
            drop_old_udp_packets: false,
            timings: Timings::default(),
        }
    }

    pub fn with_drop_old_udp_packets(mut self, drop_old: bool) -> Self {
        self.drop_old_udp_packets = drop_old;
        self
    }

    pub fn with_local_address(mut self, local: SocketAddr) -> Self {
        self.local_address = Some(local);
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    /// Check the settings before any socket is touched.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ChannelError::InvalidConfig(
                "channel name must not be empty".to_string(),
            ));
        }
        if self.name.len() > MAX_MESSAGE_LENGTH {
            return Err(ChannelError::InvalidConfig(format!(
                "channel name is {} bytes, max {MAX_MESSAGE_LENGTH}",
                self.name.len()
            )));
        }
        let t = &self.timings;
        for (field, value) in [
            ("monitor_interval", t.monitor_interval),
            ("idle_send_threshold", t.idle_send_threshold),
            ("idle_connection_timeout", t.idle_connection_timeout),
            ("tcp_verify_window", t.tcp_verify_window),
            ("qos_interval", t.qos_interval),
        ] {
            if value.is_zero() {
                return Err(ChannelError::InvalidConfig(format!(
                    "{field} must be non-zero"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn constructors_set_role() {
        let server = ChannelConfig::server("drive", Protocol::Udp, addr());
        assert!(server.is_server());
        assert_eq!(server.timings, Timings::default());
        assert!(!server.drop_old_udp_packets);

        let client = ChannelConfig::client("drive", Protocol::Tcp, addr())
            .with_drop_old_udp_packets(true);
        assert!(!client.is_server());
        assert!(client.drop_old_udp_packets);
    }

    #[test]
    fn default_timings_match_constants() {
        let t = Timings::default();
        assert_eq!(t.monitor_interval, Duration::from_millis(100));
        assert_eq!(t.idle_connection_timeout, Duration::from_millis(5000));
        assert_eq!(t.tcp_verify_window, Duration::from_millis(5000));
        assert_eq!(t.qos_interval, Duration::from_millis(1000));
    }

    #[test]
    fn validate_rejects_empty_name() {
        let config = ChannelConfig::server("", Protocol::Udp, addr());
        assert!(matches!(
            config.validate(),
            Err(ChannelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_oversized_name() {
        let config = ChannelConfig::server("n".repeat(513), Protocol::Udp, addr());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timer() {
        let timings = Timings {
            monitor_interval: Duration::ZERO,
            ..Timings::default()
        };
        let config = ChannelConfig::client("drive", Protocol::Udp, addr()).with_timings(timings);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("monitor_interval"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ChannelConfig = serde_json::from_str(
            r#"{"name":"shared","role":"server","protocol":"tcp","address":"0.0.0.0:5001"}"#,
        )
        .unwrap();
        assert_eq!(config.protocol, Protocol::Tcp);
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.timings, Timings::default());
        assert!(config.local_address.is_none());
    }

    #[test]
    fn role_parses() {
        assert_eq!("Server".parse::<Role>().unwrap(), Role::Server);
        assert!("peer".parse::<Role>().is_err());
    }
}
