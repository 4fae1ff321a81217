//! Telemetry channels between a ground station and a rover.
//!
//! A [`Channel`] is one logical, bidirectional link to a single peer over
//! UDP or TCP. It handshakes on the channel name, keeps the link alive with
//! heartbeats, reconnects after idle timeouts and samples round-trip time.
//! Application payloads are opaque bytes of at most
//! [`MAX_MESSAGE_LENGTH`](rovelink_frame::MAX_MESSAGE_LENGTH) bytes.
//!
//! The connection logic lives in [`ChannelCore`], which performs no I/O and
//! takes time as an explicit input. [`Channel`] wraps it in a tokio task
//! that owns the sockets.

pub mod channel;
pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod handshake;
pub mod monitor;
pub mod qos;
pub mod route;
pub mod state;

pub use channel::Channel;
pub use config::{
    ChannelConfig, Role, Timings, IDLE_CONNECTION_TIMEOUT, IDLE_SEND_THRESHOLD, MONITOR_INTERVAL,
    QOS_UPDATE_INTERVAL, TCP_VERIFY_WINDOW,
};
pub use crate::core::{ChannelCore, Output, INITIAL_SEND_ID};
pub use error::{ChannelError, Result};
pub use event::ChannelEvent;
pub use qos::{QosSample, SENT_TIME_TABLE_CAP};
pub use route::{ChannelId, RouteTarget};
pub use state::Status;
