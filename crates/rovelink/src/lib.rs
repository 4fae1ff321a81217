//! Ground-station and rover telemetry over UDP and TCP.
//!
//! rovelink connects a control station to the compute units on a rover with
//! named, self-healing channels. Each channel handshakes, keeps itself alive
//! with heartbeats, reconnects after timeouts and reports round-trip time.
//!
//! # Crate Structure
//!
//! - [`transport`]: Socket binding and connection helpers (UDP, TCP)
//! - [`frame`]: Message types and the UDP/TCP wire codecs
//! - [`channel`]: Connection-managed channels (behind `channel` feature)
//! - [`control`]: Arm and drive payload encoding (behind `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use rovelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rovelink_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use rovelink_channel::*;
}

/// Re-export control payload types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod control {
    pub use rovelink_control::*;
}
