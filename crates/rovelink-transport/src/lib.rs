//! UDP and TCP socket plumbing for rovelink channels.
//!
//! This is the lowest layer of rovelink. It binds, accepts and connects tokio
//! sockets and classifies their failures into recoverable and fatal ones;
//! framing and connection state live further up.

pub mod error;
pub mod protocol;
pub mod socket;

pub use error::{Result, TransportError};
pub use protocol::Protocol;
pub use socket::{accept_tcp, bind_tcp, bind_udp, connect_tcp, unspecified_for};
