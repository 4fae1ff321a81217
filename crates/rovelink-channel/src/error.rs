use crate::state::Status;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] rovelink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] rovelink_frame::FrameError),

    /// The configuration cannot be used to build a channel.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The peer's handshake was rejected.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Application payload exceeds the maximum message length.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The channel is not in the Connected state.
    #[error("channel not connected (status: {0})")]
    NotConnected(Status),

    /// The send-id counter has no values left.
    #[error("sequence ids exhausted")]
    SequenceExhausted,

    /// The channel entered its fatal state.
    #[error("channel failed: {0}")]
    Fatal(String),

    /// The channel's driver task has shut down.
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
