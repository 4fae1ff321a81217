/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The type byte does not name a known message type.
    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),

    /// Fewer bytes than a complete header.
    #[error("truncated frame ({len} bytes, need at least {needed})")]
    Truncated { len: usize, needed: usize },

    /// The payload exceeds the maximum message length.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A TCP length prefix smaller than the frame header.
    #[error("invalid frame length {len}")]
    InvalidLength { len: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether a stream decoder has lost frame synchronisation.
    ///
    /// After a bad length prefix there is no way to find the next frame
    /// boundary, so buffered stream bytes must be discarded.
    pub fn loses_sync(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidLength { .. } | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
