/// Errors from encoding or decoding control payloads.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The output buffer cannot hold the message.
    #[error("buffer of {len} bytes too small, need {needed}")]
    BufferTooSmall { len: usize, needed: usize },

    /// A received message is shorter than its layout.
    #[error("message of {len} bytes truncated, need {needed}")]
    Truncated { len: usize, needed: usize },

    /// The header byte names no known message kind.
    #[error("unknown control message header: {0:#04x}")]
    UnknownHeader(u8),

    /// A joint's calibrated range is empty or inverted.
    #[error("invalid calibration for {joint}: min {min} must be below max {max}")]
    InvalidCalibration {
        joint: &'static str,
        min: u16,
        max: u16,
    },
}

pub type Result<T> = std::result::Result<T, ControlError>;
