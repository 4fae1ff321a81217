//! Typed, sequenced message framing for rovelink channels.
//!
//! Every message carries a type byte and a 32-bit sequence id:
//! - UDP: one message per datagram, `type | id | payload`
//! - TCP: length-prefixed frames, `length | type | id | payload`
//!
//! All integers are big-endian. Payloads are capped at
//! [`MAX_MESSAGE_LENGTH`] bytes.

pub mod codec;
pub mod error;
pub mod message;
pub mod stream;

pub use codec::{
    decode_tcp, decode_udp, encode_tcp, encode_udp, MAX_MESSAGE_LENGTH, MAX_TCP_FRAME_SIZE,
    TCP_HEADER_SIZE, UDP_HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{Message, MessageId, MessageType};
pub use rovelink_transport::Protocol;
pub use stream::TcpCodec;
