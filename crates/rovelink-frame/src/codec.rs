use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::{Message, MessageType};

/// UDP header: type (1) + id (4) = 5 bytes.
pub const UDP_HEADER_SIZE: usize = 5;

/// TCP header: length (2) + type (1) + id (4) = 7 bytes.
pub const TCP_HEADER_SIZE: usize = 7;

/// Maximum payload carried by one message.
pub const MAX_MESSAGE_LENGTH: usize = 512;

/// Largest value a TCP length prefix may hold.
pub const MAX_TCP_FRAME_SIZE: usize = TCP_HEADER_SIZE + MAX_MESSAGE_LENGTH;

fn check_payload(payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_MESSAGE_LENGTH {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_LENGTH,
        });
    }
    Ok(())
}

/// Encode a message as one UDP datagram.
///
/// Wire format (integers big-endian):
/// ```text
/// ┌──────────┬──────────┬──────────────────┐
/// │ Type     │ Id       │ Payload          │
/// │ (1B)     │ (4B BE)  │ (0..512 bytes)   │
/// └──────────┴──────────┴──────────────────┘
/// ```
pub fn encode_udp(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    check_payload(&msg.payload)?;
    dst.reserve(UDP_HEADER_SIZE + msg.payload.len());
    dst.put_u8(msg.kind.into());
    dst.put_u32(msg.id);
    dst.put_slice(&msg.payload);
    Ok(())
}

/// Decode one UDP datagram.
pub fn decode_udp(datagram: &[u8]) -> Result<Message> {
    if datagram.len() < UDP_HEADER_SIZE {
        return Err(FrameError::Truncated {
            len: datagram.len(),
            needed: UDP_HEADER_SIZE,
        });
    }
    let mut header = &datagram[..UDP_HEADER_SIZE];
    let kind = MessageType::try_from(header.get_u8())?;
    let id = header.get_u32();
    let payload = &datagram[UDP_HEADER_SIZE..];
    check_payload(payload)?;

    Ok(Message {
        kind,
        id,
        payload: Bytes::copy_from_slice(payload),
    })
}

/// Encode a message as one TCP stream frame.
///
/// Wire format (integers big-endian; length counts the whole frame):
/// ```text
/// ┌──────────┬──────────┬──────────┬──────────────────┐
/// │ Length   │ Type     │ Id       │ Payload          │
/// │ (2B BE)  │ (1B)     │ (4B BE)  │ (0..512 bytes)   │
/// └──────────┴──────────┴──────────┴──────────────────┘
/// ```
pub fn encode_tcp(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    check_payload(&msg.payload)?;
    let total = TCP_HEADER_SIZE + msg.payload.len();
    dst.reserve(total);
    // Bounded by MAX_TCP_FRAME_SIZE, which fits in u16.
    dst.put_u16(total as u16);
    dst.put_u8(msg.kind.into());
    dst.put_u32(msg.id);
    dst.put_slice(&msg.payload);
    Ok(())
}

/// Decode one TCP frame from a read-ahead buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet, in
/// which case nothing is consumed. A frame with an unknown type byte is
/// consumed before the error is returned, so the stream stays in sync. A bad
/// length prefix consumes nothing (see [`FrameError::loses_sync`]).
pub fn decode_tcp(src: &mut BytesMut) -> Result<Option<Message>> {
    if src.len() < 2 {
        return Ok(None);
    }

    let total = u16::from_be_bytes([src[0], src[1]]) as usize;
    if total < TCP_HEADER_SIZE {
        return Err(FrameError::InvalidLength { len: total });
    }
    if total > MAX_TCP_FRAME_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: total - TCP_HEADER_SIZE,
            max: MAX_MESSAGE_LENGTH,
        });
    }
    if src.len() < total {
        return Ok(None);
    }

    let mut frame = src.split_to(total);
    frame.advance(2);
    let type_byte = frame.get_u8();
    let id = frame.get_u32();
    let kind = MessageType::try_from(type_byte)?;

    Ok(Some(Message {
        kind,
        id,
        payload: frame.freeze(),
    }))
}
