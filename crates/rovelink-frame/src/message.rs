use std::fmt;

use bytes::Bytes;
use rovelink_transport::Protocol;

use crate::codec::{TCP_HEADER_SIZE, UDP_HEADER_SIZE};
use crate::error::FrameError;

/// Sequence id assigned by the sending endpoint.
pub type MessageId = u32;

/// Wire value of the message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Application payload.
    Normal = 0,
    /// Client side of the name exchange.
    ClientHandshake = 1,
    /// Server reply to an accepted client handshake.
    ServerHandshake = 2,
    /// Empty keep-alive.
    Heartbeat = 3,
    /// Echo of a received message id, for round-trip measurement.
    QosAck = 4,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Normal => "normal",
            MessageType::ClientHandshake => "client-handshake",
            MessageType::ServerHandshake => "server-handshake",
            MessageType::Heartbeat => "heartbeat",
            MessageType::QosAck => "qos-ack",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Normal),
            1 => Ok(MessageType::ClientHandshake),
            2 => Ok(MessageType::ServerHandshake),
            3 => Ok(MessageType::Heartbeat),
            4 => Ok(MessageType::QosAck),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed, sequenced message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub id: MessageId,
    pub payload: Bytes,
}

impl Message {
    pub fn new(kind: MessageType, id: MessageId, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            id,
            payload: payload.into(),
        }
    }

    /// An application message.
    pub fn normal(id: MessageId, payload: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Normal, id, payload)
    }

    /// A handshake carrying the channel name; `server` selects the reply form.
    pub fn handshake(server: bool, id: MessageId, name: &str) -> Self {
        let kind = if server {
            MessageType::ServerHandshake
        } else {
            MessageType::ClientHandshake
        };
        Self::new(kind, id, Bytes::copy_from_slice(name.as_bytes()))
    }

    pub fn heartbeat(id: MessageId) -> Self {
        Self::new(MessageType::Heartbeat, id, Bytes::new())
    }

    /// Acknowledges `acked`; the id travels in the frame's own id field.
    pub fn qos_ack(acked: MessageId) -> Self {
        Self::new(MessageType::QosAck, acked, Bytes::new())
    }

    /// The total wire size of this message under `protocol`.
    pub fn wire_size(&self, protocol: Protocol) -> usize {
        let header = match protocol {
            Protocol::Udp => UDP_HEADER_SIZE,
            Protocol::Tcp => TCP_HEADER_SIZE,
        };
        header + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bytes_match_wire_values() {
        for (byte, kind) in [
            (0u8, MessageType::Normal),
            (1, MessageType::ClientHandshake),
            (2, MessageType::ServerHandshake),
            (3, MessageType::Heartbeat),
            (4, MessageType::QosAck),
        ] {
            assert_eq!(MessageType::try_from(byte).unwrap(), kind);
            assert_eq!(u8::from(kind), byte);
        }
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        assert!(matches!(
            MessageType::try_from(5),
            Err(FrameError::UnknownMessageType(5))
        ));
    }

    #[test]
    fn handshake_carries_name() {
        let client = Message::handshake(false, 1, "drive");
        assert_eq!(client.kind, MessageType::ClientHandshake);
        assert_eq!(client.payload.as_ref(), b"drive");

        let server = Message::handshake(true, 1, "drive");
        assert_eq!(server.kind, MessageType::ServerHandshake);
    }

    #[test]
    fn wire_size_per_protocol() {
        let msg = Message::normal(9, Bytes::from_static(b"abcd"));
        assert_eq!(msg.wire_size(Protocol::Udp), 9);
        assert_eq!(msg.wire_size(Protocol::Tcp), 11);
    }
}
