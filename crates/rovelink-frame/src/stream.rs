use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::codec::{decode_tcp, encode_tcp};
use crate::error::FrameError;
use crate::message::Message;

/// Stream codec for the TCP frame layout.
///
/// The caller owns the read-ahead buffer; `decode` leaves partial frames in
/// it until more bytes arrive. When a length prefix is unusable the buffered
/// bytes are discarded and the error returned, so a driver that keeps reading
/// resumes with whatever the peer sends next.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpCodec;

impl TcpCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for TcpCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        match decode_tcp(src) {
            Err(err) if err.loses_sync() => {
                warn!(discarded = src.len(), %err, "discarding buffered stream bytes");
                src.clear();
                Err(err)
            }
            other => other,
        }
    }
}

impl Encoder<Message> for TcpCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_tcp(&item, dst)
    }
}

impl Encoder<&Message> for TcpCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_tcp(item, dst)
    }
}
