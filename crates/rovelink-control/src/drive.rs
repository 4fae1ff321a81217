use bytes::Bytes;

use crate::axis::{axis_to_byte, clamp_i16, AXIS_CENTER};
use crate::error::{ControlError, Result};

/// Header byte of drive messages.
pub const DRIVE_HEADER: u8 = 1;

/// A drive command: header, left speed, right speed. 100 is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveMessage([u8; DriveMessage::LEN]);

impl DriveMessage {
    pub const LEN: usize = 3;

    /// Mix one stick into tank-style wheel speeds.
    pub fn single_stick(x: i16, y: i16) -> Self {
        let left = clamp_i16(i32::from(y) + i32::from(x));
        let right = clamp_i16(i32::from(y) - i32::from(x));
        Self([DRIVE_HEADER, axis_to_byte(left), axis_to_byte(right)])
    }

    /// Both sides stopped.
    pub fn stop() -> Self {
        Self([DRIVE_HEADER, AXIS_CENTER, AXIS_CENTER])
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let Some(raw) = bytes.get(..Self::LEN) else {
            return Err(ControlError::Truncated {
                len: bytes.len(),
                needed: Self::LEN,
            });
        };
        if raw[0] != DRIVE_HEADER {
            return Err(ControlError::UnknownHeader(raw[0]));
        }
        Ok(Self([raw[0], raw[1], raw[2]]))
    }

    pub fn left(&self) -> u8 {
        self.0[1]
    }

    pub fn right(&self) -> u8 {
        self.0[2]
    }

    pub fn is_stop(&self) -> bool {
        self.left() == AXIS_CENTER && self.right() == AXIS_CENTER
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<DriveMessage> for Bytes {
    fn from(msg: DriveMessage) -> Self {
        Bytes::copy_from_slice(&msg.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_centred() {
        let stop = DriveMessage::stop();
        assert_eq!(stop.as_bytes(), &[DRIVE_HEADER, 100, 100]);
        assert!(stop.is_stop());
        assert_eq!(DriveMessage::single_stick(0, 0), stop);
    }

    #[test]
    fn forward_and_turn() {
        let forward = DriveMessage::single_stick(0, i16::MAX);
        assert_eq!((forward.left(), forward.right()), (200, 200));

        let spin = DriveMessage::single_stick(i16::MAX, 0);
        assert_eq!((spin.left(), spin.right()), (200, 0));
    }

    #[test]
    fn mixing_saturates() {
        let msg = DriveMessage::single_stick(i16::MAX, i16::MAX);
        assert_eq!(msg.left(), 200);
        assert_eq!(msg.right(), 100);
    }

    #[test]
    fn parse() {
        let msg = DriveMessage::single_stick(-4000, 12000);
        let bytes = Bytes::from(msg);
        assert_eq!(DriveMessage::parse(&bytes).unwrap(), msg);
        assert!(matches!(
            DriveMessage::parse(&[DRIVE_HEADER, 1]),
            Err(ControlError::Truncated { len: 2, needed: 3 })
        ));
        assert!(matches!(
            DriveMessage::parse(&[7, 100, 100]),
            Err(ControlError::UnknownHeader(7))
        ));
    }
}
