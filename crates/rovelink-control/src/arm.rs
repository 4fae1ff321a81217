use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::axis::{axis_to_byte, clamp_i16, filter_deadzone, GAMEPAD_DEADZONE};
use crate::error::{ControlError, Result};

pub const INDEX_HEADER: usize = 0;
pub const INDEX_GAMEPAD_X: usize = 1;
pub const INDEX_GAMEPAD_Y: usize = 2;
pub const INDEX_GAMEPAD_YAW: usize = 3;
pub const INDEX_GAMEPAD_WRIST: usize = 4;
pub const INDEX_MASTER_YAW: usize = 1;
pub const INDEX_MASTER_SHOULDER: usize = 3;
pub const INDEX_MASTER_ELBOW: usize = 5;
pub const INDEX_MASTER_WRIST: usize = 7;
pub const INDEX_OPEN_BUCKET: usize = 9;
pub const INDEX_CLOSE_BUCKET: usize = 10;
pub const INDEX_STOW: usize = 11;
pub const INDEX_DUMP: usize = 12;

/// Which arm message layout a link speaks.
///
/// `Legacy` sends raw axis bytes and raw master values in 12 bytes.
/// `Calibrated` filters gamepad deadzones, adds a dump flag and maps master
/// values through a [`MasterArmConfig`], in 13 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmEncoding {
    Legacy,
    #[default]
    Calibrated,
}

impl ArmEncoding {
    pub fn message_len(self) -> usize {
        match self {
            ArmEncoding::Legacy => 12,
            ArmEncoding::Calibrated => 13,
        }
    }

    /// Header byte of `kind` under this encoding.
    pub fn header(self, kind: ArmMessageKind) -> u8 {
        match (self, kind) {
            (ArmEncoding::Legacy, ArmMessageKind::Gamepad) => 0,
            (ArmEncoding::Legacy, ArmMessageKind::Master) => 1,
            (ArmEncoding::Calibrated, ArmMessageKind::Master) => 2,
            (ArmEncoding::Calibrated, ArmMessageKind::Gamepad) => 3,
        }
    }

    fn kind_of(self, header: u8) -> Option<ArmMessageKind> {
        [ArmMessageKind::Gamepad, ArmMessageKind::Master]
            .into_iter()
            .find(|kind| self.header(*kind) == header)
    }
}

/// Source of an arm message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmMessageKind {
    Gamepad,
    Master,
}

impl fmt::Display for ArmMessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmMessageKind::Gamepad => f.write_str("gamepad"),
            ArmMessageKind::Master => f.write_str("master"),
        }
    }
}

/// Gamepad axes and buttons used for arm control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GamepadState {
    pub left_x: i16,
    pub left_y: i16,
    pub right_y: i16,
    pub left_trigger: i16,
    pub right_trigger: i16,
    pub bucket_open: bool,
    pub bucket_close: bool,
    pub stow: bool,
    pub dump: bool,
}

/// Raw joint positions from the master arm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasterArmReading {
    pub yaw: u16,
    pub shoulder: u16,
    pub elbow: u16,
    pub wrist: u16,
    /// Bucket closed; open otherwise.
    pub bucket_closed: bool,
    pub stow: bool,
    pub dump: bool,
}

/// Calibrated range of one master-arm joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointCalibration {
    pub min: u16,
    pub max: u16,
    /// Offset added after scaling.
    #[serde(default)]
    pub add: i32,
    #[serde(default)]
    pub reverse: bool,
}

impl Default for JointCalibration {
    fn default() -> Self {
        Self {
            min: 0,
            max: u16::MAX,
            add: 0,
            reverse: false,
        }
    }
}

impl JointCalibration {
    /// Scale `raw` from `min..max` onto the full u16 range.
    pub fn translate(&self, raw: u16) -> u16 {
        let span = f32::from(self.max) - f32::from(self.min);
        let scaled = self.add as f32 + (f32::from(raw) - f32::from(self.min)) * (f32::from(u16::MAX) / span);
        let clamped = scaled.clamp(0.0, f32::from(u16::MAX));
        if clamped != scaled {
            trace!(raw, scaled, "master arm value clamped");
        }
        let value = clamped as u16;
        if self.reverse {
            u16::MAX - value
        } else {
            value
        }
    }
}

/// Per-joint master-arm calibration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterArmConfig {
    #[serde(default)]
    pub yaw: JointCalibration,
    #[serde(default)]
    pub shoulder: JointCalibration,
    #[serde(default)]
    pub elbow: JointCalibration,
    #[serde(default)]
    pub wrist: JointCalibration,
}

impl MasterArmConfig {
    pub fn validate(&self) -> Result<()> {
        for (joint, cal) in self.joints() {
            if cal.min >= cal.max {
                return Err(ControlError::InvalidCalibration {
                    joint,
                    min: cal.min,
                    max: cal.max,
                });
            }
        }
        Ok(())
    }

    fn joints(&self) -> [(&'static str, &JointCalibration); 4] {
        [
            ("yaw", &self.yaw),
            ("shoulder", &self.shoulder),
            ("elbow", &self.elbow),
            ("wrist", &self.wrist),
        ]
    }
}

/// Writes arm messages in one [`ArmEncoding`].
#[derive(Debug, Clone)]
pub struct ArmEncoder {
    encoding: ArmEncoding,
    calibration: MasterArmConfig,
}

impl ArmEncoder {
    pub fn legacy() -> Self {
        Self {
            encoding: ArmEncoding::Legacy,
            calibration: MasterArmConfig::default(),
        }
    }

    pub fn calibrated(calibration: MasterArmConfig) -> Result<Self> {
        calibration.validate()?;
        Ok(Self {
            encoding: ArmEncoding::Calibrated,
            calibration,
        })
    }

    pub fn encoding(&self) -> ArmEncoding {
        self.encoding
    }

    pub fn message_len(&self) -> usize {
        self.encoding.message_len()
    }

    /// Encode a gamepad message into `buf`. Returns the number of bytes written.
    pub fn encode_gamepad(&self, state: &GamepadState, buf: &mut [u8]) -> Result<usize> {
        let len = self.message_len();
        let mut out = self.output(buf)?;
        let axis = |value: i16| match self.encoding {
            ArmEncoding::Legacy => axis_to_byte(value),
            ArmEncoding::Calibrated => axis_to_byte(filter_deadzone(value, GAMEPAD_DEADZONE)),
        };
        let wrist = clamp_i16(i32::from(state.right_trigger) - i32::from(state.left_trigger));

        out.put_u8(self.encoding.header(ArmMessageKind::Gamepad));
        out.put_u8(axis(state.left_x));
        // Arm Y rides the right stick; yaw rides the left stick's Y.
        out.put_u8(axis(state.right_y));
        out.put_u8(axis(state.left_y));
        out.put_u8(axis(wrist));
        // Master joint bytes 5..=8 are unused by gamepad messages.
        out.put_bytes(0, INDEX_OPEN_BUCKET - INDEX_GAMEPAD_WRIST - 1);
        out.put_u8(u8::from(state.bucket_open));
        out.put_u8(u8::from(state.bucket_close));
        out.put_u8(u8::from(state.stow));
        if self.encoding == ArmEncoding::Calibrated {
            out.put_u8(u8::from(state.dump));
        }
        Ok(len)
    }

    /// Encode a master-arm message into `buf`. Returns the number of bytes
    /// written.
    pub fn encode_master(&self, reading: &MasterArmReading, buf: &mut [u8]) -> Result<usize> {
        let len = self.message_len();
        let mut out = self.output(buf)?;
        let joint = |raw: u16, cal: &JointCalibration| match self.encoding {
            ArmEncoding::Legacy => raw,
            ArmEncoding::Calibrated => cal.translate(raw),
        };
        let cal = &self.calibration;

        out.put_u8(self.encoding.header(ArmMessageKind::Master));
        out.put_u16(joint(reading.yaw, &cal.yaw));
        out.put_u16(joint(reading.shoulder, &cal.shoulder));
        out.put_u16(joint(reading.elbow, &cal.elbow));
        out.put_u16(joint(reading.wrist, &cal.wrist));
        match self.encoding {
            // Legacy master messages carry joints only.
            ArmEncoding::Legacy => out.put_bytes(0, len - INDEX_OPEN_BUCKET),
            ArmEncoding::Calibrated => {
                out.put_u8(u8::from(!reading.bucket_closed));
                out.put_u8(u8::from(reading.bucket_closed));
                out.put_u8(u8::from(reading.stow));
                out.put_u8(u8::from(reading.dump));
            }
        }
        Ok(len)
    }

    fn output<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8]> {
        let needed = self.message_len();
        if buf.len() < needed {
            return Err(ControlError::BufferTooSmall {
                len: buf.len(),
                needed,
            });
        }
        Ok(&mut buf[..needed])
    }
}

/// Read-side view of an arm message.
#[derive(Debug, Clone, Copy)]
pub struct ArmMessage<'a> {
    kind: ArmMessageKind,
    bytes: &'a [u8],
}

impl<'a> ArmMessage<'a> {
    pub fn parse(encoding: ArmEncoding, bytes: &'a [u8]) -> Result<Self> {
        let needed = encoding.message_len();
        if bytes.len() < needed {
            return Err(ControlError::Truncated {
                len: bytes.len(),
                needed,
            });
        }
        let header = bytes[INDEX_HEADER];
        let kind = encoding
            .kind_of(header)
            .ok_or(ControlError::UnknownHeader(header))?;
        Ok(Self {
            kind,
            bytes: &bytes[..needed],
        })
    }

    pub fn kind(&self) -> ArmMessageKind {
        self.kind
    }

    pub fn master_yaw(&self) -> u16 {
        self.u16_at(INDEX_MASTER_YAW)
    }

    pub fn master_shoulder(&self) -> u16 {
        self.u16_at(INDEX_MASTER_SHOULDER)
    }

    pub fn master_elbow(&self) -> u16 {
        self.u16_at(INDEX_MASTER_ELBOW)
    }

    pub fn master_wrist(&self) -> u16 {
        self.u16_at(INDEX_MASTER_WRIST)
    }

    pub fn bucket_open(&self) -> bool {
        self.bytes[INDEX_OPEN_BUCKET] != 0
    }

    pub fn bucket_close(&self) -> bool {
        self.bytes[INDEX_CLOSE_BUCKET] != 0
    }

    pub fn stow(&self) -> bool {
        self.bytes[INDEX_STOW] != 0
    }

    /// Always false for legacy messages, which carry no dump flag.
    pub fn dump(&self) -> bool {
        self.bytes.get(INDEX_DUMP).is_some_and(|b| *b != 0)
    }

    fn u16_at(&self, index: usize) -> u16 {
        let mut field = &self.bytes[index..index + 2];
        field.get_u16()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AXIS_CENTER;

    fn calibration() -> MasterArmConfig {
        MasterArmConfig {
            yaw: JointCalibration {
                min: 1000,
                max: 3000,
                add: 0,
                reverse: false,
            },
            shoulder: JointCalibration {
                min: 1000,
                max: 3000,
                add: 0,
                reverse: true,
            },
            elbow: JointCalibration {
                min: 0,
                max: 1000,
                add: 500,
                reverse: false,
            },
            wrist: JointCalibration::default(),
        }
    }

    #[test]
    fn message_lengths() {
        assert_eq!(ArmEncoder::legacy().message_len(), 12);
        assert_eq!(
            ArmEncoder::calibrated(MasterArmConfig::default())
                .unwrap()
                .message_len(),
            13
        );
    }

    #[test]
    fn legacy_gamepad_has_no_deadzone() {
        let state = GamepadState {
            left_x: 3000,
            ..Default::default()
        };
        let mut buf = [0u8; 12];
        ArmEncoder::legacy().encode_gamepad(&state, &mut buf).unwrap();
        assert_eq!(buf[INDEX_HEADER], 0);
        assert_eq!(buf[INDEX_GAMEPAD_X], axis_to_byte(3000));
        assert_ne!(buf[INDEX_GAMEPAD_X], AXIS_CENTER);
    }

    #[test]
    fn calibrated_gamepad_layout() {
        let state = GamepadState {
            left_x: 3000,
            left_y: i16::MIN,
            right_y: i16::MAX,
            left_trigger: -20_000,
            right_trigger: 20_000,
            bucket_open: true,
            bucket_close: false,
            stow: true,
            dump: true,
        };
        let encoder = ArmEncoder::calibrated(MasterArmConfig::default()).unwrap();
        let mut buf = [0xFFu8; 16];
        assert_eq!(encoder.encode_gamepad(&state, &mut buf).unwrap(), 13);

        assert_eq!(buf[INDEX_HEADER], 3);
        assert_eq!(buf[INDEX_GAMEPAD_X], AXIS_CENTER);
        assert_eq!(buf[INDEX_GAMEPAD_Y], 200);
        assert_eq!(buf[INDEX_GAMEPAD_YAW], 0);
        // 40000 clamps to i16::MAX.
        assert_eq!(buf[INDEX_GAMEPAD_WRIST], 200);
        assert_eq!(&buf[5..9], &[0, 0, 0, 0]);
        assert_eq!(&buf[9..13], &[1, 0, 1, 1]);
        assert_eq!(buf[13], 0xFF);
    }

    #[test]
    fn each_stick_lands_in_its_byte() {
        for encoder in [
            ArmEncoder::legacy(),
            ArmEncoder::calibrated(MasterArmConfig::default()).unwrap(),
        ] {
            let mut buf = [0u8; 13];

            let left_y = GamepadState {
                left_y: i16::MAX,
                ..Default::default()
            };
            encoder.encode_gamepad(&left_y, &mut buf).unwrap();
            assert_eq!(buf[INDEX_GAMEPAD_X], AXIS_CENTER);
            assert_eq!(buf[INDEX_GAMEPAD_Y], AXIS_CENTER);
            assert_eq!(buf[INDEX_GAMEPAD_YAW], 200);

            let right_y = GamepadState {
                right_y: i16::MAX,
                ..Default::default()
            };
            encoder.encode_gamepad(&right_y, &mut buf).unwrap();
            assert_eq!(buf[INDEX_GAMEPAD_X], AXIS_CENTER);
            assert_eq!(buf[INDEX_GAMEPAD_Y], 200);
            assert_eq!(buf[INDEX_GAMEPAD_YAW], AXIS_CENTER);

            let left_x = GamepadState {
                left_x: i16::MIN,
                ..Default::default()
            };
            encoder.encode_gamepad(&left_x, &mut buf).unwrap();
            assert_eq!(buf[INDEX_GAMEPAD_X], 0);
            assert_eq!(buf[INDEX_GAMEPAD_Y], AXIS_CENTER);
            assert_eq!(buf[INDEX_GAMEPAD_YAW], AXIS_CENTER);
        }
    }

    #[test]
    fn buffer_too_small() {
        let mut buf = [0u8; 12];
        let encoder = ArmEncoder::calibrated(MasterArmConfig::default()).unwrap();
        assert!(matches!(
            encoder.encode_gamepad(&GamepadState::default(), &mut buf),
            Err(ControlError::BufferTooSmall { len: 12, needed: 13 })
        ));
    }

    #[test]
    fn legacy_master_copies_raw_values() {
        let reading = MasterArmReading {
            yaw: 0x1234,
            shoulder: 2,
            elbow: 3,
            wrist: 0xFFFF,
            bucket_closed: true,
            stow: false,
            dump: true,
        };
        let mut buf = [0xAAu8; 12];
        ArmEncoder::legacy().encode_master(&reading, &mut buf).unwrap();
        assert_eq!(&buf[..3], &[1, 0x12, 0x34]);
        // No button flags in the legacy layout.
        assert_eq!(&buf[INDEX_OPEN_BUCKET..], &[0, 0, 0]);

        let msg = ArmMessage::parse(ArmEncoding::Legacy, &buf).unwrap();
        assert_eq!(msg.kind(), ArmMessageKind::Master);
        assert_eq!(msg.master_yaw(), 0x1234);
        assert_eq!(msg.master_shoulder(), 2);
        assert_eq!(msg.master_elbow(), 3);
        assert_eq!(msg.master_wrist(), 0xFFFF);
        assert!(!msg.bucket_open());
        assert!(!msg.bucket_close());
        assert!(!msg.stow());
    }

    #[test]
    fn calibrated_master_translation() {
        let encoder = ArmEncoder::calibrated(calibration()).unwrap();
        let reading = MasterArmReading {
            yaw: 2000,
            shoulder: 3500,
            elbow: 2000,
            wrist: 0,
            bucket_closed: false,
            stow: true,
            dump: true,
        };
        let mut buf = [0u8; 13];
        encoder.encode_master(&reading, &mut buf).unwrap();

        let msg = ArmMessage::parse(ArmEncoding::Calibrated, &buf).unwrap();
        assert_eq!(msg.kind(), ArmMessageKind::Master);
        // Midpoint of 1000..3000 lands mid-scale.
        assert_eq!(msg.master_yaw(), 32767);
        // Clamped to full scale, then reversed.
        assert_eq!(msg.master_shoulder(), 0);
        // Beyond the range clamps.
        assert_eq!(msg.master_elbow(), u16::MAX);
        assert_eq!(msg.master_wrist(), 0);
        assert!(msg.bucket_open());
        assert!(msg.stow());
        assert!(msg.dump());
    }

    #[test]
    fn translate_clamps_below_zero() {
        let cal = JointCalibration {
            min: 1000,
            max: 2000,
            add: 0,
            reverse: false,
        };
        assert_eq!(cal.translate(500), 0);
        let reversed = JointCalibration {
            reverse: true,
            ..cal
        };
        assert_eq!(reversed.translate(500), u16::MAX);
    }

    #[test]
    fn invalid_calibration_rejected() {
        let mut config = calibration();
        config.elbow.max = config.elbow.min;
        assert!(matches!(
            ArmEncoder::calibrated(config),
            Err(ControlError::InvalidCalibration { joint: "elbow", .. })
        ));
    }

    #[test]
    fn parse_rejects_short_and_unknown() {
        assert!(matches!(
            ArmMessage::parse(ArmEncoding::Calibrated, &[3u8; 12]),
            Err(ControlError::Truncated { len: 12, needed: 13 })
        ));
        assert!(matches!(
            ArmMessage::parse(ArmEncoding::Legacy, &[9u8; 12]),
            Err(ControlError::UnknownHeader(9))
        ));
    }

    #[test]
    fn config_from_json() {
        let config: MasterArmConfig = serde_json::from_str(
            r#"{"yaw": {"min": 10, "max": 20, "reverse": true}}"#,
        )
        .unwrap();
        assert_eq!(config.yaw.min, 10);
        assert!(config.yaw.reverse);
        assert_eq!(config.yaw.add, 0);
        assert_eq!(config.shoulder, JointCalibration::default());

        let encoding: ArmEncoding = serde_json::from_str(r#""legacy""#).unwrap();
        assert_eq!(encoding, ArmEncoding::Legacy);
    }
}
