//! Control payloads carried over rovelink channels.
//!
//! Arm messages come in two layouts selected by [`ArmEncoding`]. Drive
//! messages are a fixed three bytes. All multi-byte fields are big-endian.

pub mod arm;
pub mod axis;
pub mod drive;
pub mod error;

pub use arm::{
    ArmEncoder, ArmEncoding, ArmMessage, ArmMessageKind, GamepadState, JointCalibration,
    MasterArmConfig, MasterArmReading,
};
pub use axis::{axis_to_byte, filter_deadzone, AXIS_CENTER, GAMEPAD_DEADZONE};
pub use drive::{DriveMessage, DRIVE_HEADER};
pub use error::{ControlError, Result};
