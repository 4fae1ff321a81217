/// Byte value of a centred axis.
pub const AXIS_CENTER: u8 = 100;

/// Largest axis byte.
pub const AXIS_MAX: u8 = 200;

/// Deadzone applied by the calibrated encoding, as a fraction of full scale.
pub const GAMEPAD_DEADZONE: f32 = 0.2;

/// Map a full-range axis value onto `0..=200`, centred on 100.
pub fn axis_to_byte(value: i16) -> u8 {
    let shifted = i32::from(value) - i32::from(i16::MIN);
    ((shifted * i32::from(AXIS_MAX)) / i32::from(u16::MAX)) as u8
}

/// Zero `value` if its magnitude is below `fraction` of full scale.
pub fn filter_deadzone(value: i16, fraction: f32) -> i16 {
    if f32::from(value).abs() < fraction * f32::from(i16::MAX) {
        0
    } else {
        value
    }
}

pub(crate) fn clamp_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}
