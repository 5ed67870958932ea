//! 64-entry signed sine lookup table shared by vibrato and tremolo.
//!
//! Values are unsigned on the wire (ProTracker stores them as `u8`) but are
//! meant to be reinterpreted as `i8` before use, giving a signed range of
//! roughly [-128, 127] across the cycle.

#[rustfmt::skip]
const SINE_TABLE: [u8; 64] = [
    0,  24,  49,  74,  97, 120, 141, 161, 180, 197, 212, 224, 235, 244, 250, 253,
  255, 253, 250, 244, 235, 224, 212, 197, 180, 161, 141, 120,  97,  74,  49,  24,
    0, 232, 207, 182, 159, 136, 115,  95,  76,  59,  44,  32,  21,  12,   6,   3,
    1,   3,   6,  12,  21,  32,  44,  59,  76,  95, 115, 136, 159, 182, 207, 232,
];

/// Signed sine value at `phase`, wrapped modulo 64.
pub fn sine(phase: u8) -> i8 {
    SINE_TABLE[(phase & 0x3F) as usize] as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_zero_is_zero() {
        assert_eq!(sine(0), 0);
    }

    #[test]
    fn phase_wraps_at_64() {
        assert_eq!(sine(64), sine(0));
        assert_eq!(sine(65), sine(1));
    }

    #[test]
    fn table_has_negative_half() {
        assert!(sine(40) < 0);
    }
}
