//! Packed precision/scale/size byte shared by the numeric command classes.
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! +-----------+-------+-----------+
//! | precision | scale |   size    |
//! +-----------+-------+-----------+
//! ```
//!
//! The value that follows is `size` bytes, big-endian, two's complement.
//! The reported quantity is `value / 10^precision`.

use crate::error::{Result, ZWaveError};

const PRECISION_SHIFT: u8 = 5;
const PRECISION_MASK: u8 = 0b1110_0000;
const SCALE_SHIFT: u8 = 3;
const SCALE_MASK: u8 = 0b0001_1000;
const SIZE_MASK: u8 = 0b0000_0111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub precision: u8,
    pub scale: u8,
    pub size: u8,
}

impl Metadata {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            precision: (byte & PRECISION_MASK) >> PRECISION_SHIFT,
            scale: (byte & SCALE_MASK) >> SCALE_SHIFT,
            size: byte & SIZE_MASK,
        }
    }

    pub fn to_byte(self) -> u8 {
        ((self.precision << PRECISION_SHIFT) & PRECISION_MASK)
            | ((self.scale << SCALE_SHIFT) & SCALE_MASK)
            | (self.size & SIZE_MASK)
    }
}

/// Read a 1, 2 or 4 byte big-endian signed value.
pub fn decode_value(raw: &[u8]) -> Result<i32> {
    match *raw {
        [a] => Ok(a as i8 as i32),
        [a, b] => Ok(i16::from_be_bytes([a, b]) as i32),
        [a, b, c, d] => Ok(i32::from_be_bytes([a, b, c, d])),
        _ => Err(ZWaveError::Decode(format!(
            "unsupported value size {}",
            raw.len()
        ))),
    }
}

/// Encode `value` in `size` bytes, rejecting values that do not fit.
pub fn encode_value(value: i32, size: u8) -> Result<Vec<u8>> {
    let out_of_range = || {
        ZWaveError::InvalidArgument(format!("value {} does not fit in {} byte(s)", value, size))
    };
    match size {
        1 => Ok(i8::try_from(value).map_err(|_| out_of_range())?.to_be_bytes().to_vec()),
        2 => Ok(i16::try_from(value).map_err(|_| out_of_range())?.to_be_bytes().to_vec()),
        4 => Ok(value.to_be_bytes().to_vec()),
        _ => Err(ZWaveError::InvalidArgument(format!(
            "unsupported value size {}",
            size
        ))),
    }
}

/// `raw / 10^precision`.
pub fn scaled(raw: i32, precision: u8) -> f64 {
    raw as f64 / 10f64.powi(precision as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_temperature_metadata() {
        let meta = Metadata::from_byte(0x22);
        assert_eq!(
            meta,
            Metadata {
                precision: 1,
                scale: 0,
                size: 2
            }
        );
        assert_eq!(meta.to_byte(), 0x22);

        let meta = Metadata::from_byte(0b0100_1001);
        assert_eq!((meta.precision, meta.scale, meta.size), (2, 1, 1));
    }

    #[test]
    fn test_values_are_sign_extended() {
        assert_eq!(decode_value(&[0xFF]).unwrap(), -1);
        assert_eq!(decode_value(&[0xFF, 0x38]).unwrap(), -200);
        assert_eq!(decode_value(&[0x00, 0xDA]).unwrap(), 218);
        assert_eq!(decode_value(&[0x80, 0x00, 0x00, 0x00]).unwrap(), i32::MIN);
    }

    #[test]
    fn test_odd_size_is_decode_error() {
        assert!(matches!(decode_value(&[0x00, 0x01, 0x02]), Err(ZWaveError::Decode(_))));
        assert!(matches!(decode_value(&[]), Err(ZWaveError::Decode(_))));
    }

    #[test]
    fn test_encode_value_range() {
        assert_eq!(encode_value(-200, 2).unwrap(), vec![0xFF, 0x38]);
        assert!(encode_value(200, 1).is_err());
        assert!(encode_value(1, 3).is_err());
    }

    #[test]
    fn test_scaled() {
        assert!((scaled(218, 1) - 21.8).abs() < 1e-9);
        assert!((scaled(-5, 0) + 5.0).abs() < 1e-9);
    }
}
