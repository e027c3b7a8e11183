//! CRC-16 encapsulation (0x56).
//!
//! ```text
//! [0x56, 0x01, inner..., crcHi, crcLo]
//! ```
//!
//! The checksum is CRC-16/AUG-CCITT: polynomial 0x1021, initial value
//! 0x1D0F, no reflection, computed over everything but the two trailing
//! bytes.
//!
//! ```
//! use zwave_serial::command_class::crc16::{decapsulate, encapsulate};
//!
//! let wrapped = encapsulate(&[0x20, 0x02]);
//! assert_eq!(wrapped.as_ref(), &[0x56, 0x01, 0x20, 0x02, 0x4D, 0x26]);
//! assert_eq!(decapsulate(&wrapped).unwrap(), &[0x20, 0x02]);
//! ```

use bytes::Bytes;

use super::CommandClassId;
use crate::error::{Result, ZWaveError};

pub const ENCAP: u8 = 0x01;

const POLY: u16 = 0x1021;
const INIT: u16 = 0x1D0F;

const CRC_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

#[inline]
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(INIT, |crc, &byte| {
        let index = ((crc >> 8) ^ u16::from(byte)) as usize;
        (crc << 8) ^ CRC_TABLE[index]
    })
}

/// Wrap an inner command-class payload.
pub fn encapsulate(inner: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(inner.len() + 4);
    out.push(CommandClassId::Crc16Encap as u8);
    out.push(ENCAP);
    out.extend_from_slice(inner);
    let crc = crc16(&out);
    out.extend_from_slice(&crc.to_be_bytes());
    out.into()
}

/// Verify and strip the envelope, returning the inner payload.
pub fn decapsulate(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < 6 {
        return Err(ZWaveError::Decode(format!(
            "CRC16 envelope needs 6 bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[0] != CommandClassId::Crc16Encap as u8 || bytes[1] != ENCAP {
        return Err(ZWaveError::Decode(format!(
            "not a CRC16 envelope: {}",
            hex::encode_upper(&bytes[..2])
        )));
    }

    let (covered, trailer) = bytes.split_at(bytes.len() - 2);
    let expected = crc16(covered);
    let actual = u16::from_be_bytes([trailer[0], trailer[1]]);
    if expected != actual {
        return Err(ZWaveError::Crc16Mismatch { expected, actual });
    }
    Ok(&covered[2..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0xE5CC);
    }

    #[test]
    fn test_known_envelopes() {
        assert_eq!(
            decapsulate(&[0x56, 0x01, 0x20, 0x03, 0x10, 0x9E, 0x69]).unwrap(),
            &[0x20, 0x03, 0x10]
        );
        assert_eq!(
            decapsulate(&[0x56, 0x01, 0x20, 0x01, 0x02, 0x03, 0x30, 0x65]).unwrap(),
            &[0x20, 0x01, 0x02, 0x03]
        );
        assert_eq!(
            encapsulate(&[0x20, 0x03, 0x10]).as_ref(),
            &[0x56, 0x01, 0x20, 0x03, 0x10, 0x9E, 0x69]
        );
    }

    #[test]
    fn test_mutated_byte_fails() {
        let mut wrapped = encapsulate(&[0x20, 0x03, 0x10]).to_vec();
        wrapped[4] ^= 0x01;
        assert!(matches!(
            decapsulate(&wrapped),
            Err(ZWaveError::Crc16Mismatch { .. })
        ));
    }

    #[test]
    fn test_not_an_envelope() {
        assert!(matches!(
            decapsulate(&[0x20, 0x03, 0x10, 0x00, 0x00, 0x00]),
            Err(ZWaveError::Decode(_))
        ));
        assert!(decapsulate(&[0x56, 0x01, 0x00]).is_err());
    }
}
