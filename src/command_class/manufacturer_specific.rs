//! Manufacturer Specific command class (0x72).

use bytes::Bytes;

use super::{fields, other, CommandClassCodec, CommandClassId, GetRequest, Report};
use crate::error::Result;

pub const GET: u8 = 0x04;
pub const REPORT: u8 = 0x05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManufacturerSpecificReport {
    pub manufacturer_id: u16,
    pub product_type: u16,
    pub product_id: u16,
}

pub fn get() -> GetRequest {
    GetRequest::new(
        Bytes::from_static(&[CommandClassId::ManufacturerSpecific as u8, GET]),
        REPORT,
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManufacturerSpecificCodec;

impl CommandClassCodec for ManufacturerSpecificCodec {
    fn class_id(&self) -> u8 {
        CommandClassId::ManufacturerSpecific as u8
    }

    fn decode(&self, bytes: &[u8]) -> Result<Report> {
        if bytes.get(1) != Some(&REPORT) {
            return Ok(other(bytes));
        }
        let f = fields(bytes, 6, "ManufacturerSpecific Report")?;
        Ok(Report::ManufacturerSpecific(ManufacturerSpecificReport {
            manufacturer_id: u16::from_be_bytes([f[0], f[1]]),
            product_type: u16::from_be_bytes([f[2], f[3]]),
            product_id: u16::from_be_bytes([f[4], f[5]]),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report() {
        let report = ManufacturerSpecificCodec
            .decode(&[0x72, 0x05, 0x00, 0x86, 0x00, 0x02, 0x00, 0x64])
            .unwrap();
        assert_eq!(
            report,
            Report::ManufacturerSpecific(ManufacturerSpecificReport {
                manufacturer_id: 0x0086,
                product_type: 0x0002,
                product_id: 0x0064,
            })
        );
    }

    #[test]
    fn test_truncated_report() {
        assert!(ManufacturerSpecificCodec
            .decode(&[0x72, 0x05, 0x00, 0x86])
            .is_err());
    }
}
