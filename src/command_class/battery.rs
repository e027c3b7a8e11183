//! Battery command class (0x80).

use bytes::Bytes;

use super::{fields, other, CommandClassCodec, CommandClassId, GetRequest, Report};
use crate::error::Result;

pub const GET: u8 = 0x02;
pub const REPORT: u8 = 0x03;

const LOW_BATTERY: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReport {
    /// Charge in percent.
    pub level: u8,
    /// The device signalled a low battery warning.
    pub low: bool,
}

pub fn get() -> GetRequest {
    GetRequest::new(Bytes::from_static(&[CommandClassId::Battery as u8, GET]), REPORT)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatteryCodec;

impl CommandClassCodec for BatteryCodec {
    fn class_id(&self) -> u8 {
        CommandClassId::Battery as u8
    }

    fn decode(&self, bytes: &[u8]) -> Result<Report> {
        if bytes.get(1) != Some(&REPORT) {
            return Ok(other(bytes));
        }
        let f = fields(bytes, 1, "Battery Report")?;
        let report = match f[0] {
            LOW_BATTERY => BatteryReport { level: 0, low: true },
            level => BatteryReport { level, low: false },
        };
        Ok(Report::Battery(report))
    }
}
