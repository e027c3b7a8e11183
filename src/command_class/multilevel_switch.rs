//! Multilevel Switch command class (0x26).

use bytes::Bytes;

use super::{fields, other, CommandClassCodec, CommandClassId, GetRequest, Report};
use crate::error::{Result, ZWaveError};

pub const SET: u8 = 0x01;
pub const GET: u8 = 0x02;
pub const REPORT: u8 = 0x03;

/// Highest dimming level.
pub const MAX_LEVEL: u8 = 99;
/// Restore the most recent non-zero level.
pub const LAST_LEVEL: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultilevelSwitchReport {
    pub current: u8,
    /// Newer devices also report the target level and remaining duration.
    pub target: Option<u8>,
    pub duration: Option<u8>,
}

pub fn set(level: u8, duration: u8) -> Result<Bytes> {
    if level > MAX_LEVEL && level != LAST_LEVEL {
        return Err(ZWaveError::InvalidArgument(format!(
            "multilevel switch level {} outside 0..=99 and 0xFF",
            level
        )));
    }
    Ok(Bytes::copy_from_slice(&[
        CommandClassId::MultilevelSwitch as u8,
        SET,
        level,
        duration,
    ]))
}

pub fn get() -> GetRequest {
    GetRequest::new(
        Bytes::from_static(&[CommandClassId::MultilevelSwitch as u8, GET]),
        REPORT,
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MultilevelSwitchCodec;

impl CommandClassCodec for MultilevelSwitchCodec {
    fn class_id(&self) -> u8 {
        CommandClassId::MultilevelSwitch as u8
    }

    fn decode(&self, bytes: &[u8]) -> Result<Report> {
        if bytes.get(1) != Some(&REPORT) {
            return Ok(other(bytes));
        }
        let f = fields(bytes, 1, "MultilevelSwitch Report")?;
        Ok(Report::MultilevelSwitch(MultilevelSwitchReport {
            current: f[0],
            target: f.get(1).copied(),
            duration: f.get(2).copied(),
        }))
    }
}
