//! Z-Wave Plus Info command class (0x5E).

use bytes::Bytes;

use super::{fields, other, CommandClassCodec, CommandClassId, GetRequest, Report};
use crate::error::Result;

pub const GET: u8 = 0x01;
pub const REPORT: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZWavePlusInfoReport {
    pub version: u8,
    pub role_type: u8,
    pub node_type: u8,
    pub installer_icon: u16,
    pub user_icon: u16,
}

pub fn get() -> GetRequest {
    GetRequest::new(Bytes::from_static(&[CommandClassId::ZWavePlusInfo as u8, GET]), REPORT)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZWavePlusInfoCodec;

impl CommandClassCodec for ZWavePlusInfoCodec {
    fn class_id(&self) -> u8 {
        CommandClassId::ZWavePlusInfo as u8
    }

    fn decode(&self, bytes: &[u8]) -> Result<Report> {
        if bytes.get(1) != Some(&REPORT) {
            return Ok(other(bytes));
        }
        let f = fields(bytes, 7, "ZWavePlusInfo Report")?;
        Ok(Report::ZWavePlusInfo(ZWavePlusInfoReport {
            version: f[0],
            role_type: f[1],
            node_type: f[2],
            installer_icon: u16::from_be_bytes([f[3], f[4]]),
            user_icon: u16::from_be_bytes([f[5], f[6]]),
        }))
    }
}
