//! Basic command class (0x20).

use bytes::Bytes;

use super::{fields, other, CommandClassCodec, CommandClassId, GetRequest, Report};
use crate::error::Result;

pub const SET: u8 = 0x01;
pub const GET: u8 = 0x02;
pub const REPORT: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicReport {
    pub value: u8,
}

pub fn set(value: u8) -> Bytes {
    Bytes::copy_from_slice(&[CommandClassId::Basic as u8, SET, value])
}

pub fn get() -> GetRequest {
    GetRequest::new(Bytes::from_static(&[CommandClassId::Basic as u8, GET]), REPORT)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicCodec;

impl CommandClassCodec for BasicCodec {
    fn class_id(&self) -> u8 {
        CommandClassId::Basic as u8
    }

    fn decode(&self, bytes: &[u8]) -> Result<Report> {
        match bytes.get(1) {
            Some(&REPORT) => {
                let f = fields(bytes, 1, "Basic Report")?;
                Ok(Report::Basic(BasicReport { value: f[0] }))
            }
            _ => Ok(other(bytes)),
        }
    }
}
