//! Configuration command class (0x70).

use bytes::Bytes;

use super::metadata::{decode_value, encode_value};
use super::{fields, other, CommandClassCodec, CommandClassId, GetRequest, Report, ReportFilter};
use crate::error::{Result, ZWaveError};

pub const SET: u8 = 0x04;
pub const GET: u8 = 0x05;
pub const REPORT: u8 = 0x06;

const SIZE_MASK: u8 = 0x07;
const DEFAULT_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationReport {
    pub parameter: u8,
    pub size: u8,
    pub value: i32,
}

/// Set a parameter. With `restore_default` the device ignores `value` and
/// reverts the parameter to its factory default.
pub fn set(parameter: u8, size: u8, value: i32, restore_default: bool) -> Result<Bytes> {
    let encoded = encode_value(value, size)?;
    let mut out = Vec::with_capacity(4 + encoded.len());
    out.push(CommandClassId::Configuration as u8);
    out.push(SET);
    out.push(parameter);
    let flags = if restore_default { DEFAULT_FLAG } else { 0 };
    out.push(flags | (size & SIZE_MASK));
    out.extend_from_slice(&encoded);
    Ok(out.into())
}

pub fn get(parameter: u8) -> GetRequest {
    GetRequest::new(
        Bytes::copy_from_slice(&[CommandClassId::Configuration as u8, GET, parameter]),
        REPORT,
    )
    .with_filter(ReportFilter::Parameter(parameter))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationCodec;

impl CommandClassCodec for ConfigurationCodec {
    fn class_id(&self) -> u8 {
        CommandClassId::Configuration as u8
    }

    fn decode(&self, bytes: &[u8]) -> Result<Report> {
        if bytes.get(1) != Some(&REPORT) {
            return Ok(other(bytes));
        }
        let f = fields(bytes, 2, "Configuration Report")?;
        let size = f[1] & SIZE_MASK;
        let raw = f.get(2..2 + size as usize).ok_or_else(|| {
            ZWaveError::Decode(format!("Configuration Report truncated, size {}", size))
        })?;

        Ok(Report::Configuration(ConfigurationReport {
            parameter: f[0],
            size,
            value: decode_value(raw)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_encoding() {
        assert_eq!(
            set(0x0D, 2, 300, false).unwrap().as_ref(),
            &[0x70, 0x04, 0x0D, 0x02, 0x01, 0x2C]
        );
        assert_eq!(
            set(0x0D, 1, 0, true).unwrap().as_ref(),
            &[0x70, 0x04, 0x0D, 0x81, 0x00]
        );
        assert!(set(0x0D, 1, 300, false).is_err());
    }

    #[test]
    fn test_get_filters_on_parameter() {
        let request = get(0x0D);
        assert_eq!(request.bytes.as_ref(), &[0x70, 0x05, 0x0D]);
        assert_eq!(request.filter, ReportFilter::Parameter(0x0D));
    }

    #[test]
    fn test_report() {
        assert_eq!(
            ConfigurationCodec
                .decode(&[0x70, 0x06, 0x0D, 0x04, 0xFF, 0xFF, 0xFF, 0xFE])
                .unwrap(),
            Report::Configuration(ConfigurationReport {
                parameter: 0x0D,
                size: 4,
                value: -2
            })
        );
        assert!(ConfigurationCodec.decode(&[0x70, 0x06, 0x0D, 0x02, 0x01]).is_err());
    }
}
