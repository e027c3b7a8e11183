//! Wake Up command class (0x84).
//!
//! Battery devices sleep most of the time and send a Wake Up Notification
//! when they are briefly reachable. The controller answers with
//! No More Information once it has nothing more to send.

use bytes::Bytes;

use super::{fields, other, CommandClassCodec, CommandClassId, GetRequest, Report};
use crate::error::{Result, ZWaveError};
use crate::NodeId;

pub const INTERVAL_SET: u8 = 0x04;
pub const INTERVAL_GET: u8 = 0x05;
pub const INTERVAL_REPORT: u8 = 0x06;
pub const NOTIFICATION: u8 = 0x07;
pub const NO_MORE_INFORMATION: u8 = 0x08;
pub const INTERVAL_CAPABILITIES_GET: u8 = 0x09;
pub const INTERVAL_CAPABILITIES_REPORT: u8 = 0x0A;

const MAX_SECONDS: u32 = 0x00FF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeUpReport {
    Interval {
        seconds: u32,
        node_id: NodeId,
    },
    Notification,
    IntervalCapabilities {
        min_seconds: u32,
        max_seconds: u32,
        default_seconds: u32,
        step_seconds: u32,
    },
}

impl WakeUpReport {
    pub fn command(&self) -> u8 {
        match self {
            Self::Interval { .. } => INTERVAL_REPORT,
            Self::Notification => NOTIFICATION,
            Self::IntervalCapabilities { .. } => INTERVAL_CAPABILITIES_REPORT,
        }
    }
}

fn u24(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
}

/// Set the wake-up interval and the node that receives notifications.
pub fn interval_set(seconds: u32, node_id: NodeId) -> Result<Bytes> {
    if seconds > MAX_SECONDS {
        return Err(ZWaveError::InvalidArgument(format!(
            "wake-up interval {}s exceeds 24 bits",
            seconds
        )));
    }
    let [_, a, b, c] = seconds.to_be_bytes();
    Ok(Bytes::copy_from_slice(&[
        CommandClassId::WakeUp as u8,
        INTERVAL_SET,
        a,
        b,
        c,
        node_id,
    ]))
}

pub fn interval_get() -> GetRequest {
    GetRequest::new(
        Bytes::from_static(&[CommandClassId::WakeUp as u8, INTERVAL_GET]),
        INTERVAL_REPORT,
    )
}

pub fn interval_capabilities_get() -> GetRequest {
    GetRequest::new(
        Bytes::from_static(&[CommandClassId::WakeUp as u8, INTERVAL_CAPABILITIES_GET]),
        INTERVAL_CAPABILITIES_REPORT,
    )
}

pub fn no_more_information() -> Bytes {
    Bytes::from_static(&[CommandClassId::WakeUp as u8, NO_MORE_INFORMATION])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WakeUpCodec;

impl CommandClassCodec for WakeUpCodec {
    fn class_id(&self) -> u8 {
        CommandClassId::WakeUp as u8
    }

    fn decode(&self, bytes: &[u8]) -> Result<Report> {
        let report = match bytes.get(1) {
            Some(&NOTIFICATION) => WakeUpReport::Notification,
            Some(&INTERVAL_REPORT) => {
                let f = fields(bytes, 4, "WakeUp Interval Report")?;
                WakeUpReport::Interval {
                    seconds: u24(&f[0..3]),
                    node_id: f[3],
                }
            }
            Some(&INTERVAL_CAPABILITIES_REPORT) => {
                let f = fields(bytes, 12, "WakeUp Interval Capabilities Report")?;
                WakeUpReport::IntervalCapabilities {
                    min_seconds: u24(&f[0..3]),
                    max_seconds: u24(&f[3..6]),
                    default_seconds: u24(&f[6..9]),
                    step_seconds: u24(&f[9..12]),
                }
            }
            _ => return Ok(other(bytes)),
        };
        Ok(Report::WakeUp(report))
    }
}
