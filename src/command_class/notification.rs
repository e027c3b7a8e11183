//! Notification command class (0x71).
//!
//! Report layout:
//!
//! ```text
//! [0x71, 0x05, v1Type, v1Level, reserved, status, type, event, meta, params..., sequence?]
//! ```
//!
//! `meta` bit 7 flags a trailing sequence number, bits 4..0 are the
//! parameter length.

use bytes::Bytes;

use super::{fields, other, CommandClassCodec, CommandClassId, GetRequest, Report};
use crate::error::{Result, ZWaveError};

pub const GET: u8 = 0x04;
pub const REPORT: u8 = 0x05;

const SEQUENCE_FLAG: u8 = 0x80;
const PARAMS_LENGTH_MASK: u8 = 0x1F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    HomeSecurity,
    Other(u8),
}

impl NotificationType {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::HomeSecurity => 0x07,
            Self::Other(byte) => byte,
        }
    }
}

impl From<u8> for NotificationType {
    fn from(value: u8) -> Self {
        match value {
            0x07 => Self::HomeSecurity,
            other => Self::Other(other),
        }
    }
}

/// Home security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    Idle,
    CoverTampering,
    MotionDetection,
    Other(u8),
}

impl From<u8> for NotificationEvent {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Idle,
            0x03 => Self::CoverTampering,
            0x08 => Self::MotionDetection,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationReport {
    pub v1_alarm_type: u8,
    pub v1_alarm_level: u8,
    pub status: u8,
    pub notification_type: NotificationType,
    pub event: NotificationEvent,
    pub parameters: Bytes,
    pub sequence: Option<u8>,
}

/// Ask for the current state of a notification type.
pub fn get(notification_type: NotificationType) -> GetRequest {
    GetRequest::new(
        Bytes::copy_from_slice(&[
            CommandClassId::Notification as u8,
            GET,
            0x00,
            notification_type.as_byte(),
            0x00,
        ]),
        REPORT,
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationCodec;

impl CommandClassCodec for NotificationCodec {
    fn class_id(&self) -> u8 {
        CommandClassId::Notification as u8
    }

    fn decode(&self, bytes: &[u8]) -> Result<Report> {
        if bytes.get(1) != Some(&REPORT) {
            return Ok(other(bytes));
        }
        let f = fields(bytes, 7, "Notification Report")?;
        let meta = f[6];
        let params_len = (meta & PARAMS_LENGTH_MASK) as usize;
        let parameters = f.get(7..7 + params_len).ok_or_else(|| {
            ZWaveError::Decode(format!(
                "Notification Report declares {} parameter bytes",
                params_len
            ))
        })?;
        let sequence = if meta & SEQUENCE_FLAG != 0 {
            Some(*f.get(7 + params_len).ok_or_else(|| {
                ZWaveError::Decode("Notification Report missing sequence number".into())
            })?)
        } else {
            None
        };

        Ok(Report::Notification(NotificationReport {
            v1_alarm_type: f[0],
            v1_alarm_level: f[1],
            status: f[3],
            notification_type: NotificationType::from(f[4]),
            event: NotificationEvent::from(f[5]),
            parameters: Bytes::copy_from_slice(parameters),
            sequence,
        }))
    }
}
