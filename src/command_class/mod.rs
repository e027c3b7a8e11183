//! Command classes: payloads exchanged with remote nodes through `SendData`
//! and `ApplicationCommandHandler`.
//!
//! Every payload is `[classId, commandId, ...fields]`. Each supported class
//! has a codec implementing [`CommandClassCodec`] that turns inbound bytes
//! into a [`Report`], plus free functions building outbound commands. Gets
//! are described by a [`GetRequest`] so the dispatcher knows which Report
//! answers them.

pub mod basic;
pub mod battery;
pub mod color_switch;
pub mod configuration;
pub mod crc16;
mod dispatcher;
pub mod manufacturer_specific;
pub mod metadata;
pub mod multilevel_sensor;
pub mod multilevel_switch;
pub mod notification;
pub mod wake_up;
pub mod zwave_plus_info;

use bytes::Bytes;

use crate::error::{Result, ZWaveError};

pub use dispatcher::{CommandClassDispatcher, NodeReport, PendingReport, WakeUpReceiver};

use basic::BasicReport;
use battery::BatteryReport;
use configuration::ConfigurationReport;
use manufacturer_specific::ManufacturerSpecificReport;
use multilevel_sensor::MultilevelSensorReport;
use multilevel_switch::MultilevelSwitchReport;
use notification::NotificationReport;
use wake_up::WakeUpReport;
use zwave_plus_info::ZWavePlusInfoReport;

/// Command class identifiers with a codec or encoder in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandClassId {
    Basic = 0x20,
    MultilevelSwitch = 0x26,
    MultilevelSensor = 0x31,
    ColorSwitch = 0x33,
    Crc16Encap = 0x56,
    ZWavePlusInfo = 0x5E,
    Configuration = 0x70,
    Notification = 0x71,
    ManufacturerSpecific = 0x72,
    Battery = 0x80,
    WakeUp = 0x84,
}

impl CommandClassId {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x20 => Self::Basic,
            0x26 => Self::MultilevelSwitch,
            0x31 => Self::MultilevelSensor,
            0x33 => Self::ColorSwitch,
            0x56 => Self::Crc16Encap,
            0x5E => Self::ZWavePlusInfo,
            0x70 => Self::Configuration,
            0x71 => Self::Notification,
            0x72 => Self::ManufacturerSpecific,
            0x80 => Self::Battery,
            0x84 => Self::WakeUp,
            _ => return None,
        })
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A decoded inbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Basic(BasicReport),
    MultilevelSwitch(MultilevelSwitchReport),
    MultilevelSensor(MultilevelSensorReport),
    Configuration(ConfigurationReport),
    Notification(NotificationReport),
    ManufacturerSpecific(ManufacturerSpecificReport),
    Battery(BatteryReport),
    WakeUp(WakeUpReport),
    ZWavePlusInfo(ZWavePlusInfoReport),
    /// A command of a known class that has no typed decoding.
    Other {
        class_id: u8,
        command: u8,
        payload: Bytes,
    },
}

impl Report {
    pub fn class_id(&self) -> u8 {
        match self {
            Self::Basic(_) => CommandClassId::Basic as u8,
            Self::MultilevelSwitch(_) => CommandClassId::MultilevelSwitch as u8,
            Self::MultilevelSensor(_) => CommandClassId::MultilevelSensor as u8,
            Self::Configuration(_) => CommandClassId::Configuration as u8,
            Self::Notification(_) => CommandClassId::Notification as u8,
            Self::ManufacturerSpecific(_) => CommandClassId::ManufacturerSpecific as u8,
            Self::Battery(_) => CommandClassId::Battery as u8,
            Self::WakeUp(_) => CommandClassId::WakeUp as u8,
            Self::ZWavePlusInfo(_) => CommandClassId::ZWavePlusInfo as u8,
            Self::Other { class_id, .. } => *class_id,
        }
    }

    pub fn command(&self) -> u8 {
        match self {
            Self::Basic(_) => basic::REPORT,
            Self::MultilevelSwitch(_) => multilevel_switch::REPORT,
            Self::MultilevelSensor(_) => multilevel_sensor::REPORT,
            Self::Configuration(_) => configuration::REPORT,
            Self::Notification(_) => notification::REPORT,
            Self::ManufacturerSpecific(_) => manufacturer_specific::REPORT,
            Self::Battery(_) => battery::REPORT,
            Self::WakeUp(report) => report.command(),
            Self::ZWavePlusInfo(_) => zwave_plus_info::REPORT,
            Self::Other { command, .. } => *command,
        }
    }
}

/// Extra matching applied when correlating a Report to a Get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFilter {
    Any,
    /// MultilevelSensor reports for one sensor type.
    SensorType(u8),
    /// Configuration reports for one parameter number.
    Parameter(u8),
}

impl ReportFilter {
    pub fn accepts(&self, report: &Report) -> bool {
        match (self, report) {
            (Self::Any, _) => true,
            (Self::SensorType(t), Report::MultilevelSensor(r)) => r.sensor_type.as_byte() == *t,
            (Self::Parameter(p), Report::Configuration(r)) => r.parameter == *p,
            _ => false,
        }
    }
}

/// An outbound Get and the Report command that answers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub bytes: Bytes,
    pub report_command: u8,
    pub filter: ReportFilter,
}

impl GetRequest {
    pub fn new(bytes: impl Into<Bytes>, report_command: u8) -> Self {
        Self {
            bytes: bytes.into(),
            report_command,
            filter: ReportFilter::Any,
        }
    }

    pub fn with_filter(mut self, filter: ReportFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn class_id(&self) -> u8 {
        self.bytes.first().copied().unwrap_or(0)
    }
}

/// Decoder for one command class.
pub trait CommandClassCodec: Send + Sync + 'static {
    fn class_id(&self) -> u8;

    /// Decode `[classId, commandId, ...]`.
    fn decode(&self, bytes: &[u8]) -> Result<Report>;
}

/// Split `[class, command, fields...]`, checking there are at least
/// `min_fields` field bytes.
pub(crate) fn fields<'a>(bytes: &'a [u8], min_fields: usize, what: &str) -> Result<&'a [u8]> {
    if bytes.len() < 2 + min_fields {
        return Err(ZWaveError::Decode(format!(
            "{} needs {} bytes, got {}",
            what,
            2 + min_fields,
            bytes.len()
        )));
    }
    Ok(&bytes[2..])
}

/// A command this crate does not decode further.
pub(crate) fn other(bytes: &[u8]) -> Report {
    Report::Other {
        class_id: bytes.first().copied().unwrap_or(0),
        command: bytes.get(1).copied().unwrap_or(0),
        payload: Bytes::copy_from_slice(bytes.get(2..).unwrap_or(&[])),
    }
}
