//! Multilevel Sensor command class (0x31).

use bytes::Bytes;

use super::metadata::{decode_value, scaled, Metadata};
use super::{fields, other, CommandClassCodec, CommandClassId, GetRequest, Report, ReportFilter};
use crate::error::{Result, ZWaveError};

pub const GET: u8 = 0x04;
pub const REPORT: u8 = 0x05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    AirTemperature,
    Illuminance,
    Humidity,
    DewPoint,
    Ultraviolet,
    Other(u8),
}

impl SensorType {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::AirTemperature => 0x01,
            Self::Illuminance => 0x03,
            Self::Humidity => 0x05,
            Self::DewPoint => 0x0B,
            Self::Ultraviolet => 0x1B,
            Self::Other(byte) => byte,
        }
    }
}

impl From<u8> for SensorType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::AirTemperature,
            0x03 => Self::Illuminance,
            0x05 => Self::Humidity,
            0x0B => Self::DewPoint,
            0x1B => Self::Ultraviolet,
            other => Self::Other(other),
        }
    }
}

/// Temperature scales for AirTemperature and DewPoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureScale {
    Celsius = 0,
    Fahrenheit = 1,
}

/// Unit string for a sensor type and scale, if known.
pub fn unit(sensor_type: SensorType, scale: u8) -> Option<&'static str> {
    match (sensor_type, scale) {
        (SensorType::AirTemperature | SensorType::DewPoint, 0) => Some("°C"),
        (SensorType::AirTemperature | SensorType::DewPoint, 1) => Some("°F"),
        (SensorType::Illuminance, 0) => Some("%"),
        (SensorType::Illuminance, 1) => Some("Lux"),
        (SensorType::Humidity, 0) => Some("%"),
        (SensorType::Humidity, 1) => Some("g/m³"),
        (SensorType::Ultraviolet, 0) => Some("UV index"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultilevelSensorReport {
    pub sensor_type: SensorType,
    pub scale: u8,
    pub precision: u8,
    pub raw: i32,
    pub value: f64,
    pub unit: Option<&'static str>,
}

/// Get one sensor reading in the given scale.
pub fn get(sensor_type: SensorType, scale: u8) -> GetRequest {
    let metadata = Metadata {
        precision: 0,
        scale: scale & 0x03,
        size: 0,
    };
    GetRequest::new(
        Bytes::copy_from_slice(&[
            CommandClassId::MultilevelSensor as u8,
            GET,
            sensor_type.as_byte(),
            metadata.to_byte(),
        ]),
        REPORT,
    )
    .with_filter(ReportFilter::SensorType(sensor_type.as_byte()))
}

pub fn get_temperature(scale: TemperatureScale) -> GetRequest {
    get(SensorType::AirTemperature, scale as u8)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MultilevelSensorCodec;

impl CommandClassCodec for MultilevelSensorCodec {
    fn class_id(&self) -> u8 {
        CommandClassId::MultilevelSensor as u8
    }

    fn decode(&self, bytes: &[u8]) -> Result<Report> {
        if bytes.get(1) != Some(&REPORT) {
            return Ok(other(bytes));
        }
        let f = fields(bytes, 2, "MultilevelSensor Report")?;
        let sensor_type = SensorType::from(f[0]);
        let metadata = Metadata::from_byte(f[1]);
        let size = metadata.size as usize;
        let raw_bytes = f.get(2..2 + size).ok_or_else(|| {
            ZWaveError::Decode(format!(
                "MultilevelSensor Report declares {} value bytes, has {}",
                size,
                f.len() - 2
            ))
        })?;
        let raw = decode_value(raw_bytes)?;

        Ok(Report::MultilevelSensor(MultilevelSensorReport {
            sensor_type,
            scale: metadata.scale,
            precision: metadata.precision,
            raw,
            value: scaled(raw, metadata.precision),
            unit: unit(sensor_type, metadata.scale),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_air_temperature_celsius() {
        let request = get_temperature(TemperatureScale::Celsius);
        assert_eq!(request.bytes.as_ref(), &[0x31, 0x04, 0x01, 0x00]);
        assert_eq!(request.filter, ReportFilter::SensorType(0x01));

        let request = get(SensorType::Illuminance, 1);
        assert_eq!(request.bytes.as_ref(), &[0x31, 0x04, 0x03, 0x08]);
    }

    #[test]
    fn test_temperature_report() {
        let report = MultilevelSensorCodec
            .decode(&[0x31, 0x05, 0x01, 0x22, 0x00, 0xDA])
            .unwrap();
        let Report::MultilevelSensor(r) = report else {
            panic!("wrong report {:?}", report);
        };
        assert_eq!(r.sensor_type, SensorType::AirTemperature);
        assert_eq!(r.raw, 218);
        assert!((r.value - 21.8).abs() < 1e-9);
        assert_eq!(r.unit, Some("°C"));
    }

    #[test]
    fn test_negative_one_byte_reading() {
        let report = MultilevelSensorCodec
            .decode(&[0x31, 0x05, 0x0B, 0x09, 0xFB])
            .unwrap();
        let Report::MultilevelSensor(r) = report else {
            panic!("wrong report {:?}", report);
        };
        assert_eq!(r.sensor_type, SensorType::DewPoint);
        assert_eq!(r.unit, Some("°F"));
        assert!((r.value + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_size_is_decode_error() {
        // size 3
        assert!(matches!(
            MultilevelSensorCodec.decode(&[0x31, 0x05, 0x01, 0x23, 0x00, 0x00, 0xDA]),
            Err(ZWaveError::Decode(_))
        ));
        // truncated
        assert!(matches!(
            MultilevelSensorCodec.decode(&[0x31, 0x05, 0x01, 0x22, 0x00]),
            Err(ZWaveError::Decode(_))
        ));
    }

    #[test]
    fn test_unknown_sensor_type_kept() {
        let report = MultilevelSensorCodec
            .decode(&[0x31, 0x05, 0x40, 0x01, 0x07])
            .unwrap();
        let Report::MultilevelSensor(r) = report else {
            panic!("wrong report {:?}", report);
        };
        assert_eq!(r.sensor_type, SensorType::Other(0x40));
        assert_eq!(r.unit, None);
    }
}
