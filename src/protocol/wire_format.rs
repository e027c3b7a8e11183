//! Wire format constants and checksum.
//!
//! Every exchange on the serial line starts with a one-byte preamble:
//! ```text
//! ┌──────┬────────┬──────┬─────────────┬──────────┐
//! │ SOF  │ Length │ Type │ Payload     │ Checksum │
//! │ 0x01 │ 1 byte │ 0/1  │ Length-2 B  │ 1 byte   │
//! └──────┴────────┴──────┴─────────────┴──────────┘
//! ```
//!
//! `Ack`, `Nack` and `Cancel` are bare single-byte control frames.
//! Length counts the bytes after itself (type, payload and checksum).

use crate::error::{Result, ZWaveError};

/// Start of a data frame.
pub const SOF: u8 = 0x01;

/// Positive acknowledgement.
pub const ACK: u8 = 0x06;

/// Negative acknowledgement (bad checksum).
pub const NAK: u8 = 0x15;

/// Controller busy, retry later.
pub const CAN: u8 = 0x18;

/// Smallest legal length byte: type, function id, checksum.
pub const MIN_LENGTH: u8 = 3;

/// Largest payload a data frame can carry: the length byte also counts the
/// type and checksum bytes.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - 2;

/// Seed for the XOR-fold checksum.
pub const CHECKSUM_SEED: u8 = 0xFF;

/// Frame preamble byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Preamble {
    StartOfFrame = SOF,
    Ack = ACK,
    Nack = NAK,
    Cancel = CAN,
}

impl Preamble {
    /// Map a raw byte to a preamble, if it is one.
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOF => Some(Self::StartOfFrame),
            ACK => Some(Self::Ack),
            NAK => Some(Self::Nack),
            CAN => Some(Self::Cancel),
            _ => None,
        }
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Ack, Nack and Cancel are complete frames on their own.
    #[inline]
    pub fn is_control(self) -> bool {
        !matches!(self, Self::StartOfFrame)
    }
}

/// Data frame direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Host to controller, or an unsolicited controller callback.
    Request = 0x00,
    /// Controller's direct answer to a host request.
    Response = 0x01,
}

impl TryFrom<u8> for FrameType {
    type Error = ZWaveError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Request),
            0x01 => Ok(Self::Response),
            other => Err(ZWaveError::Protocol(format!(
                "Invalid frame type {:#04X}",
                other
            ))),
        }
    }
}

/// XOR-fold checksum over `[length, type, ...payload]`, seeded with 0xFF.
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(CHECKSUM_SEED, |acc, b| acc ^ b)
}

/// Checksum of a frame given its parts, without building a buffer.
#[inline]
pub fn frame_checksum(length: u8, frame_type: u8, payload: &[u8]) -> u8 {
    checksum(payload) ^ length ^ frame_type
}
