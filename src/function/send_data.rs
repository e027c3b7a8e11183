//! `SendData (0x13)` and its abort.

use std::ops::BitOr;

use bytes::Bytes;

use super::{ensure_len, Function, FunctionId};
use crate::error::{Result, ZWaveError};
use crate::protocol::MAX_PAYLOAD_LEN;
use crate::NodeId;

/// Largest command-class payload one SendData frame carries: function id,
/// node id, length, options and callback id share the frame.
pub const MAX_SEND_DATA_PAYLOAD: usize = MAX_PAYLOAD_LEN - 5;

/// Transmit option flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransmitOptions(u8);

impl TransmitOptions {
    pub const NONE: Self = Self(0x00);
    pub const ACK: Self = Self(0x01);
    pub const LOW_POWER: Self = Self(0x02);
    pub const AUTO_ROUTE: Self = Self(0x04);
    pub const NO_ROUTE: Self = Self(0x10);
    pub const EXPLORE: Self = Self(0x20);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for TransmitOptions {
    fn default() -> Self {
        Self(Self::ACK.0 | Self::AUTO_ROUTE.0 | Self::EXPLORE.0)
    }
}

impl BitOr for TransmitOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Final delivery status reported in the SendData callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitStatus {
    Ok,
    NoAck,
    Fail,
    RoutingNotIdle,
    NoRoute,
    Verified,
    Other(u8),
}

impl TransmitStatus {
    /// Whether the frame reached the node.
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Ok | Self::Verified)
    }
}

impl From<u8> for TransmitStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::NoAck,
            2 => Self::Fail,
            3 => Self::RoutingNotIdle,
            4 => Self::NoRoute,
            5 => Self::Verified,
            other => Self::Other(other),
        }
    }
}

/// `SendData` request. Decodes the controller's accept/refuse Response;
/// the delivery result arrives later as a [`SendDataCallback`].
#[derive(Debug, Clone)]
pub struct SendData {
    pub node_id: NodeId,
    pub payload: Bytes,
    pub options: TransmitOptions,
    pub callback_id: u8,
}

impl SendData {
    pub fn new(node_id: NodeId, payload: impl Into<Bytes>, options: TransmitOptions, callback_id: u8) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_SEND_DATA_PAYLOAD {
            return Err(ZWaveError::InvalidArgument(format!(
                "command class payload of {} bytes does not fit a SendData frame",
                payload.len()
            )));
        }
        Ok(Self {
            node_id,
            payload,
            options,
            callback_id,
        })
    }
}

impl Function for SendData {
    type Output = ();

    fn function_id(&self) -> FunctionId {
        FunctionId::SendData
    }

    fn args(&self) -> Bytes {
        let mut out = Vec::with_capacity(5 + self.payload.len());
        out.push(FunctionId::SendData as u8);
        out.push(self.node_id);
        out.push(self.payload.len() as u8);
        out.extend_from_slice(&self.payload);
        out.push(self.options.bits());
        out.push(self.callback_id);
        out.into()
    }

    fn is_valid_return_value(&self, payload: &[u8]) -> bool {
        payload.len() >= 2 && payload[0] == FunctionId::SendData as u8
    }

    fn decode_return_value(&self, payload: &[u8]) -> Result<()> {
        ensure_len(payload, 2, "SendData response")?;
        if payload[1] == 0 {
            return Err(ZWaveError::Protocol(format!(
                "controller refused SendData to node {}",
                self.node_id
            )));
        }
        Ok(())
    }
}

/// Transmit-complete callback: Request `[0x13, callbackId, status, ...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendDataCallback {
    pub callback_id: u8,
    pub status: TransmitStatus,
}

impl SendDataCallback {
    /// Parse a Request payload, returning `None` if it is not a SendData
    /// callback.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            [id, callback_id, status, ..] if *id == FunctionId::SendData as u8 => Some(Self {
                callback_id: *callback_id,
                status: TransmitStatus::from(*status),
            }),
            _ => None,
        }
    }
}

/// `SendDataAbort (0x16)`: no arguments, completes on Ack.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendDataAbort;

impl Function for SendDataAbort {
    type Output = ();

    fn function_id(&self) -> FunctionId {
        FunctionId::SendDataAbort
    }

    fn args(&self) -> Bytes {
        Bytes::from_static(&[FunctionId::SendDataAbort as u8])
    }

    fn has_return_value(&self) -> bool {
        false
    }

    fn decode_return_value(&self, _payload: &[u8]) -> Result<()> {
        Ok(())
    }
}
