//! Unsolicited controller Requests: remote command-class payloads and node
//! information updates.

use bytes::Bytes;

use super::{ensure_len, FunctionId};
use crate::error::{Result, ZWaveError};
use crate::NodeId;

/// A command-class payload received from a remote node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationCommand {
    pub rx_status: u8,
    pub source: NodeId,
    /// Destination node for bridge frames, `None` for the classic handler.
    pub destination: Option<NodeId>,
    pub payload: Bytes,
    pub rssi: Option<i8>,
}

impl ApplicationCommand {
    /// Parse an `ApplicationCommandHandler` or `ApplicationCommandHandlerBridge`
    /// Request payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        match payload.first().copied().and_then(FunctionId::from_byte) {
            Some(FunctionId::ApplicationCommandHandlerBridge) => Self::parse_bridge(payload),
            Some(FunctionId::ApplicationCommandHandler) => Self::parse_classic(payload),
            _ => Err(ZWaveError::Decode(format!(
                "not an application command: {}",
                hex::encode_upper(payload)
            ))),
        }
    }

    // [0xA8, rxStatus, dest, src, len, cc..., maskLen, mask..., rssi]
    fn parse_bridge(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 5, "ApplicationCommandHandlerBridge")?;
        let len = payload[4] as usize;
        ensure_len(payload, 5 + len, "ApplicationCommandHandlerBridge")?;

        let tail = &payload[5 + len..];
        let rssi = tail
            .first()
            .and_then(|mask_len| tail.get(1 + *mask_len as usize))
            .map(|rssi| *rssi as i8);

        Ok(Self {
            rx_status: payload[1],
            destination: Some(payload[2]),
            source: payload[3],
            payload: Bytes::copy_from_slice(&payload[5..5 + len]),
            rssi,
        })
    }

    // [0x04, rxStatus, src, len, cc...]
    fn parse_classic(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 4, "ApplicationCommandHandler")?;
        let len = payload[3] as usize;
        ensure_len(payload, 4 + len, "ApplicationCommandHandler")?;

        Ok(Self {
            rx_status: payload[1],
            destination: None,
            source: payload[2],
            payload: Bytes::copy_from_slice(&payload[4..4 + len]),
            rssi: None,
        })
    }
}

/// `ApplicationUpdate` status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    NodeInfoReceived,
    NodeInfoRequestFailed,
    Other(u8),
}

impl From<u8> for UpdateStatus {
    fn from(value: u8) -> Self {
        match value {
            0x84 => Self::NodeInfoReceived,
            0x81 => Self::NodeInfoRequestFailed,
            other => Self::Other(other),
        }
    }
}

/// Node information frame contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub basic: u8,
    pub generic: u8,
    pub specific: u8,
    pub command_classes: Vec<u8>,
}

/// `ApplicationUpdate (0x49)` Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationUpdate {
    pub status: UpdateStatus,
    pub node_id: NodeId,
    /// Present when the status is `NodeInfoReceived`.
    pub info: Option<NodeInfo>,
}

impl ApplicationUpdate {
    // [0x49, status, node, len, basic, generic, specific, cc...]
    pub fn parse(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 3, "ApplicationUpdate")?;
        if payload[0] != FunctionId::ApplicationUpdate as u8 {
            return Err(ZWaveError::Decode("not an ApplicationUpdate".into()));
        }

        let status = UpdateStatus::from(payload[1]);
        let node_id = payload[2];
        let info = match status {
            UpdateStatus::NodeInfoReceived => {
                ensure_len(payload, 7, "ApplicationUpdate node info")?;
                let len = payload[3] as usize;
                let cc_end = (4 + len).min(payload.len());
                Some(NodeInfo {
                    node_id,
                    basic: payload[4],
                    generic: payload[5],
                    specific: payload[6],
                    command_classes: payload[7..cc_end.max(7)].to_vec(),
                })
            }
            _ => None,
        };

        Ok(Self {
            status,
            node_id,
            info,
        })
    }
}
