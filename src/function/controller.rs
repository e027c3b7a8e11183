//! Controller query functions.

use bytes::Bytes;

use super::{ensure_len, Function, FunctionId};
use crate::error::{Result, ZWaveError};
use crate::NodeId;

/// Home id and the controller's own node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryId {
    pub home_id: u32,
    pub node_id: NodeId,
}

/// `MemoryGetId (0x20)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryGetId;

impl Function for MemoryGetId {
    type Output = MemoryId;

    fn function_id(&self) -> FunctionId {
        FunctionId::MemoryGetId
    }

    fn args(&self) -> Bytes {
        Bytes::from_static(&[FunctionId::MemoryGetId as u8])
    }

    fn decode_return_value(&self, payload: &[u8]) -> Result<MemoryId> {
        ensure_len(payload, 6, "MemoryGetId response")?;
        Ok(MemoryId {
            home_id: u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]),
            node_id: payload[5],
        })
    }
}

/// `GetSucNodeId (0x56)`. Decodes to the SUC node id, 0 meaning none.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetSucNodeId;

impl Function for GetSucNodeId {
    type Output = NodeId;

    fn function_id(&self) -> FunctionId {
        FunctionId::GetSucNodeId
    }

    fn args(&self) -> Bytes {
        Bytes::from_static(&[FunctionId::GetSucNodeId as u8])
    }

    fn decode_return_value(&self, payload: &[u8]) -> Result<NodeId> {
        ensure_len(payload, 2, "GetSucNodeId response")?;
        Ok(payload[1])
    }
}

/// Decoded `SerialApiGetInitData` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    pub version: u8,
    pub capabilities: u8,
    pub node_ids: Vec<NodeId>,
    pub chip_type: u8,
    pub chip_version: u8,
}

impl InitData {
    pub const CAP_SLAVE_API: u8 = 0x01;
    pub const CAP_TIMER: u8 = 0x02;
    pub const CAP_SECONDARY: u8 = 0x04;
    pub const CAP_SUC: u8 = 0x08;

    pub fn is_slave_api(&self) -> bool {
        self.capabilities & Self::CAP_SLAVE_API != 0
    }

    pub fn supports_timers(&self) -> bool {
        self.capabilities & Self::CAP_TIMER != 0
    }

    pub fn is_secondary_controller(&self) -> bool {
        self.capabilities & Self::CAP_SECONDARY != 0
    }

    pub fn is_static_update_controller(&self) -> bool {
        self.capabilities & Self::CAP_SUC != 0
    }
}

/// `SerialApiGetInitData (0x02)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialApiGetInitData;

impl Function for SerialApiGetInitData {
    type Output = InitData;

    fn function_id(&self) -> FunctionId {
        FunctionId::SerialApiGetInitData
    }

    fn args(&self) -> Bytes {
        Bytes::from_static(&[FunctionId::SerialApiGetInitData as u8])
    }

    fn decode_return_value(&self, payload: &[u8]) -> Result<InitData> {
        ensure_len(payload, 4, "SerialApiGetInitData response")?;
        let mask_len = payload[3] as usize;
        ensure_len(payload, 4 + mask_len + 2, "SerialApiGetInitData response")?;

        let mask = &payload[4..4 + mask_len];
        let node_ids = mask
            .iter()
            .enumerate()
            .flat_map(|(byte_index, byte)| {
                (0..8)
                    .filter(move |bit| byte & (1 << bit) != 0)
                    .map(move |bit| (byte_index * 8 + bit + 1) as NodeId)
            })
            .collect();

        Ok(InitData {
            version: payload[1],
            capabilities: payload[2],
            node_ids,
            chip_type: payload[4 + mask_len],
            chip_version: payload[4 + mask_len + 1],
        })
    }
}

/// `SerialApiSetup` subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SetupSubcommand {
    StatusReport = 0x02,
    PowerlevelSet = 0x04,
    PowerlevelGet = 0x08,
    GetMaxPayloadSize = 0x10,
}

/// `SerialApiSetup (0x0B)`. Decodes to the bytes after the subcommand echo.
#[derive(Debug, Clone)]
pub struct SerialApiSetup {
    pub subcommand: SetupSubcommand,
    pub args: Vec<u8>,
}

impl SerialApiSetup {
    pub fn new(subcommand: SetupSubcommand, args: impl Into<Vec<u8>>) -> Self {
        Self {
            subcommand,
            args: args.into(),
        }
    }
}

impl Function for SerialApiSetup {
    type Output = Bytes;

    fn function_id(&self) -> FunctionId {
        FunctionId::SerialApiSetup
    }

    fn args(&self) -> Bytes {
        let mut out = Vec::with_capacity(2 + self.args.len());
        out.push(FunctionId::SerialApiSetup as u8);
        out.push(self.subcommand as u8);
        out.extend_from_slice(&self.args);
        out.into()
    }

    fn is_valid_return_value(&self, payload: &[u8]) -> bool {
        payload.len() >= 2
            && payload[0] == FunctionId::SerialApiSetup as u8
            && payload[1] == self.subcommand as u8
    }

    fn decode_return_value(&self, payload: &[u8]) -> Result<Bytes> {
        ensure_len(payload, 2, "SerialApiSetup response")?;
        Ok(Bytes::copy_from_slice(&payload[2..]))
    }
}

/// Controller firmware library type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryType {
    StaticController,
    Controller,
    EnhancedSlave,
    Slave,
    Installer,
    RoutingSlave,
    BridgeController,
    Other(u8),
}

impl From<u8> for LibraryType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::StaticController,
            2 => Self::Controller,
            3 => Self::EnhancedSlave,
            4 => Self::Slave,
            5 => Self::Installer,
            6 => Self::RoutingSlave,
            7 => Self::BridgeController,
            other => Self::Other(other),
        }
    }
}

/// `TypeLibrary (0xBD)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeLibrary;

impl Function for TypeLibrary {
    type Output = LibraryType;

    fn function_id(&self) -> FunctionId {
        FunctionId::TypeLibrary
    }

    fn args(&self) -> Bytes {
        Bytes::from_static(&[FunctionId::TypeLibrary as u8])
    }

    fn decode_return_value(&self, payload: &[u8]) -> Result<LibraryType> {
        ensure_len(payload, 2, "TypeLibrary response")?;
        Ok(LibraryType::from(payload[1]))
    }
}

/// Protocol-level facts the controller stores about a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeProtocolInfo {
    pub capability: u8,
    pub security: u8,
    pub basic: u8,
    pub generic: u8,
    pub specific: u8,
}

impl NodeProtocolInfo {
    pub fn is_listening(&self) -> bool {
        self.capability & 0x80 != 0
    }

    pub fn is_routing(&self) -> bool {
        self.capability & 0x40 != 0
    }
}

/// `GetNodeProtocolInfo (0x41)`.
#[derive(Debug, Clone, Copy)]
pub struct GetNodeProtocolInfo {
    pub node_id: NodeId,
}

impl Function for GetNodeProtocolInfo {
    type Output = NodeProtocolInfo;

    fn function_id(&self) -> FunctionId {
        FunctionId::GetNodeProtocolInfo
    }

    fn args(&self) -> Bytes {
        Bytes::copy_from_slice(&[FunctionId::GetNodeProtocolInfo as u8, self.node_id])
    }

    fn decode_return_value(&self, payload: &[u8]) -> Result<NodeProtocolInfo> {
        ensure_len(payload, 7, "GetNodeProtocolInfo response")?;
        Ok(NodeProtocolInfo {
            capability: payload[1],
            security: payload[2],
            basic: payload[4],
            generic: payload[5],
            specific: payload[6],
        })
    }
}

/// `RequestNodeInfo (0x60)`. Only reports whether the request went out; the
/// node information arrives later as an `ApplicationUpdate`.
#[derive(Debug, Clone, Copy)]
pub struct RequestNodeInfo {
    pub node_id: NodeId,
}

impl Function for RequestNodeInfo {
    type Output = ();

    fn function_id(&self) -> FunctionId {
        FunctionId::RequestNodeInfo
    }

    fn args(&self) -> Bytes {
        Bytes::copy_from_slice(&[FunctionId::RequestNodeInfo as u8, self.node_id])
    }

    fn decode_return_value(&self, payload: &[u8]) -> Result<()> {
        ensure_len(payload, 2, "RequestNodeInfo response")?;
        if payload[1] == 0 {
            return Err(ZWaveError::Protocol(format!(
                "controller refused node info request for node {}",
                self.node_id
            )));
        }
        Ok(())
    }
}
