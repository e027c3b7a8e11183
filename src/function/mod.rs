//! Controller functions: the Tx/Rx codecs and the transaction that drives
//! them over the link.
//!
//! A function's argument bytes always start with its [`FunctionId`]. The
//! controller answers with an Ack and, for functions with a return value,
//! a Response data frame whose first byte echoes the id.

mod application;
mod call;
mod controller;
mod node;
mod send_data;

use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;

use crate::error::Result;

pub use application::{ApplicationCommand, ApplicationUpdate, NodeInfo, UpdateStatus};
pub use call::{execute, Action, CallInput, Outcome, Transaction, TransmitState, TransmitTrigger};
pub use controller::{
    GetNodeProtocolInfo, GetSucNodeId, InitData, LibraryType, MemoryGetId, MemoryId,
    NodeProtocolInfo, RequestNodeInfo, SerialApiGetInitData, SerialApiSetup, SetupSubcommand,
    TypeLibrary,
};
pub use node::{
    AddNodeToNetwork, DeviceClass, NodeMode, NodeStatus, NodeUpdate, RemoveNodeFromNetwork,
};
pub use send_data::{
    SendData, SendDataAbort, SendDataCallback, TransmitOptions, TransmitStatus,
    MAX_SEND_DATA_PAYLOAD,
};

/// Serial API function identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionId {
    SerialApiGetInitData = 0x02,
    ApplicationCommandHandler = 0x04,
    SerialApiSetup = 0x0B,
    SendData = 0x13,
    SendDataAbort = 0x16,
    MemoryGetId = 0x20,
    GetNodeProtocolInfo = 0x41,
    ApplicationUpdate = 0x49,
    AddNodeToNetwork = 0x4A,
    RemoveNodeFromNetwork = 0x4B,
    GetSucNodeId = 0x56,
    RequestNodeInfo = 0x60,
    ApplicationCommandHandlerBridge = 0xA8,
    TypeLibrary = 0xBD,
}

impl FunctionId {
    /// Look up a function id byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x02 => Self::SerialApiGetInitData,
            0x04 => Self::ApplicationCommandHandler,
            0x0B => Self::SerialApiSetup,
            0x13 => Self::SendData,
            0x16 => Self::SendDataAbort,
            0x20 => Self::MemoryGetId,
            0x41 => Self::GetNodeProtocolInfo,
            0x49 => Self::ApplicationUpdate,
            0x4A => Self::AddNodeToNetwork,
            0x4B => Self::RemoveNodeFromNetwork,
            0x56 => Self::GetSucNodeId,
            0x60 => Self::RequestNodeInfo,
            0xA8 => Self::ApplicationCommandHandlerBridge,
            0xBD => Self::TypeLibrary,
            _ => return None,
        })
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// An outbound controller function.
///
/// `args` is the full data frame payload, function id first.
/// `decode_return_value` receives the Response payload, or an empty slice
/// when the function completes on Ack alone.
pub trait Function: Send + Sync {
    type Output: Send + 'static;

    fn function_id(&self) -> FunctionId;

    fn args(&self) -> Bytes;

    /// Whether the call waits for a Response frame after the Ack.
    fn has_return_value(&self) -> bool {
        true
    }

    /// Whether a Response payload belongs to this call.
    fn is_valid_return_value(&self, payload: &[u8]) -> bool {
        payload.first() == Some(&self.function_id().as_byte())
    }

    fn decode_return_value(&self, payload: &[u8]) -> Result<Self::Output>;
}

/// Hands out callback ids 1..=255, skipping the reserved 0.
#[derive(Debug)]
pub struct CallbackIdGenerator {
    next: AtomicU8,
}

impl CallbackIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU8::new(1),
        }
    }

    pub fn next_id(&self) -> u8 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Default for CallbackIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that `payload` holds at least `len` bytes.
pub(crate) fn ensure_len(payload: &[u8], len: usize, what: &str) -> Result<()> {
    if payload.len() < len {
        return Err(crate::ZWaveError::Decode(format!(
            "{} needs {} bytes, got {}",
            what,
            len,
            payload.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_id_lookup() {
        assert_eq!(FunctionId::from_byte(0x13), Some(FunctionId::SendData));
        assert_eq!(FunctionId::from_byte(0xBD), Some(FunctionId::TypeLibrary));
        assert_eq!(FunctionId::from_byte(0xFF), None);
        assert_eq!(FunctionId::AddNodeToNetwork.as_byte(), 0x4A);
    }

    #[test]
    fn test_callback_ids_skip_zero() {
        let ids = CallbackIdGenerator::new();
        let seen: Vec<u8> = (0..300).map(|_| ids.next_id()).collect();

        assert_eq!(seen[0], 1);
        assert_eq!(seen[254], 255);
        assert_eq!(seen[255], 1);
        assert!(!seen.contains(&0));
    }

    #[test]
    fn test_ensure_len() {
        assert!(ensure_len(&[1, 2], 2, "x").is_ok());
        assert!(matches!(
            ensure_len(&[1], 2, "x"),
            Err(crate::ZWaveError::Decode(_))
        ));
    }
}
