//! `AddNodeToNetwork (0x4A)` and `RemoveNodeFromNetwork (0x4B)`.
//!
//! Both requests complete on Ack alone. Progress arrives as callback
//! Requests `[func, callbackId, status, node, len, basic, generic, specific, cc...]`
//! that the inclusion sequence consumes.

use bytes::Bytes;

use super::{Function, FunctionId};
use crate::error::Result;
use crate::NodeId;

/// Learn mode and option flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMode(u8);

impl NodeMode {
    pub const ANY: Self = Self(0x01);
    pub const CONTROLLER: Self = Self(0x02);
    pub const SLAVE: Self = Self(0x03);
    pub const EXISTING: Self = Self(0x04);
    pub const STOP: Self = Self(0x05);
    pub const STOP_FAILED: Self = Self(0x06);
    pub const HOME_ID: Self = Self(0x08);
    pub const SMART_START: Self = Self(0x09);

    pub const OPTION_LR: u8 = 0x20;
    pub const OPTION_NETWORK_WIDE: u8 = 0x40;
    pub const OPTION_NORMAL_POWER: u8 = 0x80;

    /// Learn request used for adding a node.
    pub const ADD: Self = Self(0x01 | Self::OPTION_NORMAL_POWER | Self::OPTION_NETWORK_WIDE);

    /// Learn request used for removing a node.
    pub const REMOVE: Self = Self(0x01 | Self::OPTION_NORMAL_POWER);

    #[inline]
    pub const fn with_option(self, option: u8) -> Self {
        Self(self.0 | option)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Status carried by an add/remove callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    LearnReady,
    NodeFound,
    Slave,
    Controller,
    ProtocolDone,
    Done,
    Failed,
    NotPrimary,
    Other(u8),
}

impl From<u8> for NodeStatus {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::LearnReady,
            0x02 => Self::NodeFound,
            0x03 => Self::Slave,
            0x04 => Self::Controller,
            0x05 => Self::ProtocolDone,
            0x06 => Self::Done,
            0x07 => Self::Failed,
            0x23 => Self::NotPrimary,
            other => Self::Other(other),
        }
    }
}

/// Basic/generic/specific device class triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceClass {
    pub basic: u8,
    pub generic: u8,
    pub specific: u8,
}

/// One add/remove progress callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpdate {
    pub callback_id: u8,
    pub status: NodeStatus,
    pub node_id: NodeId,
    pub device_class: Option<DeviceClass>,
    pub command_classes: Vec<u8>,
}

impl NodeUpdate {
    /// Parse a callback for `function` with `callback_id`; anything else is `None`.
    pub fn parse(function: FunctionId, callback_id: u8, payload: &[u8]) -> Option<Self> {
        let [func, cb, status, rest @ ..] = payload else {
            return None;
        };
        if *func != function as u8 || *cb != callback_id {
            return None;
        }

        let node_id = rest.first().copied().unwrap_or(0);
        let len = rest.get(1).copied().unwrap_or(0) as usize;
        let (device_class, command_classes) = match payload.get(5..8) {
            Some([basic, generic, specific]) if len >= 3 => {
                let end = (8 + len - 3).min(payload.len());
                (
                    Some(DeviceClass {
                        basic: *basic,
                        generic: *generic,
                        specific: *specific,
                    }),
                    payload[8..end].to_vec(),
                )
            }
            _ => (None, Vec::new()),
        };

        Some(Self {
            callback_id: *cb,
            status: NodeStatus::from(*status),
            node_id,
            device_class,
            command_classes,
        })
    }
}

fn learn_args(function: FunctionId, mode: NodeMode, callback_id: u8) -> Bytes {
    Bytes::copy_from_slice(&[function as u8, mode.bits(), callback_id])
}

/// `AddNodeToNetwork` request.
#[derive(Debug, Clone, Copy)]
pub struct AddNodeToNetwork {
    pub mode: NodeMode,
    pub callback_id: u8,
}

impl Function for AddNodeToNetwork {
    type Output = ();

    fn function_id(&self) -> FunctionId {
        FunctionId::AddNodeToNetwork
    }

    fn args(&self) -> Bytes {
        learn_args(FunctionId::AddNodeToNetwork, self.mode, self.callback_id)
    }

    fn has_return_value(&self) -> bool {
        false
    }

    fn decode_return_value(&self, _payload: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// `RemoveNodeFromNetwork` request.
#[derive(Debug, Clone, Copy)]
pub struct RemoveNodeFromNetwork {
    pub mode: NodeMode,
    pub callback_id: u8,
}

impl Function for RemoveNodeFromNetwork {
    type Output = ();

    fn function_id(&self) -> FunctionId {
        FunctionId::RemoveNodeFromNetwork
    }

    fn args(&self) -> Bytes {
        learn_args(FunctionId::RemoveNodeFromNetwork, self.mode, self.callback_id)
    }

    fn has_return_value(&self) -> bool {
        false
    }

    fn decode_return_value(&self, _payload: &[u8]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learn_modes() {
        assert_eq!(NodeMode::ADD.bits(), 0xC1);
        assert_eq!(NodeMode::REMOVE.bits(), 0x81);
        assert_eq!(NodeMode::ANY.with_option(NodeMode::OPTION_LR).bits(), 0x21);

        let stop = AddNodeToNetwork {
            mode: NodeMode::STOP,
            callback_id: 0,
        };
        assert_eq!(stop.args().as_ref(), &[0x4A, 0x05, 0x00]);
        assert!(!stop.has_return_value());
    }

    #[test]
    fn test_node_found_callback_with_command_classes() {
        // Slave node 5, generic 0x10, three command classes.
        let payload = [0x4A, 0x09, 0x03, 0x05, 0x06, 0x04, 0x10, 0x01, 0x5E, 0x84, 0x25];
        let update = NodeUpdate::parse(FunctionId::AddNodeToNetwork, 0x09, &payload).unwrap();

        assert_eq!(update.status, NodeStatus::Slave);
        assert_eq!(update.node_id, 5);
        assert_eq!(
            update.device_class,
            Some(DeviceClass {
                basic: 0x04,
                generic: 0x10,
                specific: 0x01
            })
        );
        assert_eq!(update.command_classes, vec![0x5E, 0x84, 0x25]);
    }

    #[test]
    fn test_short_callback() {
        let update =
            NodeUpdate::parse(FunctionId::AddNodeToNetwork, 0x09, &[0x4A, 0x09, 0x01, 0x00, 0x00])
                .unwrap();
        assert_eq!(update.status, NodeStatus::LearnReady);
        assert_eq!(update.device_class, None);
        assert!(update.command_classes.is_empty());
    }

    #[test]
    fn test_foreign_callback_ignored() {
        let payload = [0x4A, 0x09, 0x01, 0x00, 0x00];
        assert!(NodeUpdate::parse(FunctionId::AddNodeToNetwork, 0x0A, &payload).is_none());
        assert!(NodeUpdate::parse(FunctionId::RemoveNodeFromNetwork, 0x09, &payload).is_none());
        assert!(NodeUpdate::parse(FunctionId::AddNodeToNetwork, 0x09, &[0x4A, 0x09]).is_none());
    }

    #[test]
    fn test_status_values() {
        assert_eq!(NodeStatus::from(0x23), NodeStatus::NotPrimary);
        assert_eq!(NodeStatus::from(0x06), NodeStatus::Done);
        assert_eq!(NodeStatus::from(0x99), NodeStatus::Other(0x99));
    }
}
