//! Error types for zwave-serial.

use thiserror::Error;

use crate::function::TransmitStatus;
use crate::NodeId;

/// Main error type for all driver operations.
#[derive(Debug, Error)]
pub enum ZWaveError {
    /// I/O error on the serial stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data frame failed checksum verification.
    #[error("Checksum mismatch: expected {expected:#04X}, got {actual:#04X}")]
    Checksum { expected: u8, actual: u8 },

    /// CRC16 envelope failed verification.
    #[error("CRC16 mismatch: expected {expected:#06X}, got {actual:#06X}")]
    Crc16Mismatch { expected: u16, actual: u16 },

    /// Unexpected frame or content for the current exchange.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A bounded wait was exceeded.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The controller reported a final delivery failure.
    #[error("Transmit failed: {0:?}")]
    Transmit(TransmitStatus),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller aborted an inclusion/exclusion before the point of no return.
    #[error("Operation aborted")]
    Aborted,

    /// Inbound payload too short or malformed.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Caller supplied a value the wire format cannot carry.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No codec is registered for the command class.
    #[error("Unsupported command class {0:#04X}")]
    UnsupportedCommandClass(u8),

    /// A Get with the same correlation key is already outstanding.
    #[error("Get for node {node_id} class {class_id:#04X} command {command:#04X} already pending")]
    CorrelationInUse {
        node_id: NodeId,
        class_id: u8,
        command: u8,
    },

    /// Another inclusion or exclusion sequence is running.
    #[error("Inclusion sequence already in progress")]
    InclusionInProgress,

    /// Learn mode requested on a controller that is not primary.
    #[error("Controller is not the primary controller")]
    NotPrimary,

    /// The controller is not the network's static update controller.
    #[error("Networks without a static update controller (SUC) are not supported")]
    NoSucController,

    /// An inclusion/exclusion phase exceeded its deadline.
    #[error("Node sequence timed out waiting for {phase}")]
    NodeTimeout { phase: &'static str, node_id: NodeId },

    /// Link closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl ZWaveError {
    /// Whether this error is one of the timeout kinds.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::NodeTimeout { .. })
    }
}

/// Result type alias using ZWaveError.
pub type Result<T> = std::result::Result<T, ZWaveError>;
