//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the serial framing layer:
//! - Preamble bytes and the XOR-fold checksum
//! - Frame buffer for reassembling fragmented reads
//! - Frame and DataFrame types with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_data_frame, decode, DataFrame, Frame};
pub use frame_buffer::{FrameBuffer, Parsed};
pub use wire_format::{
    checksum, frame_checksum, FrameType, Preamble, ACK, CAN, CHECKSUM_SEED, MAX_PAYLOAD_LEN,
    MIN_LENGTH, NAK, SOF,
};
