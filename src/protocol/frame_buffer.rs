//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForPreamble`: scanning for SOF or a control byte
//! - `WaitingForLength`: SOF seen, need the length byte
//! - `WaitingForBody`: length known, need N more bytes
//!
//! # Example
//!
//! ```ignore
//! use zwave_serial::protocol::{FrameBuffer, Parsed};
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // Bytes arrive in arbitrary chunks from the serial port
//! for parsed in buffer.push(&[0x06, 0x01, 0x04, 0x01]) {
//!     println!("{:?}", parsed);
//! }
//! ```

use bytes::BytesMut;

use super::frame::{DataFrame, Frame};
use super::wire_format::{FrameType, Preamble, MIN_LENGTH};

/// Initial buffer capacity; a data frame is at most 257 bytes.
const INITIAL_CAPACITY: usize = 512;

/// Something recognised in the inbound byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// A control frame or a data frame (checksum not yet judged).
    Frame(Frame),
    /// A byte outside any frame that is not a known preamble.
    Unexpected(u8),
    /// A complete data frame whose type byte is invalid.
    Malformed { length: u8, frame_type: u8 },
}

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForPreamble,
    WaitingForLength,
    WaitingForBody { length: u8 },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from serial reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
}

impl FrameBuffer {
    /// Create a new frame buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            state: State::WaitingForPreamble,
        }
    }

    /// Push data into the buffer and extract everything complete.
    ///
    /// Partial data frames stay buffered for the next push. Data frames
    /// are returned whether or not their checksum is valid; deciding to
    /// Ack or Nack is the caller's job.
    pub fn push(&mut self, data: &[u8]) -> Vec<Parsed> {
        self.buffer.extend_from_slice(data);

        let mut parsed = Vec::new();
        while let Some(item) = self.try_extract_one() {
            parsed.push(item);
        }
        parsed
    }

    /// Try to extract one item; `None` means more data is needed.
    fn try_extract_one(&mut self) -> Option<Parsed> {
        loop {
            match self.state {
                State::WaitingForPreamble => {
                    if self.buffer.is_empty() {
                        return None;
                    }
                    let byte = self.buffer.split_to(1)[0];
                    match Preamble::from_byte(byte) {
                        Some(Preamble::StartOfFrame) => {
                            self.state = State::WaitingForLength;
                        }
                        Some(control) => return Some(Parsed::Frame(Frame::Control(control))),
                        None => return Some(Parsed::Unexpected(byte)),
                    }
                }

                State::WaitingForLength => {
                    let length = *self.buffer.first()?;
                    if length < MIN_LENGTH {
                        // Drop the SOF and rescan from the length byte.
                        tracing::warn!("Dropping frame with invalid length {}", length);
                        self.state = State::WaitingForPreamble;
                        continue;
                    }
                    let _ = self.buffer.split_to(1);
                    self.state = State::WaitingForBody { length };
                }

                State::WaitingForBody { length } => {
                    if self.buffer.len() < length as usize {
                        return None;
                    }
                    let body = self.buffer.split_to(length as usize).freeze();
                    self.state = State::WaitingForPreamble;

                    let type_byte = body[0];
                    let checksum = body[body.len() - 1];
                    let payload = body.slice(1..body.len() - 1);

                    return Some(match FrameType::try_from(type_byte) {
                        Ok(frame_type) => Parsed::Frame(Frame::Data(DataFrame::from_wire(
                            length, frame_type, payload, checksum,
                        ))),
                        Err(_) => Parsed::Malformed {
                            length,
                            frame_type: type_byte,
                        },
                    });
                }
            }
        }
    }

    /// True while part of a data frame has been received.
    pub fn is_mid_frame(&self) -> bool {
        !matches!(self.state, State::WaitingForPreamble)
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard any partial frame and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForPreamble;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForPreamble => "WaitingForPreamble",
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_data_frame;

    fn data_payload(parsed: &Parsed) -> &[u8] {
        match parsed {
            Parsed::Frame(Frame::Data(data)) => data.payload(),
            other => panic!("expected data frame, got {:?}", other),
        }
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let wire = build_data_frame(FrameType::Response, &[0x56, 0x01]).unwrap();

        let parsed = buffer.push(&wire);

        assert_eq!(parsed.len(), 1);
        assert_eq!(data_payload(&parsed[0]), &[0x56, 0x01]);
        assert!(buffer.is_empty());
        assert!(!buffer.is_mid_frame());
    }

    #[test]
    fn test_control_bytes_between_frames() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = vec![0x06];
        bytes.extend_from_slice(&build_data_frame(FrameType::Response, &[0x20, 0x01]).unwrap());
        bytes.push(0x18);

        let parsed = buffer.push(&bytes);

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0], Parsed::Frame(Frame::Control(Preamble::Ack)));
        assert_eq!(data_payload(&parsed[1]), &[0x20, 0x01]);
        assert_eq!(parsed[2], Parsed::Frame(Frame::Control(Preamble::Cancel)));
    }

    #[test]
    fn test_fragmented_frame() {
        let mut buffer = FrameBuffer::new();
        let wire = build_data_frame(FrameType::Request, &[0x49, 0x84, 0x02, 0x03, 0x04, 0x10, 0x01]).unwrap();

        assert!(buffer.push(&wire[..1]).is_empty());
        assert_eq!(buffer.state_name(), "WaitingForLength");

        assert!(buffer.push(&wire[1..4]).is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");
        assert!(buffer.is_mid_frame());

        let parsed = buffer.push(&wire[4..]);
        assert_eq!(parsed.len(), 1);
        assert_eq!(data_payload(&parsed[0])[0], 0x49);
        assert_eq!(buffer.state_name(), "WaitingForPreamble");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let wire = build_data_frame(FrameType::Request, &[0xA8, 0x00, 0x01, 0x02, 0x03, 0x20, 0x03, 0x10, 0x00, 0x00]).unwrap();

        let mut all = Vec::new();
        for byte in wire.iter() {
            all.extend(buffer.push(&[*byte]));
        }

        assert_eq!(all.len(), 1);
        assert_eq!(data_payload(&all[0])[0], 0xA8);
    }

    #[test]
    fn test_bad_checksum_still_reported() {
        let mut buffer = FrameBuffer::new();
        let mut wire = build_data_frame(FrameType::Response, &[0x20, 0x01]).unwrap().to_vec();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        let parsed = buffer.push(&wire);

        match &parsed[0] {
            Parsed::Frame(Frame::Data(data)) => assert!(!data.is_checksum_valid()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_byte_is_skipped() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = vec![0x42];
        bytes.extend_from_slice(&build_data_frame(FrameType::Response, &[0x02]).unwrap());

        let parsed = buffer.push(&bytes);

        assert_eq!(parsed[0], Parsed::Unexpected(0x42));
        assert_eq!(data_payload(&parsed[1]), &[0x02]);
    }

    #[test]
    fn test_short_length_resynchronizes() {
        let mut buffer = FrameBuffer::new();
        // Length 2 is too short: the SOF is dropped and scanning resumes.
        let parsed = buffer.push(&[0x01, 0x02, 0x06]);

        assert_eq!(
            parsed,
            vec![
                Parsed::Unexpected(0x02),
                Parsed::Frame(Frame::Control(Preamble::Ack))
            ]
        );
        assert!(!buffer.is_mid_frame());
    }

    #[test]
    fn test_invalid_frame_type_is_malformed() {
        let mut buffer = FrameBuffer::new();
        let parsed = buffer.push(&[0x01, 0x03, 0x05, 0x20, 0x00]);

        assert_eq!(
            parsed,
            vec![Parsed::Malformed {
                length: 3,
                frame_type: 0x05
            }]
        );
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        let wire = build_data_frame(FrameType::Request, &[0x20, 0x01, 0x02]).unwrap();
        buffer.push(&wire[..3]);
        assert!(buffer.is_mid_frame());

        buffer.clear();

        assert_eq!(buffer.state_name(), "WaitingForPreamble");
        assert!(buffer.is_empty());

        let parsed = buffer.push(&wire);
        assert_eq!(parsed.len(), 1);
    }
}
