//! Frame types with typed accessors.
//!
//! A [`Frame`] is either a one-byte control frame or a [`DataFrame`].
//! Data frames are immutable once built: either from raw inbound bytes
//! ([`decode`]) or from an outbound function's argument bytes
//! ([`DataFrame::new`]).
//!
//! # Example
//!
//! ```
//! use zwave_serial::protocol::{decode, DataFrame, Frame, FrameType};
//!
//! let frame = DataFrame::new(FrameType::Request, vec![0x20]).unwrap();
//! let wire = frame.encode();
//! assert_eq!(&wire[..], &[0x01, 0x03, 0x00, 0x20, 0xDC]);
//!
//! match decode(&wire).unwrap() {
//!     Frame::Data(data) => assert_eq!(data.payload(), &[0x20]),
//!     Frame::Control(_) => unreachable!(),
//! }
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{frame_checksum, FrameType, Preamble, MAX_PAYLOAD_LEN, MIN_LENGTH, SOF};
use crate::error::{Result, ZWaveError};

/// A complete serial frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Ack, Nack or Cancel.
    Control(Preamble),
    /// Length-prefixed, checksummed data frame.
    Data(DataFrame),
}

impl Frame {
    /// Wire bytes of this frame.
    pub fn encode(&self) -> Bytes {
        match self {
            Frame::Control(preamble) => Bytes::copy_from_slice(&[preamble.as_byte()]),
            Frame::Data(data) => data.encode(),
        }
    }
}

/// A data frame: `[SOF, length, type, payload..., checksum]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    frame_type: FrameType,
    /// Function id followed by function-specific bytes.
    payload: Bytes,
    checksum: u8,
    checksum_valid: bool,
}

impl DataFrame {
    /// Build an outbound frame; the checksum is computed here.
    ///
    /// Fails when the payload does not fit the one-byte length field.
    pub fn new(frame_type: FrameType, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ZWaveError::InvalidArgument(format!(
                "frame payload of {} bytes exceeds {}",
                payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }
        let length = wire_length(payload.len());
        let checksum = frame_checksum(length, frame_type as u8, &payload);
        Ok(Self {
            frame_type,
            payload,
            checksum,
            checksum_valid: true,
        })
    }

    /// Rebuild a frame from its inbound parts and verify the checksum.
    pub fn from_wire(length: u8, frame_type: FrameType, payload: Bytes, checksum: u8) -> Self {
        let expected = frame_checksum(length, frame_type as u8, &payload);
        Self {
            frame_type,
            payload,
            checksum,
            checksum_valid: expected == checksum,
        }
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 4);
        buf.put_u8(SOF);
        buf.put_u8(self.length());
        buf.put_u8(self.frame_type as u8);
        buf.put_slice(&self.payload);
        buf.put_u8(self.checksum);
        buf.freeze()
    }

    /// Length byte: payload plus type and checksum.
    #[inline]
    pub fn length(&self) -> u8 {
        wire_length(self.payload.len())
    }

    #[inline]
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    #[inline]
    pub fn is_request(&self) -> bool {
        self.frame_type == FrameType::Request
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.frame_type == FrameType::Response
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Cheap clone of the payload.
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// First payload byte, the controller function id.
    #[inline]
    pub fn function_id(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    #[inline]
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    #[inline]
    pub fn is_checksum_valid(&self) -> bool {
        self.checksum_valid
    }
}

/// Payloads are bounded by [`MAX_PAYLOAD_LEN`] on every construction path.
#[inline]
fn wire_length(payload_len: usize) -> u8 {
    u8::try_from(payload_len + 2).unwrap_or(u8::MAX)
}

/// Encode a data frame directly from function argument bytes.
pub fn build_data_frame(frame_type: FrameType, args: &[u8]) -> Result<Bytes> {
    Ok(DataFrame::new(frame_type, Bytes::copy_from_slice(args))?.encode())
}

/// Decode exactly one frame from a complete buffer.
///
/// The first byte is the preamble. Control preambles yield a one-byte
/// frame; `SOF` reads the length byte and that many following bytes.
/// A checksum mismatch is not an error here: the frame is returned with
/// [`DataFrame::is_checksum_valid`] set to false.
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    let first = *bytes
        .first()
        .ok_or_else(|| ZWaveError::Decode("empty frame".into()))?;

    let preamble = Preamble::from_byte(first)
        .ok_or_else(|| ZWaveError::Protocol(format!("Invalid preamble {:#04X}", first)))?;

    if preamble.is_control() {
        if bytes.len() != 1 {
            return Err(ZWaveError::Decode(format!(
                "control frame with {} trailing bytes",
                bytes.len() - 1
            )));
        }
        return Ok(Frame::Control(preamble));
    }

    let length = *bytes
        .get(1)
        .ok_or_else(|| ZWaveError::Decode("missing length byte".into()))?;
    if length < MIN_LENGTH {
        return Err(ZWaveError::Decode(format!("length {} too short", length)));
    }
    if bytes.len() != length as usize + 2 {
        return Err(ZWaveError::Decode(format!(
            "length byte {} does not match {} frame bytes",
            length,
            bytes.len()
        )));
    }

    let frame_type = FrameType::try_from(bytes[2])?;
    let payload = Bytes::copy_from_slice(&bytes[3..bytes.len() - 1]);
    let checksum = bytes[bytes.len() - 1];

    Ok(Frame::Data(DataFrame::from_wire(
        length, frame_type, payload, checksum,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payloads() -> Vec<Vec<u8>> {
        vec![
            vec![0x20],
            vec![0x02],
            vec![0x13, 0x02, 0x03, 0x20, 0x01, 0xFF, 0x25, 0x07],
            vec![0x4A, 0xC1, 0x01],
            (0u8..=200).collect(),
            vec![0xFF; 64],
        ]
    }

    #[test]
    fn test_encode_layout() {
        let frame = DataFrame::new(FrameType::Request, vec![0x13, 0x02]).unwrap();
        let wire = frame.encode();

        assert_eq!(wire[0], SOF);
        assert_eq!(wire[1], 4);
        assert_eq!(wire[2], 0x00);
        assert_eq!(&wire[3..5], &[0x13, 0x02]);
        assert_eq!(wire.len(), 6);
    }

    #[test]
    fn test_decode_returns_original_payload() {
        for payload in sample_payloads() {
            for frame_type in [FrameType::Request, FrameType::Response] {
                let wire = build_data_frame(frame_type, &payload).unwrap();
                match decode(&wire).unwrap() {
                    Frame::Data(data) => {
                        assert_eq!(data.payload(), &payload[..]);
                        assert_eq!(data.frame_type(), frame_type);
                        assert!(data.is_checksum_valid());
                    }
                    other => panic!("expected data frame, got {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_single_bit_flip_invalidates_checksum() {
        for payload in sample_payloads() {
            let wire = build_data_frame(FrameType::Request, &payload).unwrap();

            // Type bit 0 keeps a valid frame type; every bit of payload and checksum.
            let mut positions: Vec<(usize, u8)> = vec![(2, 0x01)];
            for index in 3..wire.len() {
                for bit in 0..8 {
                    positions.push((index, 1 << bit));
                }
            }

            for (index, mask) in positions {
                let mut corrupted = wire.to_vec();
                corrupted[index] ^= mask;
                match decode(&corrupted).unwrap() {
                    Frame::Data(data) => assert!(
                        !data.is_checksum_valid(),
                        "flip at byte {} mask {:#04X} went unnoticed",
                        index,
                        mask
                    ),
                    other => panic!("expected data frame, got {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_length_flip_is_rejected() {
        let wire = build_data_frame(FrameType::Request, &[0x20, 0x01]).unwrap();
        for bit in 0..8 {
            let mut corrupted = wire.to_vec();
            corrupted[1] ^= 1 << bit;
            assert!(decode(&corrupted).is_err());
        }
    }

    #[test]
    fn test_decode_control_frames() {
        assert_eq!(decode(&[0x06]).unwrap(), Frame::Control(Preamble::Ack));
        assert_eq!(decode(&[0x15]).unwrap(), Frame::Control(Preamble::Nack));
        assert_eq!(decode(&[0x18]).unwrap(), Frame::Control(Preamble::Cancel));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[0x42]).is_err());
        assert!(decode(&[0x01]).is_err());
        assert!(decode(&[0x01, 0x02, 0x00, 0xFD]).is_err());
        assert!(decode(&[0x01, 0x03, 0x07, 0x20, 0xDB]).is_err());
    }

    #[test]
    fn test_known_response_frame() {
        // GetSucNodeId response: SUC is node 1
        let wire = [0x01, 0x04, 0x01, 0x56, 0x01, 0xAD];
        match decode(&wire).unwrap() {
            Frame::Data(data) => {
                assert!(data.is_response());
                assert!(data.is_checksum_valid());
                assert_eq!(data.function_id(), Some(0x56));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_payload_limit() {
        let largest = vec![0x13; MAX_PAYLOAD_LEN];
        let wire = build_data_frame(FrameType::Request, &largest).unwrap();
        assert_eq!(wire[1], 0xFF);
        match decode(&wire).unwrap() {
            Frame::Data(data) => {
                assert_eq!(data.payload().len(), MAX_PAYLOAD_LEN);
                assert!(data.is_checksum_valid());
            }
            other => panic!("expected data frame, got {:?}", other),
        }

        let err = DataFrame::new(FrameType::Request, vec![0x13; MAX_PAYLOAD_LEN + 1]).unwrap_err();
        assert!(matches!(err, ZWaveError::InvalidArgument(_)));
    }

    #[test]
    fn test_frame_encode_control() {
        assert_eq!(&Frame::Control(Preamble::Nack).encode()[..], &[0x15]);
    }
}
