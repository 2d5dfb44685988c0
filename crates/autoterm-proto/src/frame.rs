//! Frame codec for the Autoterm serial protocol.
//!
//! A frame is `0xAA | device | L | id1 | id2 | payload(L bytes) | CRC` with
//! the CRC-16 of everything before it appended big-endian, for a total wire
//! size of `L + 7` bytes.

use crate::crc::{crc16, crc16_wire};
use std::fmt;
use thiserror::Error;

/// Frame preamble byte.
pub const PREAMBLE: u8 = 0xAA;

/// Escape byte forwarded verbatim outside of any frame.
///
/// The OEM panel emits it during its init handshake; its exact role is
/// undocumented and it is treated as an opaque pre-frame marker.
pub const ESC: u8 = 0x1B;

/// Bytes of framing around the payload: preamble, device, length, id1, id2
/// and the two CRC bytes.
pub const FRAME_OVERHEAD: usize = 7;

/// Device codes recognized on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Device {
    /// Init / broadcast traffic (0x00).
    Broadcast = 0x00,
    /// Diagnostic bus (0x02).
    Diagnostic = 0x02,
    /// Controller (OEM panel) origin (0x03).
    Controller = 0x03,
    /// Heater origin (0x04).
    Heater = 0x04,
}

impl Device {
    /// Parse a device code from its wire byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Broadcast),
            0x02 => Some(Self::Diagnostic),
            0x03 => Some(Self::Controller),
            0x04 => Some(Self::Heater),
            _ => None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => write!(f, "broadcast"),
            Self::Diagnostic => write!(f, "diagnostic"),
            Self::Controller => write!(f, "controller"),
            Self::Heater => write!(f, "heater"),
        }
    }
}

/// Errors from [`Frame::parse`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer bytes than the minimum frame size.
    #[error("packet too short: {actual} bytes (minimum {min})")]
    TooShort {
        /// Bytes available.
        actual: usize,
        /// Minimum packet size required.
        min: usize,
    },

    /// No preamble byte left after discarding garbage prefix bytes.
    #[error("no frame preamble in {0} bytes")]
    NoPreamble(usize),

    /// Device code outside the recognized set.
    #[error("unrecognized device code 0x{0:02X}")]
    BadDevice(u8),

    /// Declared payload length does not match the packet size.
    #[error("length field {declared} does not match packet of {actual} bytes")]
    LengthMismatch {
        /// Payload length declared in the frame header.
        declared: usize,
        /// Bytes actually present after the preamble was found.
        actual: usize,
    },

    /// Checksum mismatch.
    #[error("crc mismatch: computed 0x{computed:04X}, received 0x{received:04X}")]
    CrcMismatch {
        /// CRC computed over the received bytes.
        computed: u16,
        /// CRC carried by the frame.
        received: u16,
    },
}

/// Errors from [`Frame::build`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// A frame field is out of its permitted range.
    #[error("invalid frame field: {0}")]
    InvalidField(&'static str),
}

/// One decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Originating device code.
    pub device: Device,
    /// First message id byte (0 in all observed traffic).
    pub id1: u8,
    /// Second message id byte, selecting the operation.
    pub id2: u8,
    /// Message payload, up to 255 bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, validating field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidField`] if the payload exceeds the
    /// one-byte length field.
    pub fn build(device: Device, id2: u8, id1: u8, payload: &[u8]) -> Result<Self, BuildError> {
        if payload.len() > u8::MAX as usize {
            return Err(BuildError::InvalidField("payload longer than 255 bytes"));
        }
        Ok(Self {
            device,
            id1,
            id2,
            payload: payload.to_vec(),
        })
    }

    /// Serialize the frame to its wire representation, CRC included.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(self.payload.len() + FRAME_OVERHEAD);
        wire.push(PREAMBLE);
        wire.push(self.device as u8);
        wire.push(self.payload.len() as u8);
        wire.push(self.id1);
        wire.push(self.id2);
        wire.extend_from_slice(&self.payload);
        let crc = crc16_wire(&wire);
        wire.extend_from_slice(&crc);
        wire
    }

    /// Parse a frame from `packet` with the default minimum size.
    ///
    /// # Errors
    ///
    /// See [`ParseError`].
    pub fn parse(packet: &[u8]) -> Result<Self, ParseError> {
        Self::parse_min(packet, FRAME_OVERHEAD)
    }

    /// Parse a frame from `packet`, discarding garbage bytes ahead of the
    /// preamble. The packet must then contain exactly one frame. The caller
    /// keeps ownership of the buffer; nothing is consumed on failure.
    ///
    /// # Errors
    ///
    /// See [`ParseError`].
    pub fn parse_min(packet: &[u8], min: usize) -> Result<Self, ParseError> {
        if packet.len() < min {
            return Err(ParseError::TooShort {
                actual: packet.len(),
                min,
            });
        }

        // Resync: discard prefix bytes until a preamble leads.
        let start = packet
            .iter()
            .position(|&b| b == PREAMBLE)
            .ok_or(ParseError::NoPreamble(packet.len()))?;
        let packet = &packet[start..];
        if packet.len() < min {
            return Err(ParseError::TooShort {
                actual: packet.len(),
                min,
            });
        }

        let declared = packet[2] as usize;
        if packet.len() != declared + FRAME_OVERHEAD {
            return Err(ParseError::LengthMismatch {
                declared,
                actual: packet.len(),
            });
        }

        let device = Device::from_byte(packet[1]).ok_or(ParseError::BadDevice(packet[1]))?;

        let computed = crc16(&packet[..packet.len() - 2]);
        let received = u16::from_be_bytes([packet[packet.len() - 2], packet[packet.len() - 1]]);
        if computed != received {
            return Err(ParseError::CrcMismatch { computed, received });
        }

        Ok(Self {
            device,
            id1: packet[3],
            id2: packet[4],
            payload: packet[5..packet.len() - 2].to_vec(),
        })
    }

    /// Wire size of this frame, CRC included.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_encode_status_request() {
        let frame = Frame::build(Device::Controller, 0x0F, 0x00, &[]).unwrap();
        assert_eq!(frame.encode(), [0xAA, 0x03, 0x00, 0x00, 0x0F, 0x58, 0x7C]);
    }

    #[test]
    fn test_roundtrip() {
        let frame = Frame::build(Device::Heater, 0x0F, 0x00, &[1, 2, 3, 4]).unwrap();
        let wire = frame.encode();
        assert_eq!(wire.len(), frame.wire_len());
        let parsed = Frame::parse(&wire).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_roundtrip_max_payload() {
        let payload = vec![0x5A; 255];
        let frame = Frame::build(Device::Diagnostic, 0x01, 0x00, &payload).unwrap();
        let parsed = Frame::parse(&frame.encode()).unwrap();
        assert_eq!(parsed.payload, payload);
    }

    #[test]
    fn test_build_rejects_oversized_payload() {
        let payload = vec![0; 256];
        assert_eq!(
            Frame::build(Device::Controller, 0x01, 0x00, &payload),
            Err(BuildError::InvalidField("payload longer than 255 bytes"))
        );
    }

    #[test]
    fn test_parse_too_short() {
        assert_eq!(
            Frame::parse(&[0xAA, 0x03, 0x00]),
            Err(ParseError::TooShort { actual: 3, min: 7 })
        );
    }

    #[test]
    fn test_parse_resyncs_past_garbage() {
        let frame = Frame::build(Device::Heater, 0x0F, 0x00, &[]).unwrap();
        let mut wire = vec![0xFF, 0xFF];
        wire.extend_from_slice(&frame.encode());
        let parsed = Frame::parse(&wire).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_parse_rejects_unknown_device() {
        // Hand-built frame with device code 0x05
        let mut wire = vec![0xAA, 0x05, 0x00, 0x00, 0x0F];
        let crc = crc16_wire(&wire);
        wire.extend_from_slice(&crc);
        assert_eq!(Frame::parse(&wire), Err(ParseError::BadDevice(0x05)));
    }

    #[test]
    fn test_parse_rejects_bad_crc() {
        let mut wire = Frame::build(Device::Controller, 0x0F, 0x00, &[])
            .unwrap()
            .encode();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert!(matches!(
            Frame::parse(&wire),
            Err(ParseError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_length_mismatch() {
        let mut wire = Frame::build(Device::Controller, 0x02, 0x00, &[1, 2])
            .unwrap()
            .encode();
        // Declare a longer payload than is present.
        wire[2] = 5;
        assert_eq!(
            Frame::parse(&wire),
            Err(ParseError::LengthMismatch {
                declared: 5,
                actual: 9
            })
        );
    }

    #[test]
    fn test_parse_no_preamble() {
        assert_eq!(
            Frame::parse(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]),
            Err(ParseError::NoPreamble(7))
        );
    }

    #[test]
    fn test_device_from_byte() {
        assert_eq!(Device::from_byte(0x00), Some(Device::Broadcast));
        assert_eq!(Device::from_byte(0x02), Some(Device::Diagnostic));
        assert_eq!(Device::from_byte(0x03), Some(Device::Controller));
        assert_eq!(Device::from_byte(0x04), Some(Device::Heater));
        assert_eq!(Device::from_byte(0x01), None);
        assert_eq!(Device::from_byte(0xAA), None);
    }
}
