//! Decoded protocol message.
//!
//! Every field of the PHEV protocol is a single byte: a command opcode, a
//! request/response marker, a register address, and a short payload. Messages
//! are immutable once built and cheap to clone (`bytes::Bytes` payload).

use bytes::Bytes;

/// Largest payload that is guaranteed encodable in the one-byte length field.
pub const MAX_PAYLOAD: usize = 250;

/// Request/response marker carried in the third frame byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    /// Decode from the wire byte (0 = request, anything else = response).
    #[inline]
    pub fn from_wire(byte: u8) -> Self {
        if byte == 0 {
            Direction::Request
        } else {
            Direction::Response
        }
    }

    /// Encode to the wire byte.
    #[inline]
    pub fn to_wire(self) -> u8 {
        match self {
            Direction::Request => 0,
            Direction::Response => 1,
        }
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhevMessage {
    /// Opcode identifying the message purpose.
    pub command: u8,
    /// Request or response.
    pub direction: Direction,
    /// Logical vehicle register this message addresses.
    pub register: u8,
    /// Variable-length data, 0..=250 bytes.
    pub payload: Bytes,
}

impl PhevMessage {
    /// Create a new message.
    ///
    /// Payloads longer than [`MAX_PAYLOAD`] are truncated; the one-byte wire
    /// length field cannot describe more.
    pub fn new(command: u8, direction: Direction, register: u8, payload: impl Into<Bytes>) -> Self {
        let mut payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            payload.truncate(MAX_PAYLOAD);
        }
        Self {
            command,
            direction,
            register,
            payload,
        }
    }

    /// Value of the wire length field: direction + register + payload + checksum.
    #[inline]
    pub fn length_field(&self) -> u8 {
        (2 + self.payload.len() + 1) as u8
    }

    /// Total encoded frame size in bytes.
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.payload.len() + 5
    }

    #[inline]
    pub fn is_request(&self) -> bool {
        self.direction == Direction::Request
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.direction == Direction::Response
    }
}
