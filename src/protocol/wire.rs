//! Classic wire framing: encode, decode, checksum.
//!
//! Frame layout:
//! ```text
//! ┌─────────┬────────┬───────────┬──────────┬─────────────┬──────────┐
//! │ command │ length │ direction │ register │ payload     │ checksum │
//! │ 1 byte  │ 1 byte │ 1 byte    │ 1 byte   │ len-3 bytes │ 1 byte   │
//! └─────────┴────────┴───────────┴──────────┴─────────────┴──────────┘
//! ```
//!
//! `length = 2 + payload + 1` (it counts everything after itself), so a
//! complete frame occupies `length + 2` bytes. The checksum is the additive
//! sum of every preceding frame byte, mod 256.
//!
//! Frames from MY18 hardware arrive scrambled (see [`super::scramble`]);
//! [`decode`] falls back to the self-keyed scrambled parse whenever the
//! classic parse does not produce a valid checksum, so callers never need to
//! know which firmware revision they are talking to.

use crate::error::DecodeError;

use super::message::{Direction, PhevMessage};
use super::scramble::{self, SelfKeyed};

/// Smallest buffer worth attempting to decode: header, one payload byte and
/// checksum.
pub const MIN_FRAME: usize = 6;

/// Additive checksum over every frame byte preceding the checksum byte.
///
/// The checksum's position is located through the frame's own length field.
///
/// # Example
///
/// ```
/// use phevlink::protocol::wire::checksum;
///
/// assert_eq!(checksum(&[0x2f, 0x04, 0x00, 0x01, 0x01, 0x00]), 0x35);
/// ```
pub fn checksum(frame: &[u8]) -> u8 {
    if frame.len() < 2 {
        return 0;
    }
    let count = (frame[1] as usize + 1).min(frame.len());
    frame[..count].iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// How a decoded frame was framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Plain framing with an additive checksum.
    Classic,
    /// Scrambled MY18 framing; `key` is the raw self-describing key byte,
    /// usable to scramble outbound frames for the same session.
    Scrambled { key: u8 },
}

/// A successfully decoded frame plus cursor-advance information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub message: PhevMessage,
    /// Bytes this frame occupied; advance the read cursor by exactly this.
    pub consumed: usize,
    pub framing: Framing,
}

/// Encode a message into classic framing.
///
/// Length field and checksum are always computed, never trusted from the
/// caller. Every message with a payload of at most 250 bytes is encodable.
pub fn encode(message: &PhevMessage) -> Vec<u8> {
    let mut frame = Vec::with_capacity(message.frame_len());
    frame.push(message.command);
    frame.push(message.length_field());
    frame.push(message.direction.to_wire());
    frame.push(message.register);
    frame.extend_from_slice(&message.payload);
    frame.push(checksum(&frame));
    frame
}

/// Decode one frame from the front of `bytes`.
///
/// Classic framing is parsed first; on checksum failure the self-keyed
/// scrambled parse is attempted before giving up. `IncompleteFrame` means the
/// buffer ends before any candidate frame does; buffer more bytes and retry.
pub fn decode(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    if bytes.len() < MIN_FRAME {
        return Err(DecodeError::IncompleteFrame {
            needed: MIN_FRAME,
            available: bytes.len(),
        });
    }

    let classic_err = match try_classic(bytes) {
        Ok(decoded) => return Ok(decoded),
        Err(err) => err,
    };

    match scramble::decode_self_keyed(bytes) {
        SelfKeyed::Frame(decoded) => Ok(decoded),
        SelfKeyed::NeedMore(needed) => {
            // Either framing might complete with more data; report the
            // nearer boundary.
            let needed = match classic_err {
                DecodeError::IncompleteFrame { needed: n, .. } => n.min(needed),
                _ => needed,
            };
            Err(DecodeError::IncompleteFrame {
                needed,
                available: bytes.len(),
            })
        }
        SelfKeyed::Reject => match classic_err {
            err @ DecodeError::IncompleteFrame { .. } => Err(err),
            // Classic parsed fully but failed its checksum, and the
            // scrambled fallback rejected it too. The classic length field
            // still delimits the rejected frame, so report it as skippable.
            DecodeError::ChecksumMismatch { .. } => Err(DecodeError::UnrecognizedFraming {
                skip: Some(bytes[1] as usize + 2),
            }),
            err => Err(err),
        },
    }
}

fn try_classic(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let frame_len = bytes[1] as usize + 2;
    if frame_len > bytes.len() {
        return Err(DecodeError::IncompleteFrame {
            needed: frame_len,
            available: bytes.len(),
        });
    }
    if frame_len < 5 {
        // Length field below the 2 + 0 + 1 minimum cannot be a real frame,
        // and cannot be trusted as a skip distance either.
        return Err(DecodeError::UnrecognizedFraming { skip: None });
    }

    let computed = bytes[..frame_len - 1]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    let found = bytes[frame_len - 1];
    if computed != found {
        return Err(DecodeError::ChecksumMismatch { computed, found });
    }

    let message = PhevMessage::new(
        bytes[0],
        Direction::from_wire(bytes[2]),
        bytes[3],
        bytes[4..frame_len - 1].to_vec(),
    );
    Ok(Decoded {
        message,
        consumed: frame_len,
        framing: Framing::Classic,
    })
}
