//! MY18 frame obfuscation.
//!
//! Later-model telemetry modules XOR every frame byte with a session key
//! before it hits the wire. The transform is self-describing: the third byte
//! of a scrambled frame is the key material itself (XORing the key with the
//! direction byte, which is 0 or 1, leaves the key or key-with-low-bit
//! visible in that position). Inbound frames can therefore be unscrambled
//! without prior key agreement, and the recovered key byte is reused to
//! scramble outbound traffic for the rest of the session.
//!
//! Decoding tries the even key candidate `frame[2] & 0xFE` first and accepts
//! on a plausible recovered length alone; the odd candidate `frame[2] | 1` is
//! the fallback and must also produce a valid checksum. A recovered command
//! byte of [`UNRELIABLE_LENGTH_CMD`] marks a hardware quirk where the length
//! field lies; its real value is always 4.

use crate::error::DecodeError;

use super::message::{Direction, PhevMessage};
use super::wire::{Decoded, Framing};

/// Command whose frames carry a garbage length field; treated as length 4.
pub const UNRELIABLE_LENGTH_CMD: u8 = 0xcd;

/// Extract the odd key candidate from a scrambled frame's key byte.
///
/// Inbound paths mask the result with `0xFE` when they need the even base.
#[inline]
pub fn xor_key(frame: &[u8]) -> u8 {
    frame[2] | 1
}

/// Extract the even base key from a scrambled frame's key byte.
///
/// This is the candidate the inbound decode tries first; idempotent under
/// repeated masking.
#[inline]
pub fn base_key(frame: &[u8]) -> u8 {
    frame[2] & 0xfe
}

/// Recover the session key from a scrambled frame whose plaintext is known.
///
/// Diagnostic bootstrap: compare a captured scrambled frame against the
/// message you know it carries. Returns `None` when the inputs cannot
/// correspond (length mismatch or too short).
pub fn key_from_known_plaintext(scrambled: &[u8], plain: &[u8]) -> Option<u8> {
    if scrambled.len() != plain.len() || plain.len() < 3 {
        return None;
    }
    let effective = scrambled[0] ^ plain[0];
    Some(effective ^ (plain[2] & 1))
}

/// XOR every byte of `frame` with `key`, as applied to inbound traffic.
pub fn unscramble(frame: &[u8], key: u8) -> Vec<u8> {
    frame.iter().map(|b| b ^ key).collect()
}

/// Scramble an encoded frame for the wire.
///
/// The effective key folds in the frame's direction bit, which is what makes
/// the key byte self-describing on the receiving side.
pub fn scramble_frame(frame: &[u8], key: u8) -> Vec<u8> {
    let effective = if frame.len() > 2 {
        key ^ (frame[2] & 1)
    } else {
        key
    };
    frame.iter().map(|b| b ^ effective).collect()
}

/// Encode a message and scramble it with the session key.
pub fn encode_keyed(message: &PhevMessage, key: u8) -> Vec<u8> {
    scramble_frame(&super::wire::encode(message), key)
}

/// Decode a scrambled frame under a known session key.
///
/// Left inverse of [`encode_keyed`]: because the sender folded the direction
/// bit into the effective key, both `key` and `key ^ 1` are tried, gated on a
/// valid recovered checksum.
pub fn decode_keyed(bytes: &[u8], key: u8) -> Result<Decoded, DecodeError> {
    let mut best: Option<DecodeError> = None;
    for effective in [key, key ^ 1] {
        match attempt(bytes, effective, true, bytes.get(2).copied().unwrap_or(key)) {
            SelfKeyed::Frame(decoded) => return Ok(decoded),
            SelfKeyed::NeedMore(needed) => {
                let err = DecodeError::IncompleteFrame {
                    needed,
                    available: bytes.len(),
                };
                best = Some(match best {
                    Some(prev @ DecodeError::IncompleteFrame { .. }) => prev,
                    _ => err,
                });
            }
            SelfKeyed::Reject => {}
        }
    }
    Err(best.unwrap_or(DecodeError::UnrecognizedFraming { skip: None }))
}

/// Outcome of the self-keyed decode attempt.
pub(crate) enum SelfKeyed {
    /// A frame was recovered.
    Frame(Decoded),
    /// A candidate key declared a frame longer than the buffer; retry with
    /// at least this many bytes.
    NeedMore(usize),
    /// No candidate key produced a plausible frame.
    Reject,
}

/// Try to decode the front of `bytes` as a scrambled frame using the key
/// material the frame itself carries. Caller guarantees `bytes.len() >= 6`.
pub(crate) fn decode_self_keyed(bytes: &[u8]) -> SelfKeyed {
    let raw_key = bytes[2];
    let even = base_key(bytes);
    let odd = xor_key(bytes);

    let mut need_more: Option<usize> = None;

    // Even candidate first; a zero key is a no-op transform and the classic
    // parse has already rejected those bytes.
    if even != 0 {
        match attempt(bytes, even, false, raw_key) {
            SelfKeyed::Frame(decoded) => return SelfKeyed::Frame(decoded),
            SelfKeyed::NeedMore(needed) => need_more = Some(needed),
            SelfKeyed::Reject => {}
        }
    }

    match attempt(bytes, odd, true, raw_key) {
        SelfKeyed::Frame(decoded) => SelfKeyed::Frame(decoded),
        SelfKeyed::NeedMore(needed) => {
            SelfKeyed::NeedMore(need_more.map_or(needed, |n| n.min(needed)))
        }
        SelfKeyed::Reject => match need_more {
            Some(needed) => SelfKeyed::NeedMore(needed),
            None => SelfKeyed::Reject,
        },
    }
}

fn attempt(bytes: &[u8], effective: u8, require_checksum: bool, raw_key: u8) -> SelfKeyed {
    if bytes.len() < 4 {
        return SelfKeyed::NeedMore(4);
    }

    let command = bytes[0] ^ effective;
    let length_field = if command == UNRELIABLE_LENGTH_CMD {
        4
    } else {
        (bytes[1] ^ effective) as usize
    };
    if length_field < 3 {
        return SelfKeyed::Reject;
    }

    let frame_len = length_field + 2;
    if frame_len > bytes.len() {
        return SelfKeyed::NeedMore(frame_len);
    }

    let plain = unscramble(&bytes[..frame_len], effective);
    if require_checksum {
        let computed = plain[..frame_len - 1]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        if computed != plain[frame_len - 1] {
            return SelfKeyed::Reject;
        }
    }

    let message = PhevMessage::new(
        command,
        Direction::from_wire(plain[2]),
        plain[3],
        plain[4..frame_len - 1].to_vec(),
    );
    SelfKeyed::Frame(Decoded {
        message,
        consumed: frame_len,
        framing: Framing::Scrambled { key: raw_key },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::decode;

    #[test]
    fn test_xor_key_is_odd_candidate() {
        assert_eq!(xor_key(&[0x1f, 0x24, 0x21]), 0x21);
        assert_eq!(xor_key(&[0x1f, 0x24, 0x20]), 0x21);
    }

    #[test]
    fn test_base_key_is_even_and_idempotent() {
        assert_eq!(base_key(&[0x1f, 0x24, 0x21]), 0x20);
        assert_eq!(base_key(&[0x1f, 0x24, 0x20]), 0x20);
        assert_eq!(base_key(&[0x00, 0x00, base_key(&[0x1f, 0x24, 0x21])]), 0x20);
    }

    #[test]
    fn test_scramble_outbound_vectors() {
        let cases: [(&[u8], u8, &[u8]); 4] = [
            (
                &[0xf6, 0x04, 0x01, 0xc0, 0x00, 0xbb],
                0x56,
                &[0xa1, 0x53, 0x56, 0x97, 0x57, 0xec],
            ),
            (
                &[0xf6, 0x04, 0x01, 0x01, 0x00, 0xfc],
                0xb5,
                &[0x42, 0xb0, 0xb5, 0xb5, 0xb4, 0x48],
            ),
            (
                &[0xf6, 0x04, 0x00, 0x0a, 0x01, 0x05],
                0x4d,
                &[0xbb, 0x49, 0x4d, 0x47, 0x4c, 0x48],
            ),
            (
                &[0xf6, 0x04, 0x00, 0x0a, 0x02, 0x06],
                0x3f,
                &[0xc9, 0x3b, 0x3f, 0x35, 0x3d, 0x39],
            ),
        ];
        for (plain, key, expected) in cases {
            assert_eq!(scramble_frame(plain, key), expected);
        }
    }

    #[test]
    fn test_scrambled_key_byte_reveals_session_key() {
        // Whatever the direction bit, the third scrambled byte equals the key.
        let request = [0xf6, 0x04, 0x00, 0x0a, 0x01, 0x05];
        let response = [0xf6, 0x04, 0x01, 0xc0, 0x00, 0xbb];
        assert_eq!(scramble_frame(&request, 0x4d)[2], 0x4d);
        assert_eq!(scramble_frame(&response, 0x56)[2], 0x56);
    }

    #[test]
    fn test_unscramble_inbound_vectors() {
        let cases: [(&[u8], &[u8]); 4] = [
            (
                &[0x4f, 0x26, 0x20, 0x23, 0x21, 0x31, 0x43, 0xcd],
                &[0x6f, 0x06, 0x00, 0x03, 0x01, 0x11, 0x63, 0xed],
            ),
            (
                &[0x1f, 0x24, 0x21, 0x17, 0x20, 0x5b],
                &[0x3f, 0x04, 0x01, 0x37, 0x00, 0x7b],
            ),
            (
                &[0x62, 0x09, 0x0d, 0x2c, 0x0d, 0x99],
                &[0x6f, 0x04, 0x00, 0x21, 0x00, 0x94],
            ),
            (
                &[0xa0, 0x9b, 0x9e, 0xc0, 0x9f, 0x3c],
                &[0x3f, 0x04, 0x01, 0x5f, 0x00, 0xa3],
            ),
        ];
        for (scrambled, plain) in cases {
            // The effective inbound key is the key byte with the plaintext
            // direction bit folded back in.
            let effective = scrambled[2] ^ plain[2];
            assert_eq!(unscramble(scrambled, effective), plain);
        }
    }

    #[test]
    fn test_self_keyed_decode_vectors() {
        // (scrambled frame, command, direction byte, payload len, consumed)
        let cases: [(&[u8], u8, u8, usize, usize); 5] = [
            (&[0x1f, 0x24, 0x21, 0x17, 0x20, 0x5b], 0x3f, 1, 1, 6),
            (&[0x86, 0xbd, 0xb8, 0xf9, 0xb9, 0x3d], 0x3f, 1, 1, 6),
            (&[0x4f, 0x26, 0x20, 0x23, 0x21, 0x31, 0x43, 0xcd], 0x6f, 0, 3, 8),
            (&[0x6d, 0xd2, 0xd7, 0x76, 0xa5, 0x05], 0xbb, 1, 1, 6),
            (&[0x1a, 0xd2, 0xd7, 0x80, 0xa5, 0x4c], 0xcc, 1, 1, 6),
        ];
        for (frame, command, dir, payload_len, consumed) in cases {
            let decoded = decode(frame).unwrap();
            assert_eq!(decoded.message.command, command, "frame {frame:02x?}");
            assert_eq!(decoded.message.direction, Direction::from_wire(dir));
            assert_eq!(decoded.message.payload.len(), payload_len);
            assert_eq!(decoded.consumed, consumed);
            assert_eq!(decoded.framing, Framing::Scrambled { key: frame[2] });
        }
    }

    #[test]
    fn test_self_keyed_decode_long_frame() {
        let frame = [
            0xd6, 0xae, 0xb9, 0xac, 0xb9, 0xf3, 0xf4, 0xf8, 0xe1, 0xfd, 0xfe, 0xfe, 0x8b, 0xee,
            0xfe, 0xe3, 0x89, 0x89, 0x8b, 0x89, 0x8a, 0x8c, 0xb8, 0xb8, 0x4a,
        ];
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.message.command, 0x6e);
        assert_eq!(decoded.message.direction, Direction::Response);
        assert_eq!(decoded.message.payload.len(), 19);
        assert_eq!(decoded.consumed, 24);
        assert_eq!(decoded.framing, Framing::Scrambled { key: 0xb9 });
    }

    #[test]
    fn test_self_keyed_unreliable_length_command() {
        // 0xcd frames declare a garbage length; decode pins it to 4.
        let plain = [0xcd, 0x99, 0x00, 0x01, 0x07, 0x6e];
        let scrambled = scramble_frame(&plain, 0x30);
        assert_eq!(scrambled[2], 0x30);

        let decoded = decode(&scrambled).unwrap();
        assert_eq!(decoded.message.command, UNRELIABLE_LENGTH_CMD);
        assert_eq!(decoded.message.register, 0x01);
        assert_eq!(&decoded.message.payload[..], &[0x07]);
        assert_eq!(decoded.consumed, 6);
    }

    #[test]
    fn test_encode_keyed_decode_keyed_roundtrip() {
        let msg = PhevMessage::new(0xf6, Direction::Response, 0xc0, vec![0x00]);
        let frame = encode_keyed(&msg, 0x56);
        assert_eq!(frame, [0xa1, 0x53, 0x56, 0x97, 0x57, 0xec]);

        let decoded = decode_keyed(&frame, 0x56).unwrap();
        assert_eq!(decoded.message, msg);
        assert_eq!(decoded.consumed, 6);
    }

    #[test]
    fn test_decode_keyed_wrong_key() {
        let msg = PhevMessage::new(0xf6, Direction::Request, 0x0a, vec![0x01]);
        let frame = encode_keyed(&msg, 0x4d);
        let err = decode_keyed(&frame, 0x92).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnrecognizedFraming { .. } | DecodeError::IncompleteFrame { .. }
        ));
    }

    #[test]
    fn test_key_from_known_plaintext() {
        let plain = [0xf6, 0x04, 0x01, 0xc0, 0x00, 0xbb];
        let scrambled = [0xa1, 0x53, 0x56, 0x97, 0x57, 0xec];
        assert_eq!(key_from_known_plaintext(&scrambled, &plain), Some(0x56));

        let request = [0xf6, 0x04, 0x00, 0x0a, 0x01, 0x05];
        let request_scrambled = scramble_frame(&request, 0x4d);
        assert_eq!(
            key_from_known_plaintext(&request_scrambled, &request),
            Some(0x4d)
        );

        assert_eq!(key_from_known_plaintext(&scrambled, &plain[..5]), None);
        assert_eq!(key_from_known_plaintext(&scrambled[..2], &plain[..2]), None);
    }

    #[test]
    fn test_self_keyed_short_buffer_requests_more() {
        // Valid scrambled frame cut one byte short.
        let frame = [0x4f, 0x26, 0x20, 0x23, 0x21, 0x31, 0x43];
        let err = decode(&frame).unwrap_err();
        assert!(err.is_incomplete());
    }
}
