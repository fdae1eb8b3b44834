//! Command builders for the messages a client actually sends.
//!
//! The opcodes and register numbers here were recovered from traffic
//! captures; the builders are thin and pure so the pipe can stay in charge
//! of framing and session keys.

use bytes::Bytes;

use super::message::{Direction, PhevMessage};
use super::wire;

/// Register write / acknowledgement opcode.
pub const SEND_CMD: u8 = 0xf6;
/// Session start opcode, client to car.
pub const START_SEND: u8 = 0xf2;
/// Session start acknowledgement opcode, car to client.
pub const START_RESP: u8 = 0x2f;
/// Keepalive opcode.
pub const PING_SEND: u8 = 0xf9;

/// Opcode of the canonical reply to `command`.
pub const RESPONSE_XOR: u8 = 0xaa;

/// Register addressed by the session start message.
pub const REGISTER_START: u8 = 0x01;
/// Register acknowledged to complete client registration.
pub const REGISTER_CONFIRM: u8 = 0xaa;
/// Register the car announces its VIN and registration state on.
pub const REGISTER_VIN: u8 = 0x15;
/// Register carrying the ECU firmware version string.
pub const REGISTER_ECU_VERSION: u8 = 0xc0;
/// Register signalling that the car is displaying its registration prompt.
pub const REGISTER_DISPLAY: u8 = 0x10;
/// Register signalling that the car's registration slots are full.
pub const REGISTER_MAX_REGISTRATIONS: u8 = 0x13;

/// A `SEND_CMD` request against `register` with a single data byte.
pub fn simple_request(register: u8, value: u8) -> PhevMessage {
    PhevMessage::new(SEND_CMD, Direction::Request, register, vec![value])
}

/// A `SEND_CMD` response against `register` with a single data byte.
pub fn simple_response(register: u8, value: u8) -> PhevMessage {
    PhevMessage::new(SEND_CMD, Direction::Response, register, vec![value])
}

/// A request with an arbitrary payload.
pub fn command(register: u8, payload: impl Into<Bytes>) -> PhevMessage {
    PhevMessage::new(SEND_CMD, Direction::Request, register, payload)
}

/// A zero-payload-byte acknowledgement response for `register` under an
/// arbitrary opcode.
pub fn ack(command: u8, register: u8) -> PhevMessage {
    PhevMessage::new(command, Direction::Response, register, vec![0])
}

/// Keepalive: the sequence number travels in the register field.
pub fn ping(sequence: u8) -> PhevMessage {
    PhevMessage::new(PING_SEND, Direction::Request, sequence, vec![0])
}

/// Session start carrying the client MAC address.
pub fn start(mac: [u8; 6]) -> PhevMessage {
    let mut payload = Vec::with_capacity(7);
    payload.extend_from_slice(&mac);
    payload.push(0);
    PhevMessage::new(START_SEND, Direction::Request, REGISTER_START, payload)
}

/// Second half of the handshake: confirm the registration register.
pub fn registration_confirm() -> PhevMessage {
    simple_request(REGISTER_CONFIRM, 0)
}

/// Canonical acknowledgement for an inbound request.
///
/// The reply opcode is the request opcode XOR `0xAA`, on the same register,
/// with a single zero payload byte.
pub fn response_to(request: &PhevMessage) -> PhevMessage {
    PhevMessage::new(
        request.command ^ RESPONSE_XOR,
        Direction::Response,
        request.register,
        vec![0],
    )
}

/// Encode the full handshake burst (`start` + `registration_confirm`) into a
/// single outbound buffer.
pub fn start_sequence(mac: [u8; 6]) -> Vec<u8> {
    let mut out = wire::encode(&start(mac));
    out.extend_from_slice(&wire::encode(&registration_confirm()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_request_encoding() {
        let frame = wire::encode(&simple_request(0xaa, 0));
        assert_eq!(frame, [0xf6, 0x04, 0x00, 0xaa, 0x00, 0xa4]);
    }

    #[test]
    fn test_ack_shape() {
        let msg = ack(SEND_CMD, 0x15);
        assert_eq!(msg.command, SEND_CMD);
        assert_eq!(msg.direction, Direction::Response);
        assert_eq!(msg.register, 0x15);
        assert_eq!(&msg.payload[..], &[0x00]);
    }

    #[test]
    fn test_ping_sequence_in_register() {
        let msg = ping(0x2c);
        assert_eq!(msg.command, PING_SEND);
        assert_eq!(msg.register, 0x2c);
        assert_eq!(&msg.payload[..], &[0x00]);
        assert!(msg.is_request());
    }

    #[test]
    fn test_start_sequence_encoding() {
        let encoded = start_sequence([0, 0, 0, 0, 0, 0]);
        assert_eq!(
            encoded,
            [
                0xf2, 0x0a, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xfd, 0xf6,
                0x04, 0x00, 0xaa, 0x00, 0xa4,
            ]
        );
    }

    #[test]
    fn test_start_carries_mac() {
        let msg = start([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert_eq!(msg.register, REGISTER_START);
        assert_eq!(&msg.payload[..], &[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_response_to_flips_command() {
        let request = PhevMessage::new(0x4e, Direction::Request, 0x01, vec![1, 2, 3]);
        let reply = response_to(&request);

        assert_eq!(reply.command, 0xe4);
        assert_eq!(reply.direction, Direction::Response);
        assert_eq!(reply.register, 0x01);
        assert_eq!(&reply.payload[..], &[0x00]);
    }

    #[test]
    fn test_command_with_payload() {
        let msg = command(0x0a, vec![0x01, 0x02]);
        assert_eq!(msg.command, SEND_CMD);
        assert_eq!(msg.register, 0x0a);
        assert_eq!(&msg.payload[..], &[0x01, 0x02]);
    }
}
