//! Protocol events surfaced to application handlers.
//!
//! Not every frame is interesting; [`classify`] maps the handful of
//! command/register combinations with known meaning onto [`PhevEvent`]
//! variants and leaves the rest to the generic auto-acknowledge path.

use bytes::Bytes;

use crate::protocol::commands::{
    REGISTER_CONFIRM, REGISTER_DISPLAY, REGISTER_ECU_VERSION, REGISTER_MAX_REGISTRATIONS,
    REGISTER_START, REGISTER_VIN, SEND_CMD, START_RESP,
};
use crate::protocol::message::PhevMessage;

/// Length of a vehicle identification number.
pub const VIN_LEN: usize = 17;

/// A decoded protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhevEvent {
    /// The car acknowledged the session start message.
    StartAck { raw: Bytes },
    /// The car acknowledged the registration confirm; the session is live.
    HandshakeAck { raw: Bytes },
    /// The car announced its VIN and registration state.
    VinDiscovered {
        vin: String,
        flags: u8,
        registrations: u8,
        raw: Bytes,
    },
    /// ECU firmware version announcement.
    EcuVersion { version: String, raw: Bytes },
    /// The car is showing its registration prompt on the dash.
    RegistrationDisplay { raw: Bytes },
    /// All of the car's registration slots are taken.
    MaxRegistrationsReached { raw: Bytes },
    /// The car confirmed a registration update.
    RegistrationUpdateAck { raw: Bytes },
}

/// Classify a decoded message into an event, if it is one we recognize.
pub fn classify(message: &PhevMessage) -> Option<PhevEvent> {
    let raw = message.payload.clone();
    match (message.command, message.is_request(), message.register) {
        (START_RESP, false, REGISTER_START) => Some(PhevEvent::StartAck { raw }),
        (SEND_CMD, false, REGISTER_CONFIRM) => Some(PhevEvent::HandshakeAck { raw }),
        (SEND_CMD, true, REGISTER_VIN) => parse_vin(&raw).map(|(vin, flags, registrations)| {
            PhevEvent::VinDiscovered {
                vin,
                flags,
                registrations,
                raw,
            }
        }),
        (SEND_CMD, true, REGISTER_ECU_VERSION) => Some(PhevEvent::EcuVersion {
            version: printable_prefix(&raw),
            raw,
        }),
        (SEND_CMD, true, REGISTER_DISPLAY) => Some(PhevEvent::RegistrationDisplay { raw }),
        (SEND_CMD, true, REGISTER_MAX_REGISTRATIONS) => {
            Some(PhevEvent::MaxRegistrationsReached { raw })
        }
        (SEND_CMD, false, REGISTER_DISPLAY) => Some(PhevEvent::RegistrationUpdateAck { raw }),
        _ => None,
    }
}

/// VIN announcements carry 17 VIN characters, a flag byte and a
/// registration-count byte.
fn parse_vin(payload: &[u8]) -> Option<(String, u8, u8)> {
    if payload.len() < VIN_LEN + 2 {
        return None;
    }
    let vin = String::from_utf8_lossy(&payload[..VIN_LEN]).into_owned();
    Some((vin, payload[VIN_LEN], payload[VIN_LEN + 1]))
}

/// Version payloads are ASCII with trailing padding bytes.
fn printable_prefix(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .position(|b| !b.is_ascii_graphic() && *b != b' ')
        .unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::Direction;

    fn msg(command: u8, direction: Direction, register: u8, payload: Vec<u8>) -> PhevMessage {
        PhevMessage::new(command, direction, register, payload)
    }

    #[test]
    fn test_classify_start_ack() {
        let message = msg(0x2f, Direction::Response, 0x01, vec![0x00]);
        assert!(matches!(
            classify(&message),
            Some(PhevEvent::StartAck { .. })
        ));
    }

    #[test]
    fn test_classify_handshake_ack() {
        let message = msg(0xf6, Direction::Response, 0xaa, vec![0x00]);
        assert!(matches!(
            classify(&message),
            Some(PhevEvent::HandshakeAck { .. })
        ));
    }

    #[test]
    fn test_classify_vin_announcement() {
        let mut payload = b"JMBXDGG2WGZ002035".to_vec();
        payload.push(0x01);
        payload.push(0x02);
        let message = msg(0xf6, Direction::Request, 0x15, payload);

        match classify(&message) {
            Some(PhevEvent::VinDiscovered {
                vin,
                flags,
                registrations,
                ..
            }) => {
                assert_eq!(vin, "JMBXDGG2WGZ002035");
                assert_eq!(flags, 0x01);
                assert_eq!(registrations, 0x02);
            }
            other => panic!("expected VIN event, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_short_vin_payload_is_not_an_event() {
        let message = msg(0xf6, Direction::Request, 0x15, vec![0x00; 10]);
        assert_eq!(classify(&message), None);
    }

    #[test]
    fn test_classify_ecu_version() {
        let mut payload = b"30DKM001".to_vec();
        payload.push(0x00);
        let message = msg(0xf6, Direction::Request, 0xc0, payload);

        match classify(&message) {
            Some(PhevEvent::EcuVersion { version, .. }) => assert_eq!(version, "30DKM001"),
            other => panic!("expected ECU version event, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_registration_events() {
        let display = msg(0xf6, Direction::Request, 0x10, vec![0x01]);
        assert!(matches!(
            classify(&display),
            Some(PhevEvent::RegistrationDisplay { .. })
        ));

        let full = msg(0xf6, Direction::Request, 0x13, vec![0x01]);
        assert!(matches!(
            classify(&full),
            Some(PhevEvent::MaxRegistrationsReached { .. })
        ));

        let update_ack = msg(0xf6, Direction::Response, 0x10, vec![0x00]);
        assert!(matches!(
            classify(&update_ack),
            Some(PhevEvent::RegistrationUpdateAck { .. })
        ));
    }

    #[test]
    fn test_classify_ordinary_register_write_is_not_an_event() {
        let message = msg(0xf6, Direction::Request, 0x1a, vec![0x00; 4]);
        assert_eq!(classify(&message), None);
    }
}
