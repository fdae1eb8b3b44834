//! Pluggable pipeline stages.
//!
//! The pipe itself only orchestrates: what gets acknowledged and how frames
//! are put on the wire are decisions delegated to these stages, so tests and
//! unusual firmware revisions can swap them out.

use tracing::debug;

use crate::protocol::commands;
use crate::protocol::message::PhevMessage;
use crate::protocol::scramble;
use crate::protocol::wire::{self, Framing};

/// Decides the automatic reply to an inbound request.
pub trait Responder: Send {
    /// `None` means no automatic reply for this message.
    fn respond(&mut self, message: &PhevMessage) -> Option<PhevMessage>;
}

/// Default responder: every inbound request gets the canonical
/// acknowledgement, responses get nothing.
#[derive(Debug, Default)]
pub struct AckResponder;

impl Responder for AckResponder {
    fn respond(&mut self, message: &PhevMessage) -> Option<PhevMessage> {
        message.is_request().then(|| commands::response_to(message))
    }
}

/// Turns outbound messages into wire bytes, tracking per-session framing
/// state learned from inbound traffic.
pub trait Transformer: Send {
    fn encode_outbound(&mut self, message: &PhevMessage) -> Vec<u8>;

    /// Called for every decoded inbound frame.
    fn observe_inbound(&mut self, framing: Framing);

    /// Drop per-session state on disconnect.
    fn reset(&mut self);
}

/// Default transformer: classic framing until the car reveals a session key
/// through a scrambled inbound frame, then scrambled framing with that key.
#[derive(Debug, Default)]
pub struct ScrambleTransformer {
    key: Option<u8>,
}

impl ScrambleTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session key in effect, if one has been observed.
    #[inline]
    pub fn session_key(&self) -> Option<u8> {
        self.key
    }
}

impl Transformer for ScrambleTransformer {
    fn encode_outbound(&mut self, message: &PhevMessage) -> Vec<u8> {
        match self.key {
            Some(key) => scramble::encode_keyed(message, key),
            None => wire::encode(message),
        }
    }

    fn observe_inbound(&mut self, framing: Framing) {
        if let Framing::Scrambled { key } = framing {
            if self.key != Some(key) {
                debug!(key = format_args!("{key:#04x}"), "session key updated");
                self.key = Some(key);
            }
        }
    }

    fn reset(&mut self) {
        self.key = None;
    }
}

/// Callback run before each connection attempt sequence, e.g. to register
/// the client with the car's WiFi stack out of band.
pub type ConnectHook = Box<dyn FnMut() + Send>;
