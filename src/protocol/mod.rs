//! Wire protocol: message model, codec, obfuscation, splitting, builders.

pub mod commands;
pub mod message;
pub mod scramble;
pub mod splitter;
pub mod wire;

pub use message::{Direction, PhevMessage, MAX_PAYLOAD};
pub use splitter::{FrameSplitter, Split, Splitter};
pub use wire::{Decoded, Framing, MIN_FRAME};
