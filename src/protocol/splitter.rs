//! Frame splitter for concatenated wire traffic.
//!
//! The telemetry module batches several frames into one TCP segment, and a
//! frame can just as easily straddle two segments. [`split`] walks a buffer
//! decoding frame after frame; [`FrameSplitter`] adds the accumulation buffer
//! that carries partial frames across reads.

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::error::DecodeError;

use super::wire::{self, Decoded};

/// Result of splitting a buffer into frames.
#[derive(Debug)]
pub struct Split {
    /// Frames decoded, in buffer order.
    pub frames: Vec<Decoded>,
    /// Bytes consumed from the front of the buffer.
    pub consumed: usize,
    /// First decode error encountered, if any. Frames decoded before and
    /// after a skippable error are still returned.
    pub error: Option<DecodeError>,
}

/// Split `bytes` into as many complete frames as it holds.
///
/// An [`DecodeError::IncompleteFrame`] at the tail is normal: the unconsumed
/// remainder belongs to a frame still in flight and must be kept for the next
/// read. A rejected frame whose length field still delimits it is skipped and
/// decoding resumes at the next boundary; with no detectable boundary the
/// rest of the buffer is consumed and discarded. Either way the first error
/// is surfaced and every decodable frame is returned.
pub fn split(bytes: &[u8]) -> Split {
    let mut frames = Vec::new();
    let mut consumed = 0;
    let mut error = None;

    while consumed < bytes.len() {
        match wire::decode(&bytes[consumed..]) {
            Ok(decoded) => {
                consumed += decoded.consumed;
                frames.push(decoded);
            }
            Err(err) if err.is_incomplete() => break,
            Err(err) => match err.skip_len() {
                Some(skip) => {
                    debug!(offset = consumed, skip, error = %err, "skipping rejected frame");
                    consumed += skip;
                    error.get_or_insert(err);
                }
                None => {
                    debug!(offset = consumed, error = %err, "discarding undecodable remainder");
                    consumed = bytes.len();
                    error.get_or_insert(err);
                    break;
                }
            },
        }
    }

    Split {
        frames,
        consumed,
        error,
    }
}

/// A pipeline stage that turns raw reads into complete frames.
///
/// Injected into the pipe so tests and exotic deployments can substitute
/// their own framing; the default is [`FrameSplitter`].
pub trait Splitter: Send {
    /// Feed freshly read bytes, get back every frame that completed.
    fn push(&mut self, bytes: &[u8]) -> Split;

    /// Drop buffered state, e.g. on disconnect.
    fn reset(&mut self);
}

/// Default [`Splitter`]: accumulates across reads in a `BytesMut`.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: BytesMut,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently buffered waiting for the rest of a frame.
    #[inline]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Splitter for FrameSplitter {
    fn push(&mut self, bytes: &[u8]) -> Split {
        self.buffer.extend_from_slice(bytes);
        let split = split(&self.buffer);
        self.buffer.advance(split.consumed);
        split
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}
