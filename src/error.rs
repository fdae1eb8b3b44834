//! Error types for phevlink.

use thiserror::Error;

/// Main error type for all pipe-level operations.
#[derive(Debug, Error)]
pub enum PhevError {
    /// I/O error from the underlying transport.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame-level decode failure that was not recoverable.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The car never acknowledged the start message.
    #[error("handshake not acknowledged after {attempts} attempts")]
    HandshakeExhausted { attempts: u32 },

    /// Event handler table is full.
    #[error("event handler table full (max {max})")]
    HandlerCapacity { max: usize },

    /// Transport closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Frame-level decode errors.
///
/// `IncompleteFrame` is not a protocol violation: the caller should buffer
/// more bytes and retry. The other variants are fatal for the frame they
/// occurred on, never for the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer ends before the frame it declares.
    #[error("incomplete frame: need {needed} bytes, have {available}")]
    IncompleteFrame { needed: usize, available: usize },

    /// The additive checksum did not match.
    #[error("checksum mismatch: computed {computed:#04x}, frame carries {found:#04x}")]
    ChecksumMismatch { computed: u8, found: u8 },

    /// Neither classic nor scrambled framing accepted the bytes.
    #[error("unrecognized framing")]
    UnrecognizedFraming {
        /// Length of the rejected frame when its classic length field still
        /// delimited it; callers may skip this many bytes and resume.
        skip: Option<usize>,
    },
}

impl DecodeError {
    /// Whether the caller should wait for more bytes and retry.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::IncompleteFrame { .. })
    }

    /// Bytes a caller can skip to move past the rejected frame, when its
    /// boundary was still detectable.
    #[inline]
    pub fn skip_len(&self) -> Option<usize> {
        match self {
            DecodeError::UnrecognizedFraming { skip } => *skip,
            _ => None,
        }
    }
}

/// Result type alias using PhevError.
pub type Result<T> = std::result::Result<T, PhevError>;
