//! Error types for codec operations.

use std::fmt;

use buffer::BufferError;
use thiserror::Error;
use wire::{MessageType, WireError};

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while dispatching, encoding or decoding messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Header framing error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Body field was short or invalid.
    #[error("malformed body: {0}")]
    Buffer(#[from] BufferError),

    /// No codec is registered for the message type.
    #[error("no codec registered for message type {msg_type}")]
    UnknownMessageType { msg_type: MessageType },

    /// A codec is already registered for the message type.
    #[error("message type {msg_type} is already registered")]
    DuplicateRegistration { msg_type: MessageType },

    /// The payload handed to a codec is not the type it encodes.
    #[error("payload for message type {msg_type} is not a {expected}")]
    PayloadTypeMismatch {
        msg_type: MessageType,
        expected: &'static str,
    },

    /// The body did not span exactly the declared number of bytes.
    #[error("message type {msg_type} declared a {declared} byte body, found {actual}")]
    BodyLengthMismatch {
        msg_type: MessageType,
        declared: usize,
        actual: usize,
    },

    /// Bytes were left in a frame after its message.
    #[error("{remaining} trailing bytes after message in frame")]
    TrailingFrameBytes { remaining: usize },

    /// The auth plugin refused the credential.
    #[error("credential rejected: {reason}")]
    AuthRejected { reason: String },

    /// A codec limit was exceeded.
    #[error("{kind} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// Error raised by a registered message codec.
    #[error("{0}")]
    Custom(String),
}

impl CodecError {
    /// Creates a [`CodecError::Custom`] from any displayable message.
    pub fn custom(message: impl fmt::Display) -> Self {
        Self::Custom(message.to_string())
    }
}

/// Specific codec limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    ListElements,
    BodyBytes,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListElements => "list elements",
            Self::BodyBytes => "body bytes",
        };
        write!(f, "{name}")
    }
}
