//! Error types for byte buffer operations.

use thiserror::Error;

/// Result type for byte buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur while packing into or unpacking from a [`ByteBuffer`].
///
/// Every read error leaves the buffer cursors exactly where they were before
/// the failing call.
///
/// [`ByteBuffer`]: crate::ByteBuffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BufferError {
    /// Attempted to read past the write cursor.
    #[error("attempted to read {requested} bytes but only {available} bytes available")]
    EndOfBuffer {
        /// Number of bytes requested.
        requested: usize,
        /// Number of unread bytes.
        available: usize,
    },

    /// Growing the buffer would exceed [`MAX_BUFFER_BYTES`](crate::MAX_BUFFER_BYTES).
    #[error("attempted to write {attempted} bytes but only {capacity} bytes of capacity remain")]
    BufferOverflow {
        /// Number of bytes the write needed.
        attempted: usize,
        /// Bytes still available before the hard ceiling.
        capacity: usize,
    },

    /// A length or count does not fit its 32-bit wire field.
    #[error("length {length} does not fit a 32-bit length prefix")]
    LengthOverflow {
        /// The offending length.
        length: usize,
    },

    /// A length-prefixed string is not valid UTF-8.
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 {
        /// Offset of the string bytes (after the prefix).
        offset: usize,
    },

    /// A checkpoint or seek target does not lie inside the written bytes.
    #[error("offset {offset} is outside the written region ({len} bytes)")]
    InvalidOffset {
        /// Requested offset.
        offset: usize,
        /// Current write cursor.
        len: usize,
    },
}
