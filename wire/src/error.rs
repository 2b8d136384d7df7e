//! Error types for header framing.

use std::fmt;

use buffer::BufferError;
use thiserror::Error;

/// Result type for wire framing operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while packing or unpacking message headers and frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum WireError {
    /// Protocol version outside the compatibility window.
    #[error("unsupported protocol version 0x{found:04X}")]
    UnsupportedVersion { found: u16 },

    /// A field was short or invalid while unpacking.
    #[error("malformed frame: {0}")]
    Malformed(#[from] BufferError),

    /// Frame length exceeds the configured maximum.
    #[error("frame of {len} bytes exceeds the {limit} byte maximum")]
    OversizeMessage { len: usize, limit: usize },

    /// A configured header limit was exceeded.
    #[error("{kind} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// Origin address record carried an unknown or version-gated family.
    #[error("invalid address family {family}")]
    InvalidAddressFamily { family: u16 },
}

/// Specific header limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    ReturnItems,
    NodelistBytes,
    AliasBytes,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReturnItems => "return items",
            Self::NodelistBytes => "node list bytes",
            Self::AliasBytes => "alias address bytes",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_version_display_is_hex() {
        let err = WireError::UnsupportedVersion { found: 0x2400 };
        assert!(err.to_string().contains("0x2400"));
    }

    #[test]
    fn limits_exceeded_display() {
        let err = WireError::LimitsExceeded {
            kind: LimitKind::ReturnItems,
            limit: 4,
            actual: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("return items"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn buffer_error_converts() {
        let err: WireError = BufferError::EndOfBuffer {
            requested: 2,
            available: 0,
        }
        .into();
        assert!(matches!(err, WireError::Malformed(_)));
        assert!(err.to_string().starts_with("malformed frame"));
    }

    #[test]
    fn oversize_display() {
        let err = WireError::OversizeMessage {
            len: 2048,
            limit: 1024,
        };
        assert!(err.to_string().contains("2048"));
    }
}
