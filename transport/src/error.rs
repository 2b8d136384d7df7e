//! Error types for socket transport.

use std::io;

use thiserror::Error;
use wire::WireError;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by deadline-bounded socket operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The deadline passed before the operation completed.
    #[error("{operation} exceeded {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The peer closed or reset the connection.
    #[error("connection closed by peer during {operation}")]
    ConnectionClosed { operation: &'static str },

    /// Any other socket failure.
    #[error("{operation} failed: {source}")]
    Socket {
        operation: &'static str,
        /// OS error number, if the failure came from the OS.
        code: Option<i32>,
        #[source]
        source: io::Error,
    },

    /// A frame length prefix exceeds the configured maximum.
    #[error("frame of {len} bytes exceeds the {limit} byte maximum")]
    OversizeMessage { len: usize, limit: usize },

    /// A frame prefix could not be encoded or decoded.
    #[error("invalid frame: {0}")]
    Frame(WireError),
}

impl TransportError {
    pub(crate) fn socket(operation: &'static str, source: io::Error) -> Self {
        if is_disconnect(&source) {
            return Self::ConnectionClosed { operation };
        }
        Self::Socket {
            operation,
            code: source.raw_os_error(),
            source,
        }
    }

    pub(crate) fn timeout(operation: &'static str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// OS error number behind a [`TransportError::Socket`].
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Socket { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<WireError> for TransportError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::OversizeMessage { len, limit } => Self::OversizeMessage { len, limit },
            other => Self::Frame(other),
        }
    }
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn broken_pipe_is_connection_closed() {
        let err = TransportError::socket("send", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(
            err,
            TransportError::ConnectionClosed { operation: "send" }
        ));
    }

    #[test]
    fn socket_error_keeps_errno() {
        let err = TransportError::socket("connect", io::Error::from_raw_os_error(111));
        assert_eq!(err.code(), Some(111));
        assert!(err.to_string().starts_with("connect failed"));
    }

    #[test]
    fn timeout_display() {
        let err = TransportError::timeout("recv", Duration::from_millis(200));
        assert_eq!(err.to_string(), "recv exceeded 200ms");
    }

    #[test]
    fn oversize_wire_error_maps_to_oversize() {
        let err: TransportError = WireError::OversizeMessage { len: 9, limit: 4 }.into();
        assert!(matches!(
            err,
            TransportError::OversizeMessage { len: 9, limit: 4 }
        ));
    }
}
