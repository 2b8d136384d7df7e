//! Transport configuration.

use std::ops::RangeInclusive;
use std::time::Duration;

use wire::Limits;

/// Tunables for the transport primitives.
///
/// Passed explicitly to every call; there is no process-wide transport state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransportConfig {
    /// Largest frame body accepted by `recv_framed` or sent by `send_framed`.
    pub max_frame_bytes: usize,

    /// Extra connect attempts after a refused or timed-out connect.
    pub connect_retries: u32,

    /// Local ports tried when a connect is retried from a fresh port.
    pub ephemeral_ports: RangeInclusive<u16>,

    /// Pause after a send or receive would block.
    pub would_block_backoff: Duration,

    /// Longest single poll; a wait is split into quanta of at most this long.
    pub poll_quantum: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: Limits::default().max_frame_bytes,
            connect_retries: 3,
            ephemeral_ports: 10001..=65535,
            would_block_backoff: Duration::from_millis(10),
            poll_quantum: Duration::from_secs(1),
        }
    }
}

impl TransportConfig {
    /// Creates a configuration suitable for testing with smaller values.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_frame_bytes: Limits::for_testing().max_frame_bytes,
            connect_retries: 1,
            would_block_backoff: Duration::from_millis(1),
            poll_quantum: Duration::from_millis(20),
            ..Self::default()
        }
    }

    /// Frame limits matching `max_frame_bytes`.
    #[must_use]
    pub fn frame_limits(&self) -> Limits {
        Limits {
            max_frame_bytes: self.max_frame_bytes,
            ..Limits::default()
        }
    }
}
