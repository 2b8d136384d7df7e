//! Configurable limits for bounded decoding.

/// Wire-level limits for frame and header decoding.
///
/// These limits are enforced during decoding to prevent resource exhaustion
/// and keep memory use bounded. Message body limits belong to the codec layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Limits {
    /// Maximum frame body size in bytes.
    pub max_frame_bytes: usize,

    /// Maximum number of return items in one header.
    pub max_return_items: usize,

    /// Maximum length of the forwarding node list in bytes.
    pub max_nodelist_bytes: usize,

    /// Maximum length of the aliased-address blob in bytes.
    pub max_alias_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_bytes: 1024 * 1024 * 1024,

            // One entry per forwarded node; the count is a u16 on the wire.
            max_return_items: u16::MAX as usize,
            max_nodelist_bytes: 1024 * 1024,
            max_alias_bytes: 4 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_frame_bytes: 64 * 1024,
            max_return_items: 16,
            max_nodelist_bytes: 1024,
            max_alias_bytes: 1024,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_frame_bytes: usize::MAX,
            max_return_items: usize::MAX,
            max_nodelist_bytes: usize::MAX,
            max_alias_bytes: usize::MAX,
        }
    }
}
