//! Limits for message body decoding.

/// Codec-specific limits enforced while decoding message bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecLimits {
    /// Maximum element count of one packed list.
    pub max_list_len: usize,
    /// Maximum size of one message body in bytes.
    pub max_body_bytes: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_list_len: 1024 * 1024,
            max_body_bytes: 512 * 1024 * 1024,
        }
    }
}

impl CodecLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_list_len: 64,
            max_body_bytes: 4096,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_list_len: usize::MAX,
            max_body_bytes: usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testing_limits_smaller() {
        let test_limits = CodecLimits::for_testing();
        let default_limits = CodecLimits::default();
        assert!(test_limits.max_list_len < default_limits.max_list_len);
        assert!(test_limits.max_body_bytes < default_limits.max_body_bytes);
    }

    #[test]
    fn unlimited_limits() {
        let limits = CodecLimits::unlimited();
        assert_eq!(limits.max_list_len, usize::MAX);
        assert_eq!(limits.max_body_bytes, usize::MAX);
    }
}
