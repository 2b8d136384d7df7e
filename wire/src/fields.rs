//! Which optional header fields exist on the wire for each protocol generation.

use crate::error::WireResult;
use crate::version::{select, ProtocolVersion};

/// The header field set of one protocol generation.
///
/// Each newer set is a strict superset of the older ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSet {
    /// First version carrying this field set.
    pub since: ProtocolVersion,
    /// Forwarding block carries the fan-out tree depth.
    pub forward_tree_depth: bool,
    /// Forwarding block carries the aliased-address blob when `PACK_ADDRS` is set.
    pub forward_alias_addrs: bool,
    /// Origin address may be IPv6.
    pub origin_ipv6: bool,
}

/// Field sets for every supported generation, newest first.
pub const FIELD_SETS: [(ProtocolVersion, FieldSet); 4] = [
    (
        ProtocolVersion::GEN_40,
        FieldSet {
            since: ProtocolVersion::GEN_40,
            forward_tree_depth: true,
            forward_alias_addrs: true,
            origin_ipv6: true,
        },
    ),
    (
        ProtocolVersion::GEN_39,
        FieldSet {
            since: ProtocolVersion::GEN_39,
            forward_tree_depth: true,
            forward_alias_addrs: true,
            origin_ipv6: false,
        },
    ),
    (
        ProtocolVersion::GEN_38,
        FieldSet {
            since: ProtocolVersion::GEN_38,
            forward_tree_depth: true,
            forward_alias_addrs: false,
            origin_ipv6: false,
        },
    ),
    (
        ProtocolVersion::GEN_37,
        FieldSet {
            since: ProtocolVersion::GEN_37,
            forward_tree_depth: false,
            forward_alias_addrs: false,
            origin_ipv6: false,
        },
    ),
];

impl FieldSet {
    /// Returns the field set that applies to `version`.
    pub fn for_version(version: ProtocolVersion) -> WireResult<&'static Self> {
        select(version, &FIELD_SETS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireError;

    #[test]
    fn every_window_version_has_its_own_set() {
        for version in ProtocolVersion::WINDOW {
            let fields = FieldSet::for_version(version).unwrap();
            assert_eq!(fields.since, version);
        }
    }

    #[test]
    fn sets_only_grow() {
        for pair in FIELD_SETS.windows(2) {
            let (newer, older) = (pair[0].1, pair[1].1);
            assert!(newer.since > older.since);
            assert!(newer.forward_tree_depth >= older.forward_tree_depth);
            assert!(newer.forward_alias_addrs >= older.forward_alias_addrs);
            assert!(newer.origin_ipv6 >= older.origin_ipv6);
        }
    }

    #[test]
    fn table_keys_match_since() {
        for (key, fields) in FIELD_SETS {
            assert_eq!(key, fields.since);
        }
    }

    #[test]
    fn raw_value_between_generations_has_no_set() {
        let between = ProtocolVersion::from_raw(ProtocolVersion::GEN_38.raw() + 5);
        assert_eq!(
            FieldSet::for_version(between),
            Err(WireError::UnsupportedVersion { found: 0x2605 })
        );
    }

    #[test]
    fn unsupported_version_has_no_set() {
        assert!(FieldSet::for_version(ProtocolVersion::from_raw(0x2900)).is_err());
    }
}
