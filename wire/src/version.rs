//! Protocol versions and the compatibility window.

use std::fmt;

use crate::error::{WireError, WireResult};

/// A negotiated protocol version.
///
/// Versions are ordered; each protocol generation is [`GENERATION_STEP`]
/// apart. A receiver accepts [`CURRENT`] and the three generations before it.
///
/// [`GENERATION_STEP`]: Self::GENERATION_STEP
/// [`CURRENT`]: Self::CURRENT
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtocolVersion(u16);

impl ProtocolVersion {
    /// Distance between two consecutive generations.
    pub const GENERATION_STEP: u16 = 0x0100;

    pub const GEN_37: Self = Self(0x2500);
    pub const GEN_38: Self = Self(0x2600);
    pub const GEN_39: Self = Self(0x2700);
    pub const GEN_40: Self = Self(0x2800);

    /// The version this build speaks natively.
    pub const CURRENT: Self = Self::GEN_40;

    /// Oldest version still accepted.
    pub const MIN_SUPPORTED: Self = Self::GEN_37;

    /// Every accepted generation, newest first.
    pub const WINDOW: [Self; 4] = [Self::GEN_40, Self::GEN_39, Self::GEN_38, Self::GEN_37];

    /// Creates a version from its raw wire value.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw wire value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns `true` if the version is one of the [`WINDOW`] generations.
    ///
    /// Raw values between two generations are not versions and are rejected.
    ///
    /// [`WINDOW`]: Self::WINDOW
    #[must_use]
    pub const fn is_supported(self) -> bool {
        let mut i = 0;
        while i < Self::WINDOW.len() {
            if Self::WINDOW[i].0 == self.0 {
                return true;
            }
            i += 1;
        }
        false
    }

    /// Returns `true` if this version is `other` or newer.
    #[must_use]
    pub const fn at_least(self, other: Self) -> bool {
        self.0 >= other.0
    }

    /// Validates the version against the compatibility window.
    pub fn check(self) -> WireResult<Self> {
        if self.is_supported() {
            Ok(self)
        } else {
            Err(WireError::UnsupportedVersion { found: self.0 })
        }
    }
}

// The window must stay exactly four generations wide.
const _: () = assert!(
    ProtocolVersion::CURRENT.0 - 3 * ProtocolVersion::GENERATION_STEP
        == ProtocolVersion::MIN_SUPPORTED.0
);

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 >> 8, self.0 & 0xFF)
    }
}

/// Picks the entry of a version-gated table that applies to `version`.
///
/// `table` lists `(minimum version, value)` pairs newest first; the first
/// entry whose minimum is not newer than `version` wins. Codec bodies use this
/// instead of open-coding their own `>=` chains.
pub fn select<T>(version: ProtocolVersion, table: &[(ProtocolVersion, T)]) -> WireResult<&T> {
    let version = version.check()?;
    table
        .iter()
        .find(|(since, _)| version >= *since)
        .map(|(_, value)| value)
        .ok_or(WireError::UnsupportedVersion { found: version.0 })
}
