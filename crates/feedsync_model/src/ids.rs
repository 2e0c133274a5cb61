//! Entity identifiers and versions.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an entity.
///
/// Entity IDs are strings that are:
/// - Unique within their entity kind across every storage tier
/// - Immutable once assigned
/// - Never reused once tombstoned
///
/// Fresh IDs are UUID v4 strings; follow edges derive theirs from the
/// composite `(follower, followee)` key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier string.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if no identifier has been assigned yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Per-entity version.
///
/// Versions are non-decreasing per entity ID across tiers. Local writes stamp
/// the local clock in milliseconds, bumped past the previous version when the
/// clock has not advanced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    /// The version of an entity that has never been written.
    pub const ZERO: Version = Version(0);

    /// Returns the raw counter.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the version a new write should carry.
    ///
    /// The result is the later of `now` and one past `self`, so versions
    /// never regress.
    #[must_use]
    pub fn next(self, now: u64) -> Version {
        Version(now.max(self.0.saturating_add(1)))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unique() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
        assert!(!id1.is_empty());
    }

    #[test]
    fn default_is_empty() {
        assert!(EntityId::default().is_empty());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = EntityId::from("p1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1\"");
        let back: EntityId = serde_json::from_str("\"p1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn version_next_uses_clock_when_ahead() {
        assert_eq!(Version(4).next(1_000), Version(1_000));
    }

    #[test]
    fn version_next_never_regresses() {
        assert_eq!(Version(5_000).next(1_000), Version(5_001));
        assert_eq!(Version(7).next(7), Version(8));
    }
}
