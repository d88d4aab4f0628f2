//! Shared identifier newtypes used across every component (spec §3).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A tenant boundary and consensus unit (spec GLOSSARY: `Zone`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneId(pub String);

impl ZoneId {
    /// Creates a zone id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A per-zone monotonic counter advanced by every `MetadataStore::batch`
/// commit (spec §4.A) and surfaced in consistency tokens (spec §3,
/// `VersionToken`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl Revision {
    /// The revision before any write has happened in a zone.
    pub const ZERO: Revision = Revision(0);

    /// Returns the next revision in sequence.
    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, monotonic-within-zone token surfaced to clients so they can
/// request at-least-this-revision reads (spec §3, `VersionToken`; §4.H,
/// `ConsistencyLevel::Bounded`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionToken(pub Revision);

impl VersionToken {
    /// Builds a token for a given revision.
    pub fn at(revision: Revision) -> Self {
        Self(revision)
    }
}

/// Monotonic, per-zone inode identifier (spec §3, `Inode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeId(pub u64);

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic, per-path version identifier (spec §3, `Version`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
