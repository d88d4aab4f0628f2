//! Shared primitives for the `agentfs` workspace: a stable error taxonomy,
//! identifier newtypes, time helpers and content hashing.
//!
//! Mirrors the role `tinymist-std` plays for the teacher: every other crate
//! in this workspace depends on this one and nothing else depends on them.

#![deny(missing_docs)]

pub mod error;
pub mod hash;
pub mod ids;
pub mod time;

pub use error::{AgentFsError, Result, WithLoc};
pub use hash::ContentHash;
pub use ids::{InodeId, Revision, VersionId, VersionToken, ZoneId};
