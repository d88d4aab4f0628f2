//! The facade crate (component M): the path-addressed surface an embedding
//! application calls to read, write and administer a zone, with every
//! operation checked against the cached ReBAC engine from `agentfs-cache`
//! and `agentfs-rebac`.

#![deny(missing_docs)]

mod backup;
mod config;
mod facade;

pub use backup::{ContentRef, ExportedInode, ExportedVersion, ZoneExport, ZoneImportSummary};
pub use config::{AgentFsConfig, CheckBounds, GcConfig, L3RetryConfig};
pub use facade::{Facade, ADMIN, OWNER, READ, WRITE};
