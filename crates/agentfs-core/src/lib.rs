//! Components C through F: the inode layer, content-addressed blob store,
//! per-path version history, and the mount table / path router that sit
//! between the VFS facade and the raw [`agentfs_metadata`] /
//! [`agentfs_blob`] primitives.

#![deny(missing_docs)]

pub mod content;
pub mod inode;
pub mod mount;
pub mod version;

pub use content::ContentStore;
pub use inode::{normalize_path, ChildPage, Inode, InodeStore, Kind, MetaPatch};
pub use mount::{Mount, MountFlags, MountTable, ObjectType, Resolution};
pub use version::{Version, VersionPage, VersionStore};
