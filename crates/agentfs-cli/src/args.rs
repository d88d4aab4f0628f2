//! Command-line argument and subcommand definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// A thin command-line surface over the agentfs facade: mount, read/write/
/// list, rebac grant/check, export/import.
#[derive(Debug, Parser)]
#[command(name = "agentfs", author, version, about)]
pub struct CliArguments {
    /// Zone to operate in.
    #[arg(long, default_value = "default")]
    pub zone: String,
    /// Acting subject, as `type:id` (e.g. `user:alice`).
    #[arg(long, default_value = "user:cli")]
    pub subject: String,
    /// JSON snapshot file to load before running and save after, so
    /// invocations chain. Without this, the zone is throwaway and exists
    /// only for this process.
    #[arg(long)]
    pub state: Option<PathBuf>,
    /// TOML configuration file (graph bounds, cache sizing, GC window).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// The operation to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// One VFS or ReBAC operation.
#[derive(Debug, Subcommand)]
#[command(rename_all = "kebab-case")]
pub enum Commands {
    /// Adds a mount.
    Mount {
        /// Path the mount is rooted at.
        mount_point: String,
        /// Identifier of the backend serving this mount.
        backend_id: String,
        /// ReBAC object type for paths under this mount.
        object_type: String,
        /// Rejects writes under this mount.
        #[arg(long)]
        read_only: bool,
    },
    /// Removes a mount.
    Unmount {
        /// Mount point to remove.
        mount_point: String,
    },
    /// Lists mounts visible to the acting subject.
    ListMounts,
    /// Reclaims content blobs past the configured GC grace window.
    Gc,
    /// Reads a file's content to stdout.
    Read {
        /// File path.
        path: String,
    },
    /// Writes a file's content.
    Write {
        /// File path.
        path: String,
        /// Literal content to write.
        #[arg(long)]
        text: Option<String>,
        /// Local file to read content from.
        #[arg(long)]
        from_file: Option<PathBuf>,
    },
    /// Lists a directory's children.
    List {
        /// Directory path.
        path: String,
        /// Maximum entries to return.
        #[arg(long, default_value_t = 256)]
        limit: usize,
    },
    /// Prints a path's inode metadata.
    Stat {
        /// Path to inspect.
        path: String,
    },
    /// Deletes a path.
    Delete {
        /// Path to delete.
        path: String,
    },
    /// Renames a path.
    Rename {
        /// Existing path.
        from: String,
        /// Destination path.
        to: String,
    },
    /// Creates a directory.
    Mkdir {
        /// Directory path.
        path: String,
    },
    /// Lists a file's version history.
    Versions {
        /// File path.
        path: String,
    },
    /// Restores a file to a prior version.
    Restore {
        /// File path.
        path: String,
        /// Version id to restore.
        version: u64,
    },
    /// Streams a file and prints lines matching a regex.
    Grep {
        /// File path.
        path: String,
        /// Regular expression.
        pattern: String,
    },
    /// Grants a ReBAC tuple.
    RebacGrant {
        /// Subject, as `type:id`.
        subject: String,
        /// Relation name.
        relation: String,
        /// Object type.
        object_type: String,
        /// Object id.
        object_id: String,
    },
    /// Revokes a ReBAC tuple.
    RebacRevoke {
        /// Subject, as `type:id`.
        subject: String,
        /// Relation name.
        relation: String,
        /// Object type.
        object_type: String,
        /// Object id.
        object_id: String,
    },
    /// Checks a permission.
    RebacCheck {
        /// Subject, as `type:id`.
        subject: String,
        /// Permission to check.
        permission: String,
        /// Object type.
        object_type: String,
        /// Object id.
        object_id: String,
    },
    /// Lists every subject holding a permission on an object.
    RebacExpand {
        /// Object type.
        object_type: String,
        /// Object id.
        object_id: String,
        /// Permission to expand.
        permission: String,
    },
}
