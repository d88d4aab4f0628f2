//! Component F — `MountTable` / `PathRouter`: longest-prefix resolution
//! from a VFS path to the backend and object type that serve it.

use std::sync::Arc;

use agentfs_metadata::{Batch, MetadataStore, Precondition, ScanPage};
use agentfs_std::{AgentFsError, Result, ZoneId};
use serde::{Deserialize, Serialize};

use crate::inode::normalize_path;

/// The policy object type a mount's paths are checked against in ReBAC
/// (spec §4.F): file backends use `file`, SQL-like backends might use
/// `database:table` or `database:row`, etc.
pub type ObjectType = String;

/// Per-mount behavioral flags.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MountFlags {
    /// Mount rejects writes.
    pub read_only: bool,
}

/// A single mount record (spec §3, `Mount`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    /// Canonical path this mount is rooted at.
    pub mount_point: String,
    /// Identifier of the backend instance serving this mount.
    pub backend_id: String,
    /// The ReBAC object type for paths under this mount.
    pub object_type: ObjectType,
    /// The zone this mount belongs to.
    pub zone: ZoneId,
    /// Mount behavior flags.
    pub flags: MountFlags,
}

/// The result of resolving a path against the mount table.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The matched mount record.
    pub mount: Mount,
    /// The path relative to `mount.mount_point`, with no leading separator
    /// (empty string if the path equals the mount point itself).
    pub relative_path: String,
}

fn mount_key(zone: &ZoneId, mount_point: &str) -> Vec<u8> {
    format!("mount/{}{}", zone.0, mount_point).into_bytes()
}

fn mount_prefix(zone: &ZoneId) -> Vec<u8> {
    format!("mount/{}/", zone.0).into_bytes()
}

/// Returns true if `prefix` is a path-separator-respecting prefix of
/// `path`: `prefix` must equal `path`, or `path` must continue with a `/`
/// right after `prefix` (spec §4.F: `/ab` is NOT a prefix of `/abc/x`).
fn is_path_prefix(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    if !path.starts_with(prefix) {
        return false;
    }
    path.len() == prefix.len() || path.as_bytes()[prefix.len()] == b'/'
}

/// Component F, generic over any [`MetadataStore`].
pub struct MountTable<S> {
    store: Arc<S>,
}

impl<S: MetadataStore> MountTable<S> {
    /// Wraps a metadata store with the mount table.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Lists every mount in `zone`, longest mount point first (so callers
    /// that want longest-prefix order for free can just iterate).
    pub fn list_mounts(&self, zone: &ZoneId) -> Result<Vec<Mount>> {
        let prefix = mount_prefix(zone);
        let mut mounts = Vec::new();
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let ScanPage {
                entries,
                next_cursor,
            } = self.store.prefix_scan(&prefix, 256, cursor.as_deref())?;
            for (_, value) in entries {
                let mount: Mount = serde_json::from_slice(&value)
                    .map_err(|e| AgentFsError::Corrupt(format!("mount record: {e}")))?;
                mounts.push(mount);
            }
            cursor = next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        mounts.sort_by(|a, b| b.mount_point.len().cmp(&a.mount_point.len()));
        Ok(mounts)
    }

    /// Adds a mount. Fails with `MountConflict` if the new mount point
    /// overlaps an existing one in any way other than strict parent
    /// containment.
    pub fn add_mount(
        &self,
        zone: &ZoneId,
        mount_point: &str,
        backend_id: &str,
        object_type: ObjectType,
        flags: MountFlags,
    ) -> Result<Mount> {
        let mount_point = normalize_path(mount_point)?;
        for existing in self.list_mounts(zone)? {
            if existing.mount_point == mount_point {
                return Err(AgentFsError::MountConflict(format!(
                    "a mount already exists at {mount_point}"
                )));
            }
            if is_path_prefix(&existing.mount_point, &mount_point)
                || is_path_prefix(&mount_point, &existing.mount_point)
            {
                continue;
            }
            return Err(AgentFsError::MountConflict(format!(
                "{mount_point} overlaps existing mount {}",
                existing.mount_point
            )));
        }

        let mount = Mount {
            mount_point: mount_point.clone(),
            backend_id: backend_id.to_string(),
            object_type,
            zone: zone.clone(),
            flags,
        };
        let record =
            serde_json::to_vec(&mount).map_err(|e| AgentFsError::InvalidArgument(e.to_string()))?;
        let batch = Batch::new().put_if(
            mount_key(zone, &mount_point),
            record,
            Precondition::Absent,
        );
        self.store.batch(zone, batch)?;
        Ok(mount)
    }

    /// Removes the mount at `mount_point`, if any.
    pub fn remove_mount(&self, zone: &ZoneId, mount_point: &str) -> Result<()> {
        let mount_point = normalize_path(mount_point)?;
        let batch = Batch::new().delete(mount_key(zone, &mount_point));
        self.store.batch(zone, batch)?;
        Ok(())
    }

    /// Resolves `path` to the mount that serves it, via longest-prefix
    /// match respecting path-separator boundaries.
    pub fn resolve(&self, zone: &ZoneId, path: &str) -> Result<Resolution> {
        let path = normalize_path(path)?;
        let mounts = self.list_mounts(zone)?;
        let mount = mounts
            .into_iter()
            .find(|m| is_path_prefix(&m.mount_point, &path))
            .ok_or_else(|| AgentFsError::NotFound(format!("no mount covers {path}")))?;

        let relative_path = if mount.mount_point == "/" {
            path.trim_start_matches('/').to_string()
        } else {
            path[mount.mount_point.len()..]
                .trim_start_matches('/')
                .to_string()
        };
        Ok(Resolution {
            mount,
            relative_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentfs_metadata::InMemoryMetadataStore;

    fn zone() -> ZoneId {
        ZoneId::new("zone-a")
    }

    fn table() -> MountTable<InMemoryMetadataStore> {
        MountTable::new(Arc::new(InMemoryMetadataStore::new()))
    }

    #[test]
    fn longest_prefix_wins() {
        let table = table();
        let zone = zone();
        table
            .add_mount(&zone, "/", "root-backend", "file".into(), MountFlags::default())
            .unwrap();
        table
            .add_mount(
                &zone,
                "/data/db",
                "sql-backend",
                "database:table".into(),
                MountFlags::default(),
            )
            .unwrap();

        let file_resolution = table.resolve(&zone, "/data/notes.txt").unwrap();
        assert_eq!(file_resolution.mount.backend_id, "root-backend");

        let db_resolution = table.resolve(&zone, "/data/db/users").unwrap();
        assert_eq!(db_resolution.mount.backend_id, "sql-backend");
        assert_eq!(db_resolution.relative_path, "users");
    }

    #[test]
    fn prefix_respects_separator_boundary() {
        let table = table();
        let zone = zone();
        table
            .add_mount(&zone, "/ab", "backend-a", "file".into(), MountFlags::default())
            .unwrap();

        let err = table.resolve(&zone, "/abc/x").unwrap_err();
        assert_eq!(err.tag(), "not_found");
    }

    #[test]
    fn overlapping_mount_points_conflict() {
        let table = table();
        let zone = zone();
        table
            .add_mount(&zone, "/a/b", "backend-a", "file".into(), MountFlags::default())
            .unwrap();

        let err = table
            .add_mount(&zone, "/a/bc", "backend-b", "file".into(), MountFlags::default())
            .unwrap_err();
        assert_eq!(err.tag(), "mount_conflict");
    }

    #[test]
    fn strict_parent_containment_is_allowed() {
        let table = table();
        let zone = zone();
        table
            .add_mount(&zone, "/a", "backend-a", "file".into(), MountFlags::default())
            .unwrap();
        table
            .add_mount(&zone, "/a/b", "backend-b", "file".into(), MountFlags::default())
            .unwrap();

        let resolution = table.resolve(&zone, "/a/b/c").unwrap();
        assert_eq!(resolution.mount.backend_id, "backend-b");
    }
}
