//! Component C — the inode layer: canonical paths, directory listings and
//! rename, all layered over [`MetadataStore`] batches.

use std::sync::Arc;

use agentfs_metadata::{Batch, MetadataStore, Precondition, ScanPage};
use agentfs_std::time::{utc_now, UtcDateTime};
use agentfs_std::{AgentFsError, ContentHash, InodeId, Result, VersionId, ZoneId};
use serde::{Deserialize, Serialize};

/// What kind of filesystem object an inode represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    /// A regular file with content.
    File,
    /// A directory; its children are discovered by prefix scan, not stored.
    Dir,
    /// A symbolic link to another path.
    Symlink,
}

/// The full record stored for an inode (spec §"Entities" — Inode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inode {
    /// Monotonic, per-zone unique identifier.
    pub id: InodeId,
    /// Canonical, normalized path. Unique per `(zone, path)` while active.
    pub path: String,
    /// Parent inode id; `None` only for the zone root.
    pub parent_id: Option<InodeId>,
    /// File, directory or symlink.
    pub kind: Kind,
    /// Size in bytes; meaningful only for files.
    pub size: u64,
    /// Current content hash, for files.
    pub content_hash: Option<ContentHash>,
    /// Current version pointer, for files.
    pub current_version: Option<VersionId>,
    /// Subject that owns this inode.
    pub owner_subject: String,
    /// Creation timestamp.
    pub created_at: UtcDateTime,
    /// Last modification timestamp.
    pub modified_at: UtcDateTime,
    /// Last access timestamp.
    pub accessed_at: UtcDateTime,
    /// Soft-delete flag.
    pub deleted: bool,
    /// When the inode was soft-deleted, if at all.
    pub deleted_at: Option<UtcDateTime>,
    /// Opaque, caller-defined metadata.
    pub user_meta: serde_json::Map<String, serde_json::Value>,
}

/// A partial update applied by [`InodeStore::update_meta`].
#[derive(Debug, Clone, Default)]
pub struct MetaPatch {
    /// New size, if the write changed it.
    pub size: Option<u64>,
    /// New content hash, if the write changed it.
    pub content_hash: Option<ContentHash>,
    /// New current version, if the write changed it.
    pub current_version: Option<VersionId>,
    /// Merged into `user_meta` (keys with `Value::Null` are removed).
    pub user_meta_patch: serde_json::Map<String, serde_json::Value>,
}

/// Normalizes a path: collapses `.`/`..`/duplicate separators, strips a
/// trailing separator (except for the root), and ensures a leading `/`.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(AgentFsError::InvalidArgument("empty path".into()));
    }
    let mut components: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if components.pop().is_none() {
                    return Err(AgentFsError::InvalidArgument(format!(
                        "path escapes root: {path}"
                    )));
                }
            }
            other => components.push(other),
        }
    }
    if components.is_empty() {
        return Ok("/".to_string());
    }
    Ok(format!("/{}", components.join("/")))
}

fn path_key(zone: &ZoneId, path: &str) -> Vec<u8> {
    format!("inode/by-path/{}{}", zone.0, path).into_bytes()
}

fn record_key(zone: &ZoneId, id: InodeId) -> Vec<u8> {
    format!("inode/{}/{}", zone.0, id.0).into_bytes()
}

fn counter_key(zone: &ZoneId) -> Vec<u8> {
    format!("inode/counter/{}", zone.0).into_bytes()
}

/// A page of directory children.
pub struct ChildPage {
    /// The children found, in path order.
    pub entries: Vec<Inode>,
    /// Cursor to pass back in as `after_key` for the next page.
    pub next_cursor: Option<Vec<u8>>,
}

/// Component C: the inode layer, generic over any [`MetadataStore`].
pub struct InodeStore<S> {
    store: Arc<S>,
}

impl<S: MetadataStore> InodeStore<S> {
    /// Wraps a metadata store with the inode layer.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn next_inode_id(&self, zone: &ZoneId) -> Result<InodeId> {
        loop {
            let current = self.store.get(&counter_key(zone))?;
            let next = match &current {
                Some(bytes) => {
                    let n: u64 = std::str::from_utf8(bytes)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| AgentFsError::Corrupt("inode counter".into()))?;
                    n + 1
                }
                None => 1,
            };
            let precondition = match &current {
                Some(v) => Precondition::ValueEquals(v.clone()),
                None => Precondition::Absent,
            };
            let batch = Batch::new().put_if(
                counter_key(zone),
                next.to_string().into_bytes(),
                precondition,
            );
            match self.store.batch(zone, batch) {
                Ok(_) => return Ok(InodeId(next)),
                Err(AgentFsError::CasFailure(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Looks up the active inode at `path`, if any.
    pub fn lookup(&self, zone: &ZoneId, path: &str) -> Result<Option<Inode>> {
        let path = normalize_path(path)?;
        let Some(id_bytes) = self.store.get(&path_key(zone, &path))? else {
            return Ok(None);
        };
        let id: u64 = std::str::from_utf8(&id_bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| AgentFsError::Corrupt(format!("inode pointer at {path}")))?;
        self.load(zone, InodeId(id))
    }

    /// Loads an inode record directly by id.
    pub fn load(&self, zone: &ZoneId, id: InodeId) -> Result<Option<Inode>> {
        let Some(bytes) = self.store.get(&record_key(zone, id))? else {
            return Ok(None);
        };
        let inode: Inode = serde_json::from_slice(&bytes)
            .map_err(|e| AgentFsError::Corrupt(format!("inode {id}: {e}")))?;
        Ok(Some(inode))
    }

    /// Creates a new inode at `path`. Fails with `AlreadyExists` if the path
    /// already has an active inode.
    pub fn create(
        &self,
        zone: &ZoneId,
        path: &str,
        kind: Kind,
        owner_subject: &str,
    ) -> Result<Inode> {
        let path = normalize_path(path)?;
        if self.lookup(zone, &path)?.is_some() {
            return Err(AgentFsError::AlreadyExists(format!(
                "inode already exists at {path}"
            )));
        }
        let parent_id = self.parent_of(zone, &path)?;
        let id = self.next_inode_id(zone)?;
        let now = utc_now();
        let inode = Inode {
            id,
            path: path.clone(),
            parent_id,
            kind,
            size: 0,
            content_hash: None,
            current_version: None,
            owner_subject: owner_subject.to_string(),
            created_at: now,
            modified_at: now,
            accessed_at: now,
            deleted: false,
            deleted_at: None,
            user_meta: serde_json::Map::new(),
        };
        let record = serde_json::to_vec(&inode)
            .map_err(|e| AgentFsError::InvalidArgument(e.to_string()))?;
        let batch = Batch::new()
            .put_if(path_key(zone, &path), id.0.to_string().into_bytes(), Precondition::Absent)
            .put_if(record_key(zone, id), record, Precondition::Absent);
        self.store.batch(zone, batch)?;
        Ok(inode)
    }

    fn parent_of(&self, zone: &ZoneId, path: &str) -> Result<Option<InodeId>> {
        if path == "/" {
            return Ok(None);
        }
        let parent_path = match path.rsplit_once('/') {
            Some(("", _)) => "/".to_string(),
            Some((head, _)) => head.to_string(),
            None => "/".to_string(),
        };
        match self.lookup(zone, &parent_path)? {
            Some(parent) => Ok(Some(parent.id)),
            None => Err(AgentFsError::NotFound(format!(
                "parent directory {parent_path} does not exist"
            ))),
        }
    }

    /// Applies a metadata patch to an inode (content hash, size, version
    /// pointer, user metadata). Bumps `modified_at`.
    pub fn update_meta(&self, zone: &ZoneId, id: InodeId, patch: MetaPatch) -> Result<Inode> {
        self.mutate(zone, id, |inode| {
            if let Some(size) = patch.size {
                inode.size = size;
            }
            if let Some(hash) = patch.content_hash {
                inode.content_hash = Some(hash);
            }
            if let Some(version) = patch.current_version {
                inode.current_version = Some(version);
            }
            for (k, v) in patch.user_meta_patch {
                if v.is_null() {
                    inode.user_meta.remove(&k);
                } else {
                    inode.user_meta.insert(k, v);
                }
            }
            inode.modified_at = utc_now();
        })
    }

    /// Marks an inode as soft-deleted. The path key is removed so the path
    /// is immediately free for reuse; the record is kept (tombstoned) for
    /// version-history and audit purposes until a GC sweep reclaims it.
    pub fn soft_delete(&self, zone: &ZoneId, id: InodeId) -> Result<Inode> {
        let Some(before) = self.load(zone, id)? else {
            return Err(AgentFsError::NotFound(format!("inode {id}")));
        };
        let mut after = before.clone();
        after.deleted = true;
        after.deleted_at = Some(utc_now());
        let before_bytes = serde_json::to_vec(&before).expect("inode serializes");
        let after_bytes =
            serde_json::to_vec(&after).map_err(|e| AgentFsError::InvalidArgument(e.to_string()))?;
        let batch = Batch::new()
            .delete_if(path_key(zone, &before.path), Precondition::Exists)
            .put_if(
                record_key(zone, id),
                after_bytes,
                Precondition::ValueEquals(before_bytes),
            );
        self.store.batch(zone, batch)?;
        Ok(after)
    }

    /// Renames an inode to `new_path` via an atomic CAS batch. Fails with
    /// `AlreadyExists` if an active inode already sits at `new_path`.
    pub fn rename(&self, zone: &ZoneId, id: InodeId, new_path: &str) -> Result<Inode> {
        let new_path = normalize_path(new_path)?;
        let Some(before) = self.load(zone, id)? else {
            return Err(AgentFsError::NotFound(format!("inode {id}")));
        };
        if before.path == new_path {
            return Ok(before);
        }
        if self.lookup(zone, &new_path)?.is_some() {
            return Err(AgentFsError::AlreadyExists(format!(
                "inode already exists at {new_path}"
            )));
        }
        let new_parent_id = self.parent_of(zone, &new_path)?;
        let mut after = before.clone();
        after.path = new_path.clone();
        after.parent_id = new_parent_id;
        after.modified_at = utc_now();
        let before_bytes = serde_json::to_vec(&before).expect("inode serializes");
        let after_bytes =
            serde_json::to_vec(&after).map_err(|e| AgentFsError::InvalidArgument(e.to_string()))?;
        let batch = Batch::new()
            .delete_if(path_key(zone, &before.path), Precondition::Exists)
            .put_if(
                path_key(zone, &new_path),
                id.0.to_string().into_bytes(),
                Precondition::Absent,
            )
            .put_if(
                record_key(zone, id),
                after_bytes,
                Precondition::ValueEquals(before_bytes),
            );
        self.store.batch(zone, batch)?;
        Ok(after)
    }

    /// Lists the direct children of `parent_path`, bounded by `limit`.
    pub fn list_children(
        &self,
        zone: &ZoneId,
        parent_path: &str,
        after_key: Option<Vec<u8>>,
        limit: usize,
    ) -> Result<ChildPage> {
        let parent_path = normalize_path(&parent_path.to_string())?;
        let prefix = if parent_path == "/" {
            "inode/by-path/".to_string() + &zone.0 + "/"
        } else {
            format!("inode/by-path/{}{}/", zone.0, parent_path)
        };
        let ScanPage {
            entries,
            next_cursor,
        } = self
            .store
            .prefix_scan(prefix.as_bytes(), limit, after_key.as_deref())?;

        let mut children = Vec::with_capacity(entries.len());
        for (key, id_bytes) in entries {
            let rest = &key[prefix.len()..];
            // Only keys with no further `/` are direct children.
            if rest.contains(&b'/') {
                continue;
            }
            let id: u64 = std::str::from_utf8(&id_bytes)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| AgentFsError::Corrupt("inode pointer".into()))?;
            if let Some(inode) = self.load(zone, InodeId(id))? {
                if !inode.deleted {
                    children.push(inode);
                }
            }
        }
        Ok(ChildPage {
            entries: children,
            next_cursor,
        })
    }

    fn mutate(
        &self,
        zone: &ZoneId,
        id: InodeId,
        f: impl FnOnce(&mut Inode),
    ) -> Result<Inode> {
        let Some(before) = self.load(zone, id)? else {
            return Err(AgentFsError::NotFound(format!("inode {id}")));
        };
        let mut after = before.clone();
        f(&mut after);
        let before_bytes = serde_json::to_vec(&before).expect("inode serializes");
        let after_bytes =
            serde_json::to_vec(&after).map_err(|e| AgentFsError::InvalidArgument(e.to_string()))?;
        let batch = Batch::new().put_if(
            record_key(zone, id),
            after_bytes,
            Precondition::ValueEquals(before_bytes),
        );
        self.store.batch(zone, batch)?;
        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentfs_metadata::InMemoryMetadataStore;

    fn zone() -> ZoneId {
        ZoneId("zone-a".into())
    }

    fn store() -> InodeStore<InMemoryMetadataStore> {
        InodeStore::new(Arc::new(InMemoryMetadataStore::new()))
    }

    #[test]
    fn normalizes_dot_and_dotdot() {
        assert_eq!(normalize_path("/a/./b/../c").unwrap(), "/a/c");
        assert_eq!(normalize_path("/a//b/").unwrap(), "/a/b");
        assert_eq!(normalize_path("/").unwrap(), "/");
    }

    #[test]
    fn dotdot_past_root_is_invalid() {
        assert!(normalize_path("/../x").is_err());
    }

    #[test]
    fn create_and_lookup_roundtrip() {
        let inodes = store();
        let zone = zone();
        inodes.create(&zone, "/", Kind::Dir, "root").ok();
        let inode = inodes.create(&zone, "/docs", Kind::Dir, "alice").unwrap();
        assert_eq!(inode.path, "/docs");
        let found = inodes.lookup(&zone, "/docs").unwrap().unwrap();
        assert_eq!(found.id, inode.id);
    }

    #[test]
    fn create_requires_existing_parent() {
        let inodes = store();
        let zone = zone();
        let err = inodes
            .create(&zone, "/a/b", Kind::File, "alice")
            .unwrap_err();
        assert_eq!(err.tag(), "not_found");
    }

    #[test]
    fn create_duplicate_path_fails() {
        let inodes = store();
        let zone = zone();
        inodes.create(&zone, "/a", Kind::File, "alice").unwrap();
        let err = inodes.create(&zone, "/a", Kind::File, "alice").unwrap_err();
        assert_eq!(err.tag(), "already_exists");
    }

    #[test]
    fn rename_moves_path_and_frees_old() {
        let inodes = store();
        let zone = zone();
        let inode = inodes.create(&zone, "/a", Kind::File, "alice").unwrap();
        inodes.rename(&zone, inode.id, "/b").unwrap();
        assert!(inodes.lookup(&zone, "/a").unwrap().is_none());
        assert!(inodes.lookup(&zone, "/b").unwrap().is_some());
    }

    #[test]
    fn rename_onto_existing_fails() {
        let inodes = store();
        let zone = zone();
        let a = inodes.create(&zone, "/a", Kind::File, "alice").unwrap();
        inodes.create(&zone, "/b", Kind::File, "alice").unwrap();
        let err = inodes.rename(&zone, a.id, "/b").unwrap_err();
        assert_eq!(err.tag(), "already_exists");
    }

    #[test]
    fn soft_delete_frees_path_but_keeps_record() {
        let inodes = store();
        let zone = zone();
        let inode = inodes.create(&zone, "/a", Kind::File, "alice").unwrap();
        inodes.soft_delete(&zone, inode.id).unwrap();
        assert!(inodes.lookup(&zone, "/a").unwrap().is_none());
        let record = inodes.load(&zone, inode.id).unwrap().unwrap();
        assert!(record.deleted);
    }

    #[test]
    fn list_children_excludes_grandchildren_and_deleted() {
        let inodes = store();
        let zone = zone();
        inodes.create(&zone, "/dir", Kind::Dir, "alice").unwrap();
        let a = inodes.create(&zone, "/dir/a", Kind::File, "alice").unwrap();
        inodes.create(&zone, "/dir/b", Kind::File, "alice").unwrap();
        inodes
            .create(&zone, "/dir/b/nested", Kind::File, "alice")
            .unwrap();
        inodes.soft_delete(&zone, a.id).unwrap();

        let page = inodes.list_children(&zone, "/dir", None, 100).unwrap();
        let names: Vec<_> = page.entries.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(names, vec!["/dir/b"]);
    }
}
