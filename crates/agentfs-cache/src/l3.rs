//! Component K — the L3 persistent namespace view: a durable
//! materialization of [`crate::l2::NamespaceView`], stored in
//! [`MetadataStore`] under its own key prefix so it survives a process
//! restart (spec §4.K).

use std::sync::Arc;

use agentfs_core::{Mount, MountFlags};
use agentfs_metadata::{MetadataStore, ScanPage};
use agentfs_rebac::Entity;
use agentfs_std::{AgentFsError, Result, Revision, ZoneId};
use serde::{Deserialize, Serialize};

use crate::l2::NamespaceView;

fn view_key(zone: &ZoneId, subject: &Entity) -> Vec<u8> {
    format!("nsview/{zone}/{}:{}", subject.entity_type, subject.entity_id).into_bytes()
}

fn zone_prefix(zone: &ZoneId) -> Vec<u8> {
    format!("nsview/{zone}/").into_bytes()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMount {
    mount_point: String,
    backend_id: String,
    object_type: String,
    read_only: bool,
}

impl From<&Mount> for StoredMount {
    fn from(m: &Mount) -> Self {
        Self {
            mount_point: m.mount_point.clone(),
            backend_id: m.backend_id.clone(),
            object_type: m.object_type.clone(),
            read_only: m.flags.read_only,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredView {
    subject: Entity,
    zone: ZoneId,
    mounts: Vec<StoredMount>,
    revision: Revision,
}

impl StoredView {
    fn into_namespace_view(self) -> NamespaceView {
        let mounts: Vec<Mount> = self
            .mounts
            .into_iter()
            .map(|m| Mount {
                mount_point: m.mount_point,
                backend_id: m.backend_id,
                object_type: m.object_type,
                zone: self.zone.clone(),
                flags: MountFlags { read_only: m.read_only },
            })
            .collect();
        let prefixes = mounts.iter().map(|m| m.mount_point.clone()).collect();
        NamespaceView {
            mounts,
            prefixes,
            revision: self.revision,
        }
    }
}

/// Component K, generic over any [`MetadataStore`].
pub struct PersistentNamespaceStore<S> {
    store: Arc<S>,
}

impl<S: MetadataStore> PersistentNamespaceStore<S> {
    /// Wraps a metadata store with the persistent namespace view layer.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Loads the persisted view for `(subject, zone)`, if one was ever
    /// stored. The caller (component J's read-through path) is responsible
    /// for comparing `view.revision` against the zone's current revision
    /// and re-deriving if stale (spec §4.K invariant).
    pub fn load(&self, zone: &ZoneId, subject: &Entity) -> Result<Option<NamespaceView>> {
        let Some(bytes) = self.store.get(&view_key(zone, subject))? else {
            return Ok(None);
        };
        let stored: StoredView = serde_json::from_slice(&bytes)
            .map_err(|e| AgentFsError::Corrupt(format!("namespace view: {e}")))?;
        Ok(Some(stored.into_namespace_view()))
    }

    /// Persists `view` for `(subject, zone)`, tagged with `at_revision`.
    pub fn store(&self, zone: &ZoneId, subject: &Entity, view: &NamespaceView, at_revision: Revision) -> Result<()> {
        let stored = StoredView {
            subject: subject.clone(),
            zone: zone.clone(),
            mounts: view.mounts.iter().map(StoredMount::from).collect(),
            revision: at_revision,
        };
        let bytes = serde_json::to_vec(&stored).map_err(|e| AgentFsError::InvalidArgument(e.to_string()))?;
        self.store.put(&view_key(zone, subject), bytes, None)
    }

    /// Deletes every persisted view in `zone` whose subject matches
    /// `predicate` (spec §4.K: `delete_views(predicate)`).
    pub fn delete_views(&self, zone: &ZoneId, predicate: impl Fn(&Entity) -> bool) -> Result<usize> {
        let prefix = zone_prefix(zone);
        let mut deleted = 0;
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let ScanPage { entries, next_cursor } = self.store.prefix_scan(&prefix, 256, cursor.as_deref())?;
            for (key, value) in entries {
                let stored: StoredView = serde_json::from_slice(&value)
                    .map_err(|e| AgentFsError::Corrupt(format!("namespace view: {e}")))?;
                if predicate(&stored.subject) {
                    self.store.delete(&key, None)?;
                    deleted += 1;
                }
            }
            cursor = next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(deleted)
    }

    /// Deletes every persisted view in `zone` (spec §4.K:
    /// `delete_all_views()`, used "on schema-wide changes").
    pub fn delete_all_views(&self, zone: &ZoneId) -> Result<usize> {
        self.delete_views(zone, |_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentfs_metadata::InMemoryMetadataStore;

    fn zone() -> ZoneId {
        ZoneId::new("z")
    }

    fn alice(zone: &ZoneId) -> Entity {
        Entity::new(zone.clone(), "user", "alice")
    }

    fn sample_view(zone: &ZoneId) -> NamespaceView {
        let mount = Mount {
            mount_point: "/".to_string(),
            backend_id: "b".to_string(),
            object_type: "file".to_string(),
            zone: zone.clone(),
            flags: MountFlags::default(),
        };
        NamespaceView {
            prefixes: vec![mount.mount_point.clone()].into_iter().collect(),
            mounts: vec![mount],
            revision: Revision(5),
        }
    }

    #[test]
    fn store_then_load_roundtrips() {
        let store = PersistentNamespaceStore::new(Arc::new(InMemoryMetadataStore::new()));
        let zone = zone();
        let alice = alice(&zone);
        store.store(&zone, &alice, &sample_view(&zone), Revision(5)).unwrap();

        let loaded = store.load(&zone, &alice).unwrap().unwrap();
        assert_eq!(loaded.revision, Revision(5));
        assert_eq!(loaded.mounts.len(), 1);
    }

    #[test]
    fn load_missing_returns_none() {
        let store = PersistentNamespaceStore::new(Arc::new(InMemoryMetadataStore::new()));
        let zone = zone();
        assert!(store.load(&zone, &alice(&zone)).unwrap().is_none());
    }

    #[test]
    fn delete_views_removes_only_matching_subjects() {
        let store = PersistentNamespaceStore::new(Arc::new(InMemoryMetadataStore::new()));
        let zone = zone();
        let alice = alice(&zone);
        let bob = Entity::new(zone.clone(), "user", "bob");
        store.store(&zone, &alice, &sample_view(&zone), Revision(5)).unwrap();
        store.store(&zone, &bob, &sample_view(&zone), Revision(5)).unwrap();

        let removed = store.delete_views(&zone, |s| s.entity_id == "alice").unwrap();
        assert_eq!(removed, 1);
        assert!(store.load(&zone, &alice).unwrap().is_none());
        assert!(store.load(&zone, &bob).unwrap().is_some());
    }

    #[test]
    fn delete_all_views_clears_zone() {
        let store = PersistentNamespaceStore::new(Arc::new(InMemoryMetadataStore::new()));
        let zone = zone();
        store.store(&zone, &alice(&zone), &sample_view(&zone), Revision(5)).unwrap();
        assert_eq!(store.delete_all_views(&zone).unwrap(), 1);
        assert!(store.load(&zone, &alice(&zone)).unwrap().is_none());
    }
}
