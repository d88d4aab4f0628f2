//! Component E — `VersionStore`: an append-only per-path version chain
//! layered on [`MetadataStore`] and [`ContentStore`].

use std::sync::Arc;

use agentfs_blob::BlobStore;
use agentfs_metadata::{Batch, MetadataStore, Precondition, ScanPage};
use agentfs_std::time::utc_now;
use agentfs_std::{AgentFsError, ContentHash, InodeId, Result, VersionId, ZoneId};
use serde::{Deserialize, Serialize};

use crate::content::ContentStore;

/// One immutable element of a path's version history (spec §3, `Version`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    /// This version's id, monotonic within the owning inode.
    pub id: VersionId,
    /// The inode this version belongs to.
    pub inode_id: InodeId,
    /// Content hash this version points at.
    pub content_hash: ContentHash,
    /// Subject that authored this version.
    pub author: String,
    /// When this version was created.
    pub created_at: agentfs_std::time::UtcDateTime,
    /// The version this one was appended after, if any.
    pub parent_version_id: Option<VersionId>,
}

// Zero-padded to 20 digits (u64::MAX's width) so the metadata store's
// byte-lexical prefix scan agrees with numeric order once an inode has
// 10 or more versions (`list` and `VersionPage` are documented oldest
// first; `import_zone` relies on the last entry being the newest).
fn version_key(zone: &ZoneId, inode_id: InodeId, version_id: VersionId) -> Vec<u8> {
    format!("ver/{}/{}/{:020}", zone.0, inode_id.0, version_id.0).into_bytes()
}

fn version_prefix(zone: &ZoneId, inode_id: InodeId) -> Vec<u8> {
    format!("ver/{}/{}/", zone.0, inode_id.0).into_bytes()
}

fn current_pointer_key(zone: &ZoneId, inode_id: InodeId) -> Vec<u8> {
    format!("ver/current/{}/{}", zone.0, inode_id.0).into_bytes()
}

/// A page of version history.
pub struct VersionPage {
    /// The versions found, oldest first.
    pub entries: Vec<Version>,
    /// Cursor to resume from.
    pub next_cursor: Option<Vec<u8>>,
}

/// Component E, generic over the metadata and blob backends its dependency
/// [`ContentStore`] composes.
pub struct VersionStore<M, B> {
    metadata: Arc<M>,
    content: Arc<ContentStore<M, B>>,
}

impl<M: MetadataStore, B: BlobStore> VersionStore<M, B> {
    /// Wraps a metadata store and the content store it shares with the rest
    /// of the inode layer.
    pub fn new(metadata: Arc<M>, content: Arc<ContentStore<M, B>>) -> Self {
        Self { metadata, content }
    }

    fn next_version_id(&self, zone: &ZoneId, inode_id: InodeId) -> Result<VersionId> {
        let current = self.current(zone, inode_id)?;
        Ok(VersionId(current.map(|v| v.id.0).unwrap_or(0) + 1))
    }

    /// Appends a new version pointing at `new_content_hash`, becoming the
    /// new current version. The previous current hash, if any, is decref'd
    /// afterwards. `new_content_hash` must already carry a reference the
    /// caller is handing off to this version: a fresh [`ContentStore::put`]
    /// already returns refcount 1 for new content, so the normal write path
    /// (facade write → `ContentStore::put` → `VersionStore::append`) does
    /// not double-count; [`VersionStore::restore`] increfs explicitly
    /// before calling this, since it reuses a hash that was never freshly
    /// put.
    pub fn append(
        &self,
        zone: &ZoneId,
        inode_id: InodeId,
        new_content_hash: ContentHash,
        author: &str,
    ) -> Result<VersionId> {
        let previous = self.current(zone, inode_id)?;
        let version_id = self.next_version_id(zone, inode_id)?;

        let version = Version {
            id: version_id,
            inode_id,
            content_hash: new_content_hash,
            author: author.to_string(),
            created_at: utc_now(),
            parent_version_id: previous.as_ref().map(|v| v.id),
        };
        let record = serde_json::to_vec(&version)
            .map_err(|e| AgentFsError::InvalidArgument(e.to_string()))?;

        let pointer_key = current_pointer_key(zone, inode_id);
        let pointer_precondition = match &previous {
            Some(v) => Precondition::ValueEquals(v.id.0.to_string().into_bytes()),
            None => Precondition::Absent,
        };
        let batch = Batch::new()
            .put_if(
                version_key(zone, inode_id, version_id),
                record,
                Precondition::Absent,
            )
            .put_if(
                pointer_key,
                version_id.0.to_string().into_bytes(),
                pointer_precondition,
            );
        self.metadata.batch(zone, batch)?;

        if let Some(previous) = previous {
            self.content.decref(zone, &previous.content_hash)?;
        }

        Ok(version_id)
    }

    /// Returns the current version of an inode, if it has ever been
    /// written to.
    pub fn current(&self, zone: &ZoneId, inode_id: InodeId) -> Result<Option<Version>> {
        let Some(bytes) = self.metadata.get(&current_pointer_key(zone, inode_id))? else {
            return Ok(None);
        };
        let id: u64 = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| AgentFsError::Corrupt("version pointer".into()))?;
        self.load(zone, inode_id, VersionId(id))
    }

    /// Loads a specific version record.
    pub fn load(
        &self,
        zone: &ZoneId,
        inode_id: InodeId,
        version_id: VersionId,
    ) -> Result<Option<Version>> {
        let Some(bytes) = self.metadata.get(&version_key(zone, inode_id, version_id))? else {
            return Ok(None);
        };
        let version: Version = serde_json::from_slice(&bytes)
            .map_err(|e| AgentFsError::Corrupt(format!("version {version_id}: {e}")))?;
        Ok(Some(version))
    }

    /// Lists an inode's version history, oldest first.
    pub fn list(
        &self,
        zone: &ZoneId,
        inode_id: InodeId,
        after_key: Option<Vec<u8>>,
        limit: usize,
    ) -> Result<VersionPage> {
        let ScanPage {
            entries,
            next_cursor,
        } = self.metadata.prefix_scan(
            &version_prefix(zone, inode_id),
            limit,
            after_key.as_deref(),
        )?;
        let mut versions = Vec::with_capacity(entries.len());
        for (_, value) in entries {
            let version: Version = serde_json::from_slice(&value)
                .map_err(|e| AgentFsError::Corrupt(format!("version record: {e}")))?;
            versions.push(version);
        }
        Ok(VersionPage {
            entries: versions,
            next_cursor,
        })
    }

    /// Restores `version_id` by re-appending its content hash as a new
    /// head version. History is never rewritten; `restore` only ever adds.
    pub fn restore(
        &self,
        zone: &ZoneId,
        inode_id: InodeId,
        version_id: VersionId,
        author: &str,
    ) -> Result<VersionId> {
        let Some(target) = self.load(zone, inode_id, version_id)? else {
            return Err(AgentFsError::NotFound(format!(
                "version {version_id} of inode {inode_id}"
            )));
        };
        self.content.incref(zone, &target.content_hash)?;
        match self.append(zone, inode_id, target.content_hash, author) {
            Ok(id) => Ok(id),
            Err(e) => {
                let _ = self.content.decref(zone, &target.content_hash);
                Err(e)
            }
        }
    }

    /// Scans every inode's current-version pointer in `zone` and reconciles
    /// `ContentStore` refcounts against what is actually live-referenced:
    /// exactly the set of hashes each inode currently points at. This
    /// corrects the dangling-refcount window described in spec §4.E, where a
    /// crash between a reference being established (`ContentStore::put` or
    /// `incref`) and [`VersionStore::append`]'s current-pointer update
    /// leaves a blob refcounted without any inode pointing at it. Returns
    /// the number of blobs whose refcount was corrected.
    ///
    /// This is an explicit, caller-invoked operation; it does not schedule
    /// itself. Run it periodically or after a suspected crash recovery.
    pub fn reconcile_refcounts(&self, zone: &ZoneId) -> Result<u64> {
        let prefix = format!("ver/current/{}/", zone.0).into_bytes();
        let mut referenced: agentfs_std::hash::FxHashMap<ContentHash, u64> = Default::default();
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let page = self.metadata.prefix_scan(&prefix, 256, cursor.as_deref())?;
            for (key, value) in &page.entries {
                let inode_id: u64 = match std::str::from_utf8(&key[prefix.len()..])
                    .ok()
                    .and_then(|s| s.parse().ok())
                {
                    Some(id) => id,
                    None => continue,
                };
                let version_id: u64 = match std::str::from_utf8(value).ok().and_then(|s| s.parse().ok()) {
                    Some(id) => id,
                    None => continue,
                };
                if let Some(version) = self.load(zone, InodeId(inode_id), VersionId(version_id))? {
                    *referenced.entry(version.content_hash).or_insert(0) += 1;
                }
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        let mut corrections = 0u64;
        for (hash, expected_refs) in referenced {
            if self.content.reconcile_refcount(zone, &hash, expected_refs)? {
                corrections += 1;
            }
        }
        Ok(corrections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentfs_blob::{stream_from_bytes, InMemoryBlobStore};
    use agentfs_metadata::InMemoryMetadataStore;

    fn zone() -> ZoneId {
        ZoneId::new("zone-a")
    }

    fn stores() -> (
        Arc<InMemoryMetadataStore>,
        Arc<ContentStore<InMemoryMetadataStore, InMemoryBlobStore>>,
    ) {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let content = Arc::new(ContentStore::new(
            metadata.clone(),
            Arc::new(InMemoryBlobStore::new()),
        ));
        (metadata, content)
    }

    #[tokio::test]
    async fn append_then_current_roundtrips() {
        let (metadata, content) = stores();
        let versions = VersionStore::new(metadata, content.clone());
        let zone = zone();
        let inode = InodeId(1);
        let (hash, _) = content
            .put(&zone, stream_from_bytes(b"v1".to_vec()))
            .await
            .unwrap();

        let id = versions.append(&zone, inode, hash, "alice").unwrap();
        assert_eq!(id, VersionId(1));
        let current = versions.current(&zone, inode).unwrap().unwrap();
        assert_eq!(current.content_hash, hash);
    }

    #[tokio::test]
    async fn successive_appends_decref_previous_hash() {
        let (metadata, content) = stores();
        let versions = VersionStore::new(metadata, content.clone());
        let zone = zone();
        let inode = InodeId(1);
        let (h1, _) = content
            .put(&zone, stream_from_bytes(b"v1".to_vec()))
            .await
            .unwrap();
        let (h2, _) = content
            .put(&zone, stream_from_bytes(b"v2".to_vec()))
            .await
            .unwrap();

        versions.append(&zone, inode, h1, "alice").unwrap();
        versions.append(&zone, inode, h2, "alice").unwrap();

        assert_eq!(content.refcount(&zone, &h1).unwrap(), Some(0));
        assert_eq!(content.refcount(&zone, &h2).unwrap(), Some(1));
    }

    #[tokio::test]
    async fn restore_appends_new_version_pointing_at_old_hash() {
        let (metadata, content) = stores();
        let versions = VersionStore::new(metadata, content.clone());
        let zone = zone();
        let inode = InodeId(1);
        let (h1, _) = content
            .put(&zone, stream_from_bytes(b"v1".to_vec()))
            .await
            .unwrap();
        let (h2, _) = content
            .put(&zone, stream_from_bytes(b"v2".to_vec()))
            .await
            .unwrap();
        versions.append(&zone, inode, h1, "alice").unwrap();
        versions.append(&zone, inode, h2, "alice").unwrap();

        let restored_id = versions
            .restore(&zone, inode, VersionId(1), "alice")
            .unwrap();
        assert_eq!(restored_id, VersionId(3));
        let current = versions.current(&zone, inode).unwrap().unwrap();
        assert_eq!(current.content_hash, h1);

        let history = versions.list(&zone, inode, None, 10).unwrap();
        assert_eq!(history.entries.len(), 3);
    }

    #[tokio::test]
    async fn reconcile_fixes_dangling_incref() {
        let (metadata, content) = stores();
        let versions = VersionStore::new(metadata, content.clone());
        let zone = zone();
        let inode = InodeId(1);
        let (hash, _) = content
            .put(&zone, stream_from_bytes(b"v1".to_vec()))
            .await
            .unwrap();
        versions.append(&zone, inode, hash, "alice").unwrap();

        // Simulate the crash window: `incref` (step 1) succeeded for a
        // second write but the batch updating the current pointer (step 3)
        // never committed, so no inode actually points at the extra ref.
        content.incref(&zone, &hash).unwrap();
        assert_eq!(content.refcount(&zone, &hash).unwrap(), Some(2));

        let corrections = versions.reconcile_refcounts(&zone).unwrap();
        assert_eq!(corrections, 1);
        assert_eq!(content.refcount(&zone, &hash).unwrap(), Some(1));

        // A second pass is a no-op once refcounts match reality.
        assert_eq!(versions.reconcile_refcounts(&zone).unwrap(), 0);
    }

    #[tokio::test]
    async fn list_stays_numerically_ordered_past_ten_versions() {
        let (metadata, content) = stores();
        let versions = VersionStore::new(metadata, content.clone());
        let zone = zone();
        let inode = InodeId(1);

        for i in 0..12 {
            let (hash, _) = content
                .put(&zone, stream_from_bytes(format!("v{i}").into_bytes()))
                .await
                .unwrap();
            versions.append(&zone, inode, hash, "alice").unwrap();
        }

        let history = versions.list(&zone, inode, None, 100).unwrap();
        let ids: Vec<u64> = history.entries.iter().map(|v| v.id.0).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted, "version 10 must not sort before version 2");
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
    }
}
