//! Component D — `ContentStore`: content-addressed, deduplicated blob
//! storage with reference counting and grace-windowed collection.

use std::sync::Arc;

use agentfs_blob::{read_to_vec, stream_from_bytes, BlobStore, ByteStream};
use agentfs_metadata::{MetadataStore, Precondition};
use agentfs_std::time::{utc_now, Duration, UtcDateTime};
use agentfs_std::{AgentFsError, ContentHash, Result, ZoneId};
use serde::{Deserialize, Serialize};

/// Minimum grace period between a blob's refcount reaching zero and it
/// becoming eligible for collection (spec §4.D).
pub const MIN_GRACE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobEntry {
    size: u64,
    refcount: u64,
    tombstoned_at: Option<UtcDateTime>,
}

fn entry_key(zone: &ZoneId, hash: &ContentHash) -> Vec<u8> {
    format!("content/{}/{}", zone.0, hash.to_hex()).into_bytes()
}

fn blob_object_key(zone: &ZoneId, hash: &ContentHash) -> String {
    format!("blob/{}/{}", zone.0, hash.to_hex())
}

/// Component D, generic over the metadata and blob backends it composes.
pub struct ContentStore<M, B> {
    metadata: Arc<M>,
    blobs: Arc<B>,
}

impl<M: MetadataStore, B: BlobStore> ContentStore<M, B> {
    /// Wraps a metadata store and a blob backend.
    pub fn new(metadata: Arc<M>, blobs: Arc<B>) -> Self {
        Self { metadata, blobs }
    }

    fn load_entry(&self, zone: &ZoneId, hash: &ContentHash) -> Result<Option<BlobEntry>> {
        match self.metadata.get(&entry_key(zone, hash))? {
            Some(bytes) => {
                let entry: BlobEntry = serde_json::from_slice(&bytes)
                    .map_err(|e| AgentFsError::Corrupt(format!("blob entry {hash}: {e}")))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Streams `stream` into the store, hashing its full contents. If a blob
    /// with the same hash already exists, its refcount is incremented and
    /// the new bytes are discarded (deduplication); otherwise a new blob
    /// entry is created with refcount 1.
    pub async fn put(&self, zone: &ZoneId, stream: ByteStream) -> Result<(ContentHash, u64)> {
        let bytes = read_to_vec(stream)
            .await
            .map_err(|e| AgentFsError::Unavailable(e.to_string()))?;
        let hash = ContentHash::of(&bytes);
        let size = bytes.len() as u64;

        if self.load_entry(zone, &hash)?.is_some() {
            self.incref(zone, &hash)?;
            return Ok((hash, size));
        }

        self.blobs
            .write(&blob_object_key(zone, &hash), stream_from_bytes(bytes))
            .await?;

        loop {
            let key = entry_key(zone, &hash);
            let precondition = match self.metadata.get(&key)? {
                None => Precondition::Absent,
                Some(_) => {
                    // Lost the race to another writer of the same hash; fall
                    // through to incref instead of inserting twice.
                    self.incref(zone, &hash)?;
                    return Ok((hash, size));
                }
            };
            let entry = BlobEntry {
                size,
                refcount: 1,
                tombstoned_at: None,
            };
            let value = serde_json::to_vec(&entry).expect("blob entry serializes");
            match self.metadata.put(&key, value, Some(precondition)) {
                Ok(()) => return Ok((hash, size)),
                Err(AgentFsError::CasFailure(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Reads the full contents of a blob.
    pub async fn get(&self, zone: &ZoneId, hash: &ContentHash) -> Result<ByteStream> {
        if self.load_entry(zone, hash)?.is_none() {
            return Err(AgentFsError::Corrupt(format!(
                "content hash {hash} referenced but missing metadata"
            )));
        }
        self.blobs.read(&blob_object_key(zone, hash), None).await
    }

    /// Whether a blob with this hash is known.
    pub fn exists(&self, zone: &ZoneId, hash: &ContentHash) -> Result<bool> {
        Ok(self.load_entry(zone, hash)?.is_some())
    }

    /// Returns a blob's current refcount, or `None` if it has no entry.
    pub fn refcount(&self, zone: &ZoneId, hash: &ContentHash) -> Result<Option<u64>> {
        Ok(self.load_entry(zone, hash)?.map(|e| e.refcount))
    }

    /// Returns a blob's recorded size in bytes, or `None` if it has no entry.
    pub fn size(&self, zone: &ZoneId, hash: &ContentHash) -> Result<Option<u64>> {
        Ok(self.load_entry(zone, hash)?.map(|e| e.size))
    }

    /// Inserts a metadata entry for `hash` at refcount zero if none already
    /// exists, without touching the blob backend. Used by zone restore to
    /// bootstrap entries for content whose bytes are recovered through the
    /// blob store's own out-of-band channel ahead of replaying the version
    /// chains that reference them. A no-op if an entry already exists.
    pub fn seed_entry(&self, zone: &ZoneId, hash: &ContentHash, size: u64) -> Result<()> {
        let key = entry_key(zone, hash);
        if self.metadata.get(&key)?.is_some() {
            return Ok(());
        }
        let entry = BlobEntry {
            size,
            refcount: 0,
            tombstoned_at: None,
        };
        let value = serde_json::to_vec(&entry).expect("blob entry serializes");
        match self.metadata.put(&key, value, Some(Precondition::Absent)) {
            Ok(()) => Ok(()),
            Err(AgentFsError::CasFailure(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Increments a blob's refcount, clearing any pending tombstone.
    pub fn incref(&self, zone: &ZoneId, hash: &ContentHash) -> Result<u64> {
        self.cas_update(zone, hash, |entry| {
            entry.refcount += 1;
            entry.tombstoned_at = None;
        })
    }

    /// Decrements a blob's refcount. If it reaches zero, the entry is
    /// tombstoned with the current time; [`ContentStore::sweep_tombstones`]
    /// reclaims it once the grace window has elapsed.
    pub fn decref(&self, zone: &ZoneId, hash: &ContentHash) -> Result<u64> {
        self.cas_update(zone, hash, |entry| {
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount == 0 {
                entry.tombstoned_at = Some(utc_now());
            }
        })
    }

    /// Forces a blob's refcount to exactly `expected`, used by the
    /// version-history reconciliation sweep (spec §4.E) to correct drift
    /// left by a crash between `incref` and a version pointer update. A
    /// no-op if the entry already matches.
    pub fn reconcile_refcount(&self, zone: &ZoneId, hash: &ContentHash, expected: u64) -> Result<bool> {
        let key = entry_key(zone, hash);
        let Some(before_bytes) = self.metadata.get(&key)? else {
            return Err(AgentFsError::Corrupt(format!(
                "content hash {hash} has no blob entry"
            )));
        };
        let mut entry: BlobEntry = serde_json::from_slice(&before_bytes)
            .map_err(|e| AgentFsError::Corrupt(format!("blob entry {hash}: {e}")))?;
        if entry.refcount == expected {
            return Ok(false);
        }
        entry.refcount = expected;
        entry.tombstoned_at = if expected == 0 { Some(utc_now()) } else { None };
        let after_bytes = serde_json::to_vec(&entry).expect("blob entry serializes");
        match self.metadata.put(
            &key,
            after_bytes,
            Some(Precondition::ValueEquals(before_bytes)),
        ) {
            Ok(()) => Ok(true),
            Err(AgentFsError::CasFailure(_)) => self.reconcile_refcount(zone, hash, expected),
            Err(e) => Err(e),
        }
    }

    fn cas_update(
        &self,
        zone: &ZoneId,
        hash: &ContentHash,
        f: impl Fn(&mut BlobEntry),
    ) -> Result<u64> {
        loop {
            let key = entry_key(zone, hash);
            let Some(before_bytes) = self.metadata.get(&key)? else {
                return Err(AgentFsError::Corrupt(format!(
                    "content hash {hash} has no blob entry"
                )));
            };
            let mut entry: BlobEntry = serde_json::from_slice(&before_bytes)
                .map_err(|e| AgentFsError::Corrupt(format!("blob entry {hash}: {e}")))?;
            f(&mut entry);
            let after_bytes = serde_json::to_vec(&entry).expect("blob entry serializes");
            match self.metadata.put(
                &key,
                after_bytes,
                Some(Precondition::ValueEquals(before_bytes)),
            ) {
                Ok(()) => return Ok(entry.refcount),
                Err(AgentFsError::CasFailure(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Performs one pass of tombstone collection: any blob entry tombstoned
    /// more than `grace` ago, and still at refcount zero, has its bytes and
    /// metadata entry removed. Returns the number of blobs collected.
    ///
    /// Intended to be invoked periodically by the embedding application,
    /// mirroring the version-refcount reconciliation sweep of component E.
    pub async fn sweep_tombstones(&self, zone: &ZoneId, grace: Duration) -> Result<u64> {
        let grace = time::Duration::try_from(grace)
            .map_err(|e| AgentFsError::InvalidArgument(e.to_string()))?;
        let prefix = format!("content/{}/", zone.0).into_bytes();
        let mut collected = 0u64;
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let page = self
                .metadata
                .prefix_scan(&prefix, 256, cursor.as_deref())?;
            for (key, value) in &page.entries {
                let entry: BlobEntry = match serde_json::from_slice(value) {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                let Some(tombstoned_at) = entry.tombstoned_at else {
                    continue;
                };
                if entry.refcount != 0 {
                    continue;
                }
                if utc_now() - tombstoned_at < grace {
                    continue;
                }
                let hash_hex = match std::str::from_utf8(&key[prefix.len()..]) {
                    Ok(h) => h.to_string(),
                    Err(_) => continue,
                };
                // Re-check under CAS so a racing incref wins over collection.
                if self
                    .metadata
                    .delete(key, Some(Precondition::ValueEquals(value.clone())))
                    .is_ok()
                {
                    let object_key = format!("blob/{}/{}", zone.0, hash_hex);
                    self.blobs.delete(&object_key).await?;
                    collected += 1;
                }
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(collected)
    }
}
