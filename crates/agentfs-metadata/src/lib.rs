//! Component A — `MetadataStore`: an ordered key-value primitive with CAS,
//! bounded prefix scans and transactional batches (spec §4.A).
//!
//! Keys and values are opaque byte strings; every higher layer (inode,
//! version, mount, tuple storage) encodes its own key schema on top (spec
//! §6, "Persisted state layout"). The in-memory implementation here keeps
//! the whole store under a single `parking_lot::RwLock`, which is enough to
//! satisfy the "strict serializable within one batch, linearizable across
//! batches in a zone" guarantee (spec §5) without a real transaction
//! manager — swapping in a durable backend (e.g. an embedded KV store) means
//! implementing the same [`MetadataStore`] trait.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use agentfs_std::{hash::FxHashMap, AgentFsError, Result, Revision, ZoneId};
use parking_lot::RwLock;

/// A precondition guarding a write, used for optimistic concurrency control
/// (spec §4.A, `CASFailure`).
#[derive(Debug, Clone)]
pub enum Precondition {
    /// The key must not currently exist.
    Absent,
    /// The key must currently exist, regardless of value.
    Exists,
    /// The key must currently hold exactly this value.
    ValueEquals(Vec<u8>),
}

impl Precondition {
    fn holds(&self, current: Option<&[u8]>) -> bool {
        match self {
            Precondition::Absent => current.is_none(),
            Precondition::Exists => current.is_some(),
            Precondition::ValueEquals(expected) => current == Some(expected.as_slice()),
        }
    }
}

/// A single write in a [`Batch`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or overwrite `key` with `value`, contingent on `precondition`.
    Put {
        /// The key to write.
        key: Vec<u8>,
        /// The new value.
        value: Vec<u8>,
        /// Optional CAS guard.
        precondition: Option<Precondition>,
    },
    /// Remove `key`, contingent on `precondition`.
    Delete {
        /// The key to remove.
        key: Vec<u8>,
        /// Optional CAS guard.
        precondition: Option<Precondition>,
    },
}

impl WriteOp {
    fn key(&self) -> &[u8] {
        match self {
            WriteOp::Put { key, .. } => key,
            WriteOp::Delete { key, .. } => key,
        }
    }
}

/// A transactional batch: a set of reads that must observe a consistent
/// snapshot, and a set of writes that commit atomically (spec §4.A).
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Keys to read as part of the same snapshot the writes commit against.
    pub reads: Vec<Vec<u8>>,
    /// Writes to apply atomically.
    pub writes: Vec<WriteOp>,
}

impl Batch {
    /// Starts an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a snapshot read.
    pub fn read(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.reads.push(key.into());
        self
    }

    /// Queues an unconditional put.
    pub fn put(mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        self.writes.push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
            precondition: None,
        });
        self
    }

    /// Queues a CAS-guarded put.
    pub fn put_if(
        mut self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        precondition: Precondition,
    ) -> Self {
        self.writes.push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
            precondition: Some(precondition),
        });
        self
    }

    /// Queues an unconditional delete.
    pub fn delete(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.writes.push(WriteOp::Delete {
            key: key.into(),
            precondition: None,
        });
        self
    }

    /// Queues a CAS-guarded delete.
    pub fn delete_if(mut self, key: impl Into<Vec<u8>>, precondition: Precondition) -> Self {
        self.writes.push(WriteOp::Delete {
            key: key.into(),
            precondition: Some(precondition),
        });
        self
    }
}

/// The outcome of a committed [`Batch`].
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Values observed for each key in `Batch::reads`, in order, as of the
    /// committed snapshot (i.e. after this batch's own writes applied).
    pub reads: Vec<Option<Vec<u8>>>,
    /// The zone revision this batch committed at.
    pub revision: Revision,
}

/// A page of a [`MetadataStore::prefix_scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    /// Entries in key order.
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
    /// Cursor to resume from, if the scan was truncated by `limit`.
    pub next_cursor: Option<Vec<u8>>,
}

/// Component A's contract (spec §4.A).
pub trait MetadataStore: Send + Sync {
    /// Reads a single key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Writes a single key, honoring `precondition` if given.
    fn put(&self, key: &[u8], value: Vec<u8>, precondition: Option<Precondition>) -> Result<()>;

    /// Removes a single key, honoring `precondition` if given.
    fn delete(&self, key: &[u8], precondition: Option<Precondition>) -> Result<()>;

    /// Scans keys in `[prefix, prefix+0xff..)` in key order, resuming after
    /// `after_key` if given, yielding at most `limit` entries. Scans may
    /// miss concurrently inserted keys (spec §4.A) — acceptable for list
    /// operations.
    fn prefix_scan(&self, prefix: &[u8], limit: usize, after_key: Option<&[u8]>)
        -> Result<ScanPage>;

    /// Commits `batch` atomically within `zone`, advancing the zone's
    /// revision counter by exactly one.
    fn batch(&self, zone: &ZoneId, batch: Batch) -> Result<BatchResult>;

    /// Returns the current revision of `zone` without performing a write.
    fn current_revision(&self, zone: &ZoneId) -> Revision;
}

/// An in-process [`MetadataStore`] backed by a `BTreeMap`. Sufficient for
/// embedding agentfs in a single process; a durable backend implements the
/// same trait.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    revisions: RwLock<FxHashMap<ZoneId, AtomicU64>>,
}

impl InMemoryMetadataStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_revision(&self, zone: &ZoneId) -> Revision {
        if let Some(counter) = self.revisions.read().get(zone) {
            return Revision(counter.fetch_add(1, Ordering::SeqCst) + 1);
        }
        let mut revisions = self.revisions.write();
        let counter = revisions
            .entry(zone.clone())
            .or_insert_with(|| AtomicU64::new(0));
        Revision(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>, precondition: Option<Precondition>) -> Result<()> {
        let mut data = self.data.write();
        if let Some(pre) = &precondition {
            if !pre.holds(data.get(key).map(|v| v.as_slice())) {
                return Err(AgentFsError::CasFailure(format!(
                    "precondition failed for key of {} bytes",
                    key.len()
                )));
            }
        }
        data.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8], precondition: Option<Precondition>) -> Result<()> {
        let mut data = self.data.write();
        if let Some(pre) = &precondition {
            if !pre.holds(data.get(key).map(|v| v.as_slice())) {
                return Err(AgentFsError::CasFailure(format!(
                    "precondition failed for key of {} bytes",
                    key.len()
                )));
            }
        }
        data.remove(key);
        Ok(())
    }

    fn prefix_scan(
        &self,
        prefix: &[u8],
        limit: usize,
        after_key: Option<&[u8]>,
    ) -> Result<ScanPage> {
        let data = self.data.read();
        let start = match after_key {
            Some(k) => Bound::Excluded(k.to_vec()),
            None => Bound::Included(prefix.to_vec()),
        };
        let mut entries = Vec::new();
        let mut next_cursor = None;
        for (k, v) in data.range((start, Bound::Unbounded)) {
            if !k.starts_with(prefix) {
                break;
            }
            if entries.len() == limit {
                next_cursor = Some(k.clone());
                break;
            }
            entries.push((k.clone(), v.clone()));
        }
        Ok(ScanPage {
            entries,
            next_cursor,
        })
    }

    fn batch(&self, zone: &ZoneId, batch: Batch) -> Result<BatchResult> {
        let mut data = self.data.write();

        // Validate every precondition against the pre-batch snapshot before
        // mutating anything, so a failing batch leaves no partial state.
        for write in &batch.writes {
            let current = data.get(write.key()).map(|v| v.as_slice());
            let ok = match write {
                WriteOp::Put { precondition, .. } | WriteOp::Delete { precondition, .. } => {
                    match precondition {
                        Some(p) => p.holds(current),
                        None => true,
                    }
                }
            };
            if !ok {
                return Err(AgentFsError::CasFailure(
                    "batch precondition failed".to_string(),
                ));
            }
        }

        for write in &batch.writes {
            match write {
                WriteOp::Put { key, value, .. } => {
                    data.insert(key.clone(), value.clone());
                }
                WriteOp::Delete { key, .. } => {
                    data.remove(key);
                }
            }
        }

        let reads = batch
            .reads
            .iter()
            .map(|k| data.get(k).cloned())
            .collect();

        drop(data);
        let revision = self.bump_revision(zone);
        tracing::trace!(zone = %zone, revision = %revision, writes = batch.writes.len(), "metadata batch committed");
        Ok(BatchResult { reads, revision })
    }

    fn current_revision(&self, zone: &ZoneId) -> Revision {
        self.revisions
            .read()
            .get(zone)
            .map(|c| Revision(c.load(Ordering::SeqCst)))
            .unwrap_or(Revision::ZERO)
    }
}
