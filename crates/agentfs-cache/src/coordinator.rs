//! Component L — the `CacheCoordinator`: the choke point for write-path
//! cache coherence (spec §4.L). Every `rebac_write`/`rebac_delete` that
//! passes through it invalidates L1, L2 and L3 synchronously before the
//! tuple's commit revision is handed back to the caller.

use std::sync::Arc;
use std::time::Duration;

use agentfs_metadata::MetadataStore;
use agentfs_rebac::{CheckEngine, Entity, Subject, Tuple};
use agentfs_std::hash::FxHashSet;
use agentfs_std::{AgentFsError, Result, Revision, ZoneId};
use parking_lot::RwLock;

use crate::l1::DecisionCache;
use crate::l2::{NamespaceCache, MOUNT_OBJECT_TYPE};
use crate::l3::PersistentNamespaceStore;

const DEFAULT_L3_RETRIES: u32 = 3;
const DEFAULT_L3_BACKOFF: Duration = Duration::from_millis(10);

/// What to do if L3 invalidation keeps failing after retries (spec §4.L:
/// "policy: default proceed-with-warning, because L3 self-heals on next
/// access via the revision tag").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L3FailurePolicy {
    /// Log a warning and let the write through; the next `load` against a
    /// stale persisted view will notice its revision tag is behind and
    /// re-derive (spec §4.K invariant).
    ProceedWithWarning,
    /// Surface `CacheUnavailable` to the writer instead of completing it.
    Abort,
}

type Invalidator = Box<dyn Fn(&ZoneId) + Send + Sync>;

/// Component L, generic over the [`MetadataStore`] backing L3.
pub struct CacheCoordinator<S> {
    check: Arc<CheckEngine>,
    l1: DecisionCache,
    l2: NamespaceCache,
    l3: PersistentNamespaceStore<S>,
    group_relations: FxHashSet<String>,
    hierarchy_relations: FxHashSet<String>,
    l3_failure_policy: L3FailurePolicy,
    l3_retries: u32,
    l3_backoff: Duration,
    invalidators: RwLock<Vec<Invalidator>>,
}

impl<S: MetadataStore> CacheCoordinator<S> {
    /// Wires a check engine and the three cache tiers together.
    /// `group_relations` and `hierarchy_relations` name the relations whose
    /// writes have an unbounded invalidation blast radius (closure-backed
    /// group edges, and tupleset relations like `parent` that other
    /// objects inherit permissions through) — writes to them trigger a
    /// whole-zone cache drop rather than a narrow per-object one (spec
    /// §4.I: "implementations MAY over-invalidate... MUST NOT
    /// under-invalidate").
    pub fn new(
        check: Arc<CheckEngine>,
        metadata: Arc<S>,
        group_relations: impl IntoIterator<Item = String>,
        hierarchy_relations: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            check,
            l1: DecisionCache::default(),
            l2: NamespaceCache::new(),
            l3: PersistentNamespaceStore::new(metadata),
            group_relations: group_relations.into_iter().collect(),
            hierarchy_relations: hierarchy_relations.into_iter().collect(),
            l3_failure_policy: L3FailurePolicy::ProceedWithWarning,
            l3_retries: DEFAULT_L3_RETRIES,
            l3_backoff: DEFAULT_L3_BACKOFF,
            invalidators: RwLock::new(Vec::new()),
        }
    }

    /// Overrides what happens when L3 invalidation keeps failing.
    pub fn with_l3_failure_policy(mut self, policy: L3FailurePolicy) -> Self {
        self.l3_failure_policy = policy;
        self
    }

    /// Overrides how many times and how long the coordinator backs off
    /// while retrying a failing L3 invalidation before applying
    /// `l3_failure_policy` (spec §9 ambient config; defaults to
    /// `DEFAULT_L3_RETRIES`/`DEFAULT_L3_BACKOFF` otherwise).
    pub fn with_l3_retry(mut self, retries: u32, backoff: Duration) -> Self {
        self.l3_retries = retries;
        self.l3_backoff = backoff;
        self
    }

    /// The L1 decision cache, for the facade's read path to consult before
    /// calling `CheckEngine::check`.
    pub fn l1(&self) -> &DecisionCache {
        &self.l1
    }

    /// The L2 namespace/mount-view cache, for the facade's `list`/mount
    /// visibility path.
    pub fn l2(&self) -> &NamespaceCache {
        &self.l2
    }

    /// The L3 persistent namespace view, for cold-start population of L2.
    pub fn l3(&self) -> &PersistentNamespaceStore<S> {
        &self.l3
    }

    /// The wrapped check engine, for direct `check`/`expand`/`list_objects`
    /// calls that don't go through the coordinator's write path.
    pub fn check_engine(&self) -> &CheckEngine {
        &self.check
    }

    /// Registers a callback notified (step 4, spec §4.L) after every
    /// successful invalidation. Registration is rare (mount/zone setup)
    /// compared to invalidation (every write), so both sides share one
    /// `parking_lot::RwLock`; the hot path only holds its read guard long
    /// enough to run the registered callbacks, never across I/O.
    pub fn register_invalidator(&self, callback: Invalidator) {
        self.invalidators.write().push(callback);
    }

    /// Writes `tuple` through the wrapped check engine, then runs the
    /// invalidation protocol before returning the commit revision (spec
    /// §4.L steps 1-4).
    pub fn write_tuple(&self, tuple: Tuple) -> Result<Revision> {
        let zone = tuple.zone.clone();
        let subject = tuple.subject.entity().clone();
        let relation = tuple.relation.clone();
        let object = tuple.object.clone();
        let revision = self.check.write_tuple(tuple)?;
        self.invalidate(&zone, &subject, &relation, &object)?;
        Ok(revision)
    }

    /// Deletes a tuple through the wrapped check engine, then runs the same
    /// invalidation protocol.
    pub fn delete_tuple(&self, zone: &ZoneId, subject: &Subject, relation: &str, object: &Entity) -> Result<Revision> {
        let revision = self.check.delete_tuple(zone, subject, relation, object)?;
        self.invalidate(zone, subject.entity(), relation, object)?;
        Ok(revision)
    }

    fn invalidate(&self, zone: &ZoneId, subject: &Entity, relation: &str, object: &Entity) -> Result<()> {
        let coarse = self.group_relations.contains(relation) || self.hierarchy_relations.contains(relation);
        if coarse {
            tracing::trace!(%zone, relation, "coarse cache invalidation (group or hierarchy relation write)");
            self.l1.invalidate_zone(zone);
            self.l2.invalidate_zone(zone);
            self.invalidate_l3_with_retry(zone, |_| true)?;
        } else {
            // Not a group or hierarchy relation: the write only asserts a
            // direct grant/revoke on `object`, so only decisions cached for
            // that object can have changed. (Closure-backed subject
            // reachability only matters for group-relation writes, already
            // routed to the coarse branch above.)
            let object = object.clone();
            self.l1.invalidate(|k| &k.zone == zone && k.object == object);
            if object.entity_type == MOUNT_OBJECT_TYPE {
                tracing::trace!(%zone, %subject, "L2/L3 mount-visibility invalidation");
                self.l2.invalidate_subject(zone, subject);
                let subject_for_l3 = subject.clone();
                self.invalidate_l3_with_retry(zone, move |s| s == &subject_for_l3)?;
            }
        }

        for callback in self.invalidators.read().iter() {
            callback(zone);
        }
        Ok(())
    }

    fn invalidate_l3_with_retry(&self, zone: &ZoneId, predicate: impl Fn(&Entity) -> bool) -> Result<()> {
        let mut attempt = 0;
        let mut delay = self.l3_backoff;
        loop {
            match self.l3.delete_views(zone, &predicate) {
                Ok(_) => return Ok(()),
                Err(e) if e.is_retriable() && attempt < self.l3_retries => {
                    attempt += 1;
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                Err(e) => {
                    return match self.l3_failure_policy {
                        L3FailurePolicy::ProceedWithWarning => {
                            tracing::warn!(%zone, error = %e, "L3 invalidation failed after retries; proceeding (self-heals via revision tag)");
                            Ok(())
                        }
                        L3FailurePolicy::Abort => Err(AgentFsError::CacheUnavailable(format!(
                            "L3 invalidation failed after {attempt} retries: {e}"
                        ))),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentfs_metadata::InMemoryMetadataStore;
    use agentfs_rebac::{InMemoryTupleStore, NamespaceConfig, RewriteRule};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn zone() -> ZoneId {
        ZoneId::new("z")
    }

    fn user(zone: &ZoneId, id: &str) -> Entity {
        Entity::new(zone.clone(), "user", id)
    }

    fn doc(zone: &ZoneId, id: &str) -> Entity {
        Entity::new(zone.clone(), "doc", id)
    }

    fn namespace() -> NamespaceConfig {
        let mut ns = NamespaceConfig::new();
        ns.define("doc", "owner", RewriteRule::This);
        ns
    }

    fn coordinator() -> CacheCoordinator<InMemoryMetadataStore> {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let tuples = Arc::new(InMemoryTupleStore::new(metadata.clone()));
        let check = Arc::new(CheckEngine::new(tuples, namespace(), vec!["member".to_string()]));
        CacheCoordinator::new(check, metadata, vec!["member".to_string()], vec!["parent".to_string()])
    }

    #[test]
    fn narrow_write_invalidates_only_matching_object() {
        let coordinator = coordinator();
        let zone = zone();
        let alice = user(&zone, "alice");
        let doc1 = doc(&zone, "doc1");
        let doc2 = doc(&zone, "doc2");

        coordinator.l1().insert(
            crate::l1::DecisionKey::new(zone.clone(), alice.clone(), "owner", doc1.clone()),
            true,
            Revision(1),
        );
        coordinator.l1().insert(
            crate::l1::DecisionKey::new(zone.clone(), alice.clone(), "owner", doc2.clone()),
            true,
            Revision(1),
        );

        coordinator
            .write_tuple(Tuple {
                subject: Subject::Direct(alice.clone()),
                relation: "owner".to_string(),
                object: doc1.clone(),
                zone: zone.clone(),
                caveat: None,
                expiry: None,
                revision: Revision::ZERO,
            })
            .unwrap();

        assert!(coordinator
            .l1()
            .lookup(&crate::l1::DecisionKey::new(zone.clone(), alice.clone(), "owner", doc1), Revision(0))
            .is_none());
        assert!(coordinator
            .l1()
            .lookup(&crate::l1::DecisionKey::new(zone.clone(), alice, "owner", doc2), Revision(0))
            .is_some());
    }

    #[test]
    fn group_relation_write_invalidates_whole_zone() {
        let coordinator = coordinator();
        let zone = zone();
        let alice = user(&zone, "alice");
        let doc1 = doc(&zone, "doc1");

        coordinator.l1().insert(
            crate::l1::DecisionKey::new(zone.clone(), alice.clone(), "owner", doc1.clone()),
            true,
            Revision(1),
        );

        coordinator
            .write_tuple(Tuple {
                subject: Subject::Direct(user(&zone, "bob")),
                relation: "member".to_string(),
                object: doc(&zone, "group-irrelevant"),
                zone: zone.clone(),
                caveat: None,
                expiry: None,
                revision: Revision::ZERO,
            })
            .unwrap();

        assert!(coordinator
            .l1()
            .lookup(&crate::l1::DecisionKey::new(zone, alice, "owner", doc1), Revision(0))
            .is_none());
    }

    #[test]
    fn invalidator_callback_is_notified() {
        let coordinator = coordinator();
        let zone = zone();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        coordinator.register_invalidator(Box::new(move |_z| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        coordinator
            .write_tuple(Tuple {
                subject: Subject::Direct(user(&zone, "alice")),
                relation: "owner".to_string(),
                object: doc(&zone, "doc1"),
                zone: zone.clone(),
                caveat: None,
                expiry: None,
                revision: Revision::ZERO,
            })
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
