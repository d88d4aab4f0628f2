//! Component I — the L1 decision cache: a sharded, bounded, TTL-backed map
//! from `(subject, permission, object, zone)` to the last `check` outcome
//! (spec §4.I).
//!
//! Invalidation, not the TTL, is the primary coherence mechanism; the TTL
//! only bounds staleness for entries a write never touched (a storage fault
//! mid-invalidation, or a consumer that never subscribed to invalidation
//! events at all).

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use agentfs_rebac::Entity;
use agentfs_std::hash::FxHashMap;
use agentfs_std::time::{now_instant, Instant};
use agentfs_std::{Revision, ZoneId};
use parking_lot::RwLock;

/// 16 shards, matching the teacher's usual fan-out for sharded concurrent
/// maps (spec §4.I: "recommended 16 shards").
const DEFAULT_SHARD_COUNT: usize = 16;
/// Bounded entries per shard; past this, the oldest entry in the shard is
/// evicted to make room (insertion-order FIFO, not full LRU recency
/// tracking — simple, and sufficient since invalidation is what actually
/// keeps this cache correct).
const DEFAULT_SHARD_CAPACITY: usize = 4096;
/// Small TTL (spec §4.I: "TTL is small (seconds)").
const DEFAULT_TTL: std::time::Duration = std::time::Duration::from_secs(5);

/// The full cache key (spec §4.I: `(subject, permission, object, zone)`).
/// `zone` is carried on `subject`/`object` already, but kept explicit here
/// so a lookup can't accidentally cross zones if a caller passes mismatched
/// entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    /// The zone the decision was evaluated in.
    pub zone: ZoneId,
    /// The subject that was checked.
    pub subject: Entity,
    /// The permission that was checked.
    pub permission: String,
    /// The object that was checked.
    pub object: Entity,
}

impl DecisionKey {
    /// Builds a cache key.
    pub fn new(zone: ZoneId, subject: Entity, permission: impl Into<String>, object: Entity) -> Self {
        Self {
            zone,
            subject,
            permission: permission.into(),
            object,
        }
    }
}

/// A cached decision (spec §4.I: `(decision, revision, expiry)`).
#[derive(Debug, Clone)]
pub struct CachedDecision {
    /// Whether the subject held the permission at `revision`.
    pub allowed: bool,
    /// The zone revision this decision was computed against.
    pub revision: Revision,
    expires_at: Instant,
}

impl CachedDecision {
    fn is_expired(&self) -> bool {
        now_instant() > self.expires_at
    }
}

/// Aggregate cache occupancy (spec §4.I: `stats()`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Total entries across all shards.
    pub entries: usize,
    /// Number of shards.
    pub shards: usize,
    /// Per-shard capacity.
    pub shard_capacity: usize,
}

struct Shard {
    entries: FxHashMap<DecisionKey, CachedDecision>,
    order: VecDeque<DecisionKey>,
}

impl Default for Shard {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            order: VecDeque::new(),
        }
    }
}

fn shard_index(key: &DecisionKey, shard_count: usize) -> usize {
    let mut hasher = agentfs_std::hash::FxHasher::default();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % shard_count
}

/// Component I, generic over nothing: it only ever stores `(key, decision)`
/// pairs handed to it by the check engine or the `CacheCoordinator`.
pub struct DecisionCache {
    shards: Vec<RwLock<Shard>>,
    shard_capacity: usize,
    ttl: std::time::Duration,
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT, DEFAULT_SHARD_CAPACITY, DEFAULT_TTL)
    }
}

impl DecisionCache {
    /// Builds a cache with explicit shard count, per-shard capacity and TTL.
    pub fn new(shard_count: usize, shard_capacity: usize, ttl: std::time::Duration) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| RwLock::new(Shard::default())).collect(),
            shard_capacity,
            ttl,
        }
    }

    /// Looks up `key`. Returns `None` on a miss, an expired entry, or an
    /// entry whose recorded revision is older than `min_revision` — the
    /// caller re-evaluates and re-inserts in all three cases (spec §4.I:
    /// "returns a hit only if the cached revision >= min_revision and not
    /// expired").
    pub fn lookup(&self, key: &DecisionKey, min_revision: Revision) -> Option<CachedDecision> {
        let shard = self.shards[shard_index(key, self.shards.len())].read();
        let entry = shard.entries.get(key)?;
        if entry.is_expired() || entry.revision < min_revision {
            return None;
        }
        Some(entry.clone())
    }

    /// Records `allowed` for `key` at `at_revision`, evicting the oldest
    /// entry in the shard if it is already at capacity.
    pub fn insert(&self, key: DecisionKey, allowed: bool, at_revision: Revision) {
        let idx = shard_index(&key, self.shards.len());
        let mut shard = self.shards[idx].write();
        if !shard.entries.contains_key(&key) {
            shard.order.push_back(key.clone());
            if shard.order.len() > self.shard_capacity {
                if let Some(oldest) = shard.order.pop_front() {
                    shard.entries.remove(&oldest);
                }
            }
        }
        shard.entries.insert(
            key,
            CachedDecision {
                allowed,
                revision: at_revision,
                expires_at: now_instant() + self.ttl,
            },
        );
    }

    /// Drops every entry matching `predicate` across all shards. Returns the
    /// number of entries removed (spec §4.I: `invalidate(predicate)`;
    /// implementations MAY over-invalidate but MUST NOT under-invalidate).
    pub fn invalidate(&self, predicate: impl Fn(&DecisionKey) -> bool) -> usize {
        let mut removed = 0;
        for shard_lock in &self.shards {
            let mut shard = shard_lock.write();
            let to_remove: Vec<DecisionKey> = shard
                .entries
                .keys()
                .filter(|k| predicate(k))
                .cloned()
                .collect();
            for key in to_remove {
                shard.entries.remove(&key);
                shard.order.retain(|k| k != &key);
                removed += 1;
            }
        }
        removed
    }

    /// Drops every entry in `zone`, regardless of subject/object — the
    /// coarse fallback used when a write's blast radius can't be bounded
    /// cheaply (group-relation and hierarchy-relation writes).
    pub fn invalidate_zone(&self, zone: &ZoneId) -> usize {
        self.invalidate(|k| &k.zone == zone)
    }

    /// Current occupancy, for observability (spec §4.I: `stats()`).
    pub fn stats(&self) -> CacheStats {
        let entries = self.shards.iter().map(|s| s.read().entries.len()).sum();
        CacheStats {
            entries,
            shards: self.shards.len(),
            shard_capacity: self.shard_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> ZoneId {
        ZoneId::new("z")
    }

    fn entity(zone: &ZoneId, t: &str, id: &str) -> Entity {
        Entity::new(zone.clone(), t, id)
    }

    #[test]
    fn hit_after_insert() {
        let cache = DecisionCache::default();
        let zone = zone();
        let key = DecisionKey::new(zone.clone(), entity(&zone, "user", "a"), "read", entity(&zone, "file", "f"));
        cache.insert(key.clone(), true, Revision(3));

        let hit = cache.lookup(&key, Revision(0)).unwrap();
        assert!(hit.allowed);
        assert_eq!(hit.revision, Revision(3));
    }

    #[test]
    fn stale_min_revision_misses() {
        let cache = DecisionCache::default();
        let zone = zone();
        let key = DecisionKey::new(zone.clone(), entity(&zone, "user", "a"), "read", entity(&zone, "file", "f"));
        cache.insert(key.clone(), true, Revision(3));

        assert!(cache.lookup(&key, Revision(4)).is_none());
    }

    #[test]
    fn invalidate_by_predicate_drops_matching_entries_only() {
        let cache = DecisionCache::default();
        let zone = zone();
        let key_a = DecisionKey::new(zone.clone(), entity(&zone, "user", "a"), "read", entity(&zone, "file", "f1"));
        let key_b = DecisionKey::new(zone.clone(), entity(&zone, "user", "b"), "read", entity(&zone, "file", "f2"));
        cache.insert(key_a.clone(), true, Revision(1));
        cache.insert(key_b.clone(), true, Revision(1));

        let removed = cache.invalidate(|k| k.object.entity_id == "f1");
        assert_eq!(removed, 1);
        assert!(cache.lookup(&key_a, Revision(0)).is_none());
        assert!(cache.lookup(&key_b, Revision(0)).is_some());
    }

    #[test]
    fn shard_capacity_evicts_oldest_entry() {
        let cache = DecisionCache::new(1, 2, DEFAULT_TTL);
        let zone = zone();
        let k1 = DecisionKey::new(zone.clone(), entity(&zone, "user", "a"), "read", entity(&zone, "file", "1"));
        let k2 = DecisionKey::new(zone.clone(), entity(&zone, "user", "a"), "read", entity(&zone, "file", "2"));
        let k3 = DecisionKey::new(zone.clone(), entity(&zone, "user", "a"), "read", entity(&zone, "file", "3"));
        cache.insert(k1.clone(), true, Revision(1));
        cache.insert(k2.clone(), true, Revision(1));
        cache.insert(k3.clone(), true, Revision(1));

        assert!(cache.lookup(&k1, Revision(0)).is_none());
        assert!(cache.lookup(&k2, Revision(0)).is_some());
        assert!(cache.lookup(&k3, Revision(0)).is_some());
    }
}
