//! Transitive group-membership closure, refreshed synchronously whenever a
//! tuple on a configured group relation is written or deleted (spec §4.H:
//! "a precomputed closure table for transitively-closed relations... kept
//! current synchronously on tuple writes").

use agentfs_std::hash::{FxHashMap, FxHashSet};
use agentfs_std::ZoneId;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::tuple::Entity;

/// Direct membership edges plus a memoized reachability cache, per zone.
///
/// Edges are refcounted rather than a plain set: two different tuples can
/// imply the same `(subject, group)` edge (e.g. a user is both a direct
/// member and reachable through a nested group naming the same pair), and
/// the edge must stay live until every tuple implying it is gone.
#[derive(Default)]
struct ZoneClosure {
    edges: FxHashMap<Entity, FxHashMap<Entity, u64>>,
    memo: FxHashMap<Entity, FxHashSet<Entity>>,
}

/// Component H's supporting index: for any subject, the set of group-like
/// entities it transitively reaches via the configured group relations.
pub struct GroupClosureIndex {
    zones: DashMap<ZoneId, RwLock<ZoneClosure>>,
}

impl Default for GroupClosureIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupClosureIndex {
    /// Creates an empty closure index.
    pub fn new() -> Self {
        Self {
            zones: DashMap::new(),
        }
    }

    /// Records that `subject` directly reaches `group` (a group-relation
    /// tuple was written). Invalidates cached reachability for the zone.
    pub fn record_edge(&self, zone: &ZoneId, subject: Entity, group: Entity) {
        let entry = self.zones.entry(zone.clone()).or_default();
        let mut guard = entry.write();
        *guard.edges.entry(subject).or_default().entry(group).or_insert(0) += 1;
        guard.memo.clear();
    }

    /// Removes one reference to the `subject -> group` edge (a
    /// group-relation tuple was deleted). The edge itself is only dropped
    /// once its refcount reaches zero.
    pub fn remove_edge(&self, zone: &ZoneId, subject: &Entity, group: &Entity) {
        let Some(entry) = self.zones.get(zone) else {
            return;
        };
        let mut guard = entry.write();
        if let Some(groups) = guard.edges.get_mut(subject) {
            if let Some(count) = groups.get_mut(group) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    groups.remove(group);
                }
            }
            if groups.is_empty() {
                guard.edges.remove(subject);
            }
        }
        guard.memo.clear();
    }

    /// Returns every entity `subject` transitively reaches, computing and
    /// memoizing the result on first use after an invalidation.
    pub fn reachable(&self, zone: &ZoneId, subject: &Entity) -> FxHashSet<Entity> {
        let entry = self.zones.entry(zone.clone()).or_default();
        {
            let guard = entry.read();
            if let Some(cached) = guard.memo.get(subject) {
                return cached.clone();
            }
        }

        let mut guard = entry.write();
        // Another thread may have populated it while we waited for the lock.
        if let Some(cached) = guard.memo.get(subject) {
            return cached.clone();
        }

        let mut visited: FxHashSet<Entity> = FxHashSet::default();
        let mut stack = vec![subject.clone()];
        while let Some(current) = stack.pop() {
            let Some(direct) = guard.edges.get(&current) else {
                continue;
            };
            for group in direct.keys() {
                if visited.insert(group.clone()) {
                    stack.push(group.clone());
                }
            }
        }
        guard.memo.insert(subject.clone(), visited.clone());
        visited
    }

    /// Whether `subject` transitively reaches `group`.
    pub fn contains(&self, zone: &ZoneId, subject: &Entity, group: &Entity) -> bool {
        self.reachable(zone, subject).contains(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(zone: &ZoneId, t: &str, id: &str) -> Entity {
        Entity::new(zone.clone(), t, id)
    }

    #[test]
    fn direct_edge_is_reachable() {
        let idx = GroupClosureIndex::new();
        let zone = ZoneId::new("z");
        let alice = e(&zone, "user", "alice");
        let eng = e(&zone, "group", "eng");
        idx.record_edge(&zone, alice.clone(), eng.clone());
        assert!(idx.contains(&zone, &alice, &eng));
    }

    #[test]
    fn transitive_nested_groups_are_reachable() {
        let idx = GroupClosureIndex::new();
        let zone = ZoneId::new("z");
        let alice = e(&zone, "user", "alice");
        let eng = e(&zone, "group", "eng");
        let all = e(&zone, "group", "all");
        idx.record_edge(&zone, alice.clone(), eng.clone());
        idx.record_edge(&zone, eng.clone(), all.clone());
        assert!(idx.contains(&zone, &alice, &all));
    }

    #[test]
    fn removing_last_edge_drops_reachability() {
        let idx = GroupClosureIndex::new();
        let zone = ZoneId::new("z");
        let alice = e(&zone, "user", "alice");
        let eng = e(&zone, "group", "eng");
        idx.record_edge(&zone, alice.clone(), eng.clone());
        idx.remove_edge(&zone, &alice, &eng);
        assert!(!idx.contains(&zone, &alice, &eng));
    }

    #[test]
    fn duplicate_edge_survives_single_removal() {
        let idx = GroupClosureIndex::new();
        let zone = ZoneId::new("z");
        let alice = e(&zone, "user", "alice");
        let eng = e(&zone, "group", "eng");
        idx.record_edge(&zone, alice.clone(), eng.clone());
        idx.record_edge(&zone, alice.clone(), eng.clone());
        idx.remove_edge(&zone, &alice, &eng);
        assert!(idx.contains(&zone, &alice, &eng));
        idx.remove_edge(&zone, &alice, &eng);
        assert!(!idx.contains(&zone, &alice, &eng));
    }

    #[test]
    fn zones_do_not_leak_into_each_other() {
        let idx = GroupClosureIndex::new();
        let zone_a = ZoneId::new("a");
        let zone_b = ZoneId::new("b");
        let alice = e(&zone_a, "user", "alice");
        let eng = e(&zone_a, "group", "eng");
        idx.record_edge(&zone_a, alice.clone(), eng.clone());
        assert!(!idx.contains(&zone_b, &alice, &eng));
    }
}
