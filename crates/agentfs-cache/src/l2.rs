//! Component J — the L2 namespace / mount-view cache: per-`(subject, zone)`,
//! the set of mounts and path prefixes a subject can see, derived from a
//! ReBAC expansion over mount objects (spec §4.J).

use agentfs_core::Mount;
use agentfs_rebac::Entity;
use agentfs_std::hash::FxHashSet;
use agentfs_std::{Result, Revision, ZoneId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// The policy object type used to check whether a subject may see a mount
/// at all, distinct from the per-path `object_type` a mount serves (spec
/// §4.F names the latter; the former — whether the mount itself is even
/// listed — is this crate's own addition, resolved the same way as the
/// mount-point key: one ReBAC object per mount, typed `mount`).
pub const MOUNT_OBJECT_TYPE: &str = "mount";

fn mount_entity(zone: &ZoneId, mount: &Mount) -> Entity {
    Entity::new(zone.clone(), MOUNT_OBJECT_TYPE, mount.mount_point.clone())
}

/// A subject's visible slice of the mount table, as of `revision` (spec
/// §4.J contract: `visible_mounts`, `visible_prefixes`).
#[derive(Debug, Clone)]
pub struct NamespaceView {
    /// Mounts the subject can see, longest-prefix first (same order
    /// `MountTable::list_mounts` already provides).
    pub mounts: Vec<Mount>,
    /// Path prefixes the subject can see (each visible mount's point).
    pub prefixes: FxHashSet<String>,
    /// The zone revision this view was computed against.
    pub revision: Revision,
}

impl NamespaceView {
    fn from_mounts(mounts: Vec<Mount>, revision: Revision) -> Self {
        let prefixes = mounts.iter().map(|m| m.mount_point.clone()).collect();
        Self {
            mounts,
            prefixes,
            revision,
        }
    }
}

/// A function that decides whether `subject` holds `permission` on `object`
/// (component J is wired against `agentfs-rebac::CheckEngine::check`
/// through this narrow interface so it doesn't need to know about
/// consistency levels or `CheckDecision`).
pub trait MountVisibilityOracle {
    /// Returns whether `subject` holds `permission` on `object` (a
    /// `mount`-typed entity).
    fn can_see(&self, zone: &ZoneId, subject: &Entity, permission: &str, object: &Entity) -> Result<bool>;
}

#[derive(Eq, PartialEq, Hash, Clone)]
struct CacheKey {
    zone: ZoneId,
    subject: Entity,
}

/// Component J. Holds no reference to the mount table or check engine
/// directly; callers supply both on a miss via [`Self::visible_mounts`].
#[derive(Default)]
pub struct NamespaceCache {
    views: RwLock<HashMap<CacheKey, NamespaceView>>,
}

impl NamespaceCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached view for `(subject, zone)` if its revision is at
    /// least `min_revision`.
    pub fn lookup(&self, zone: &ZoneId, subject: &Entity, min_revision: Revision) -> Option<NamespaceView> {
        let key = CacheKey {
            zone: zone.clone(),
            subject: subject.clone(),
        };
        let views = self.views.read();
        let view = views.get(&key)?;
        if view.revision < min_revision {
            return None;
        }
        Some(view.clone())
    }

    /// Computes (if not already cached at `min_revision`) and returns the
    /// mounts `subject` can see in `zone`, using `oracle` to decide
    /// per-mount visibility and `candidate_mounts` for the full mount list
    /// to filter (typically `MountTable::list_mounts`, already in
    /// longest-prefix order).
    pub fn visible_mounts(
        &self,
        zone: &ZoneId,
        subject: &Entity,
        min_revision: Revision,
        at_revision: Revision,
        candidate_mounts: Vec<Mount>,
        permission: &str,
        oracle: &dyn MountVisibilityOracle,
    ) -> Result<NamespaceView> {
        if let Some(cached) = self.lookup(zone, subject, min_revision) {
            return Ok(cached);
        }

        let mut visible = Vec::with_capacity(candidate_mounts.len());
        for mount in candidate_mounts {
            let object = mount_entity(zone, &mount);
            if oracle.can_see(zone, subject, permission, &object)? {
                visible.push(mount);
            }
        }
        let view = NamespaceView::from_mounts(visible, at_revision);

        let key = CacheKey {
            zone: zone.clone(),
            subject: subject.clone(),
        };
        self.views.write().insert(key, view.clone());
        Ok(view)
    }

    /// Drops the cached view for exactly one `(subject, zone)` pair.
    pub fn invalidate_subject(&self, zone: &ZoneId, subject: &Entity) {
        let key = CacheKey {
            zone: zone.clone(),
            subject: subject.clone(),
        };
        self.views.write().remove(&key);
    }

    /// Drops every cached view matching `predicate` — the general form used
    /// by the `CacheCoordinator` when a write's affected subjects can't be
    /// narrowed to one entity (e.g. a group-relation change).
    pub fn invalidate(&self, predicate: impl Fn(&ZoneId, &Entity) -> bool) -> usize {
        let mut views = self.views.write();
        let to_remove: Vec<CacheKey> = views
            .keys()
            .filter(|k| predicate(&k.zone, &k.subject))
            .cloned()
            .collect();
        for key in &to_remove {
            views.remove(key);
        }
        to_remove.len()
    }

    /// Drops every cached view in `zone`.
    pub fn invalidate_zone(&self, zone: &ZoneId) -> usize {
        self.invalidate(|z, _| z == zone)
    }
}
