//! Component M — the VFS facade: the single path-addressed surface an
//! embedding application calls. Wires the inode layer, `ContentStore`,
//! `VersionStore` and `MountTable` (components C-F) to the cached ReBAC
//! check engine (components G-L) so every operation both resolves a path
//! and enforces a permission in one call.

use std::sync::Arc;
use std::time::Duration;

use agentfs_blob::{BlobStore, ByteStream};
use agentfs_cache::{CacheCoordinator, DecisionKey, MountVisibilityOracle, NamespaceView, MOUNT_OBJECT_TYPE};
use agentfs_core::{
    normalize_path, ChildPage, ContentStore, Inode, InodeStore, Kind, MetaPatch, Mount, MountFlags,
    MountTable, ObjectType, VersionPage, VersionStore,
};
use agentfs_metadata::MetadataStore;
use agentfs_rebac::{
    CheckEngine, ConsistencyLevel, Entity, ListOrder, NamespaceConfig, Subject, Tuple, TupleFilter, TuplePage, TupleStore,
};
use agentfs_std::hash::FxHashSet;
use agentfs_std::time::utc_now;
use agentfs_std::{AgentFsError, InodeId, Result, Revision, VersionId, ZoneId};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::AgentFsConfig;

/// Canonical permission name for reading a path's content or metadata.
pub const READ: &str = "read";
/// Canonical permission name for creating, modifying or removing a path.
pub const WRITE: &str = "write";
/// Canonical permission name for mount-table administration.
pub const ADMIN: &str = "admin";
/// Canonical relation the facade grants to the subject that creates a path.
pub const OWNER: &str = "owner";

fn mount_parent_dir(mount_point: &str) -> Option<String> {
    if mount_point == "/" {
        return None;
    }
    match mount_point.rsplit_once('/') {
        Some(("", _)) => Some("/".to_string()),
        Some((head, _)) => Some(head.to_string()),
        None => Some("/".to_string()),
    }
}

fn synthetic_mount_inode(mount: &Mount) -> Inode {
    let now = utc_now();
    Inode {
        id: InodeId(0),
        path: mount.mount_point.clone(),
        parent_id: None,
        kind: Kind::Dir,
        size: 0,
        content_hash: None,
        current_version: None,
        owner_subject: String::new(),
        created_at: now,
        modified_at: now,
        accessed_at: now,
        deleted: false,
        deleted_at: None,
        user_meta: serde_json::Map::new(),
    }
}

struct CheckEngineOracle<'a> {
    engine: &'a CheckEngine,
}

impl MountVisibilityOracle for CheckEngineOracle<'_> {
    fn can_see(&self, zone: &ZoneId, subject: &Entity, permission: &str, object: &Entity) -> Result<bool> {
        let decision = self.engine.check(zone, subject, permission, object, ConsistencyLevel::Eventual)?;
        Ok(decision.allowed)
    }
}

/// Component M, generic over the metadata and blob backends the lower
/// layers compose.
pub struct Facade<M, B> {
    pub(crate) zone: ZoneId,
    pub(crate) inodes: InodeStore<M>,
    pub(crate) content: Arc<ContentStore<M, B>>,
    pub(crate) versions: VersionStore<M, B>,
    pub(crate) mounts: MountTable<M>,
    pub(crate) cache: CacheCoordinator<M>,
    pub(crate) tuples: Arc<dyn TupleStore>,
    config: AgentFsConfig,
}

impl<M: MetadataStore + 'static, B: BlobStore + 'static> Facade<M, B> {
    /// Wires every lower-layer component together for one zone. The caller
    /// owns the namespace schema (`NamespaceConfig`) and names which
    /// relations are group or hierarchy relations, since only the embedder
    /// knows its own ReBAC model; the facade itself is namespace-agnostic
    /// beyond the `read`/`write`/`admin`/`owner` names it uses for its own
    /// path operations.
    pub fn new(
        zone: ZoneId,
        metadata: Arc<M>,
        blobs: Arc<B>,
        tuples: Arc<dyn TupleStore>,
        namespace: NamespaceConfig,
        group_relations: impl IntoIterator<Item = String>,
        hierarchy_relations: impl IntoIterator<Item = String>,
        config: AgentFsConfig,
    ) -> Self {
        let group_relations: Vec<String> = group_relations.into_iter().collect();
        let hierarchy_relations: Vec<String> = hierarchy_relations.into_iter().collect();

        let check = Arc::new(
            CheckEngine::new(tuples.clone(), namespace, group_relations.clone())
                .with_bounds(config.check.max_depth, config.check.max_fan_out, config.check.timeout()),
        );
        let cache = CacheCoordinator::new(check, metadata.clone(), group_relations, hierarchy_relations)
            .with_l3_retry(config.l3_retry.retries, Duration::from_millis(config.l3_retry.backoff_ms));
        let content = Arc::new(ContentStore::new(metadata.clone(), blobs));

        Self {
            inodes: InodeStore::new(metadata.clone()),
            versions: VersionStore::new(metadata.clone(), content.clone()),
            mounts: MountTable::new(metadata),
            content,
            cache,
            tuples,
            zone,
            config,
        }
    }

    /// The zone this facade instance serves.
    pub fn zone(&self) -> &ZoneId {
        &self.zone
    }

    /// The configuration this facade was built with.
    pub fn config(&self) -> &AgentFsConfig {
        &self.config
    }

    /// The wrapped cache coordinator, for callers that need the raw cache
    /// tiers directly (e.g. a periodic GC task calling `l1().stats()`).
    pub fn cache(&self) -> &CacheCoordinator<M> {
        &self.cache
    }

    fn root_mount_entity(&self) -> Entity {
        Entity::new(self.zone.clone(), MOUNT_OBJECT_TYPE, "/".to_string())
    }

    fn path_object(&self, path: &str) -> Result<(agentfs_core::Resolution, Entity)> {
        let normalized = normalize_path(path)?;
        let resolution = self.mounts.resolve(&self.zone, &normalized)?;
        let object = Entity::new(self.zone.clone(), resolution.mount.object_type.clone(), normalized);
        Ok((resolution, object))
    }

    fn check_cached(&self, subject: &Entity, permission: &str, object: &Entity, min_revision: Revision) -> Result<bool> {
        let key = DecisionKey::new(self.zone.clone(), subject.clone(), permission, object.clone());
        if let Some(cached) = self.cache.l1().lookup(&key, min_revision) {
            tracing::debug!(%subject, permission, %object, cache_hit = true, allowed = cached.allowed, "permission check");
            return Ok(cached.allowed);
        }
        let consistency = if min_revision == Revision::ZERO {
            ConsistencyLevel::Eventual
        } else {
            ConsistencyLevel::Bounded(min_revision)
        };
        let decision = self.cache.check_engine().check(&self.zone, subject, permission, object, consistency)?;
        self.cache.l1().insert(key, decision.allowed, decision.revision);
        tracing::debug!(%subject, permission, %object, cache_hit = false, allowed = decision.allowed, reason = %decision.decision_reason, "permission check");
        Ok(decision.allowed)
    }

    /// Evaluates a permission, going through L1 for `Eventual`/`Bounded`
    /// consistency and bypassing it entirely for `Strong` (spec §4.I: the
    /// cache only ever serves already-observed revisions, never the
    /// guaranteed-latest one `Strong` asks for).
    pub fn check_permission(&self, subject: &Entity, permission: &str, object: &Entity, consistency: ConsistencyLevel) -> Result<bool> {
        match consistency {
            ConsistencyLevel::Strong => {
                let decision = self.cache.check_engine().check(&self.zone, subject, permission, object, ConsistencyLevel::Strong)?;
                Ok(decision.allowed)
            }
            ConsistencyLevel::Eventual => self.check_cached(subject, permission, object, Revision::ZERO),
            ConsistencyLevel::Bounded(token) => self.check_cached(subject, permission, object, token),
        }
    }

    fn require_permission(&self, subject: &Entity, permission: &str, object: &Entity, consistency: ConsistencyLevel) -> Result<()> {
        if self.check_permission(subject, permission, object, consistency)? {
            Ok(())
        } else {
            Err(AgentFsError::PermissionDenied(format!("{subject} lacks {permission} on {object}")))
        }
    }

    fn grant_owner(&self, subject: &Entity, object: Entity) -> Result<()> {
        self.cache.write_tuple(Tuple {
            subject: Subject::Direct(subject.clone()),
            relation: OWNER.to_string(),
            object,
            zone: self.zone.clone(),
            caveat: None,
            expiry: None,
            revision: Revision::ZERO,
        })?;
        Ok(())
    }

    /// Reads a file's current content, gated on `read`.
    pub async fn read(&self, subject: &Entity, path: &str, consistency: ConsistencyLevel) -> Result<ByteStream> {
        let (_, object) = self.path_object(path)?;
        self.require_permission(subject, READ, &object, consistency)?;
        let inode = self
            .inodes
            .lookup(&self.zone, path)?
            .ok_or_else(|| AgentFsError::NotFound(format!("no inode at {path}")))?;
        if inode.kind != Kind::File {
            return Err(AgentFsError::InvalidArgument(format!("{path} is not a file")));
        }
        let hash = inode
            .content_hash
            .ok_or_else(|| AgentFsError::NotFound(format!("{path} has no content yet")))?;
        self.content.get(&self.zone, &hash).await
    }

    /// Writes a file's content, gated on `write`. Creates the inode if it
    /// doesn't already exist, granting the writer an `owner` tuple in that
    /// case (the grant is what the facade's own read-path checks against
    /// later, not just `owner_subject` bookkeeping on the inode record).
    pub async fn write(&self, subject: &Entity, path: &str, stream: ByteStream) -> Result<Inode> {
        let (resolution, object) = self.path_object(path)?;
        self.require_permission(subject, WRITE, &object, ConsistencyLevel::Eventual)?;
        if resolution.mount.flags.read_only {
            return Err(AgentFsError::PermissionDenied(format!(
                "mount {} is read-only",
                resolution.mount.mount_point
            )));
        }

        let (hash, size) = self.content.put(&self.zone, stream).await?;
        let (inode, created) = match self.inodes.lookup(&self.zone, path)? {
            Some(existing) => (existing, false),
            None => (self.inodes.create(&self.zone, path, Kind::File, &subject.entity_id)?, true),
        };

        let version_id = match self.versions.append(&self.zone, inode.id, hash, &subject.entity_id) {
            Ok(id) => id,
            Err(e) => {
                let _ = self.content.decref(&self.zone, &hash);
                return Err(e);
            }
        };

        let updated = self.inodes.update_meta(
            &self.zone,
            inode.id,
            MetaPatch {
                size: Some(size),
                content_hash: Some(hash),
                current_version: Some(version_id),
                ..Default::default()
            },
        )?;

        if created {
            self.grant_owner(subject, object)?;
        }
        Ok(updated)
    }

    /// Lists a directory's children, gated on `read`, merging in any mount
    /// points rooted directly under `path` that `subject` can see (spec
    /// §4.F/§4.J: mounts are visible filesystem entries, not just routing
    /// table rows). Mount entries are appended to the first page only, since
    /// a zone's mount count is expected to be small relative to its file
    /// count.
    pub fn list(&self, subject: &Entity, path: &str, after_key: Option<Vec<u8>>, limit: usize, consistency: ConsistencyLevel) -> Result<ChildPage> {
        let (_, object) = self.path_object(path)?;
        self.require_permission(subject, READ, &object, consistency)?;

        let first_page = after_key.is_none();
        let mut page = self.inodes.list_children(&self.zone, path, after_key, limit)?;

        if first_page {
            let normalized = normalize_path(path)?;
            let view = self.list_mounts(subject, consistency)?;
            for mount in view.mounts {
                if mount_parent_dir(&mount.mount_point).as_deref() == Some(normalized.as_str()) {
                    page.entries.push(synthetic_mount_inode(&mount));
                }
            }
            page.entries.sort_by(|a, b| a.path.cmp(&b.path));
        }

        Ok(page)
    }

    /// Deletes a path, gated on `write`. A non-empty directory cannot be
    /// deleted directly.
    pub fn delete(&self, subject: &Entity, path: &str) -> Result<()> {
        let (_, object) = self.path_object(path)?;
        self.require_permission(subject, WRITE, &object, ConsistencyLevel::Eventual)?;
        let inode = self
            .inodes
            .lookup(&self.zone, path)?
            .ok_or_else(|| AgentFsError::NotFound(format!("no inode at {path}")))?;

        if inode.kind == Kind::Dir {
            let children = self.inodes.list_children(&self.zone, path, None, 1)?;
            if !children.entries.is_empty() {
                return Err(AgentFsError::InvalidArgument(format!("{path} is not empty")));
            }
        } else if let Some(hash) = inode.content_hash {
            self.content.decref(&self.zone, &hash)?;
        }

        self.inodes.soft_delete(&self.zone, inode.id)?;
        Ok(())
    }

    /// Renames a path, gated on `write` at both the source and destination.
    /// Crossing mounts is only allowed between mounts that share the same
    /// backend and object type (spec §4.C); anything else is a
    /// `CrossMountRename`.
    pub fn rename(&self, subject: &Entity, from: &str, to: &str) -> Result<Inode> {
        let (from_resolution, from_object) = self.path_object(from)?;
        let (to_resolution, to_object) = self.path_object(to)?;
        self.require_permission(subject, WRITE, &from_object, ConsistencyLevel::Eventual)?;
        self.require_permission(subject, WRITE, &to_object, ConsistencyLevel::Eventual)?;

        if from_resolution.mount.mount_point != to_resolution.mount.mount_point
            && (from_resolution.mount.backend_id != to_resolution.mount.backend_id
                || from_resolution.mount.object_type != to_resolution.mount.object_type)
        {
            return Err(AgentFsError::CrossMountRename(format!(
                "{from} (mount {}) and {to} (mount {}) are not rename-compatible",
                from_resolution.mount.mount_point, to_resolution.mount.mount_point
            )));
        }

        let inode = self
            .inodes
            .lookup(&self.zone, from)?
            .ok_or_else(|| AgentFsError::NotFound(format!("no inode at {from}")))?;
        self.inodes.rename(&self.zone, inode.id, to)
    }

    /// Creates a directory, gated on `write`. Idempotent: creating an
    /// already-existing directory succeeds and returns it unchanged;
    /// creating over a non-directory fails with `AlreadyExists`. Grants the
    /// creator `owner` on the new directory, the same as `write` does for
    /// newly-created files.
    pub fn mkdir(&self, subject: &Entity, path: &str) -> Result<Inode> {
        let (resolution, object) = self.path_object(path)?;
        self.require_permission(subject, WRITE, &object, ConsistencyLevel::Eventual)?;
        if resolution.mount.flags.read_only {
            return Err(AgentFsError::PermissionDenied(format!(
                "mount {} is read-only",
                resolution.mount.mount_point
            )));
        }

        if let Some(existing) = self.inodes.lookup(&self.zone, path)? {
            return if existing.kind == Kind::Dir {
                Ok(existing)
            } else {
                Err(AgentFsError::AlreadyExists(format!("{path} exists and is not a directory")))
            };
        }

        let inode = self.inodes.create(&self.zone, path, Kind::Dir, &subject.entity_id)?;
        self.grant_owner(subject, object)?;
        Ok(inode)
    }

    /// Whether `path` both exists and `subject` can `read` it. Returns
    /// `false` rather than `PermissionDenied` on a failed check, since
    /// existence itself is the question being asked.
    pub fn exists(&self, subject: &Entity, path: &str, consistency: ConsistencyLevel) -> Result<bool> {
        let (_, object) = self.path_object(path)?;
        if !self.check_permission(subject, READ, &object, consistency)? {
            return Ok(false);
        }
        Ok(self.inodes.lookup(&self.zone, path)?.is_some())
    }

    /// Returns a path's inode record, gated on `read`.
    pub fn stat(&self, subject: &Entity, path: &str, consistency: ConsistencyLevel) -> Result<Inode> {
        let (_, object) = self.path_object(path)?;
        self.require_permission(subject, READ, &object, consistency)?;
        self.inodes
            .lookup(&self.zone, path)?
            .ok_or_else(|| AgentFsError::NotFound(format!("no inode at {path}")))
    }

    /// Lists a file's version history, gated on `read`.
    pub fn versions(&self, subject: &Entity, path: &str, after_key: Option<Vec<u8>>, limit: usize) -> Result<VersionPage> {
        let (_, object) = self.path_object(path)?;
        self.require_permission(subject, READ, &object, ConsistencyLevel::Eventual)?;
        let inode = self
            .inodes
            .lookup(&self.zone, path)?
            .ok_or_else(|| AgentFsError::NotFound(format!("no inode at {path}")))?;
        self.versions.list(&self.zone, inode.id, after_key, limit)
    }

    /// Restores a file to a prior version, gated on `write`. History is
    /// never rewritten: this appends a new head version pointing at the old
    /// content hash.
    pub fn restore(&self, subject: &Entity, path: &str, version_id: VersionId) -> Result<Inode> {
        let (resolution, object) = self.path_object(path)?;
        self.require_permission(subject, WRITE, &object, ConsistencyLevel::Eventual)?;
        if resolution.mount.flags.read_only {
            return Err(AgentFsError::PermissionDenied(format!(
                "mount {} is read-only",
                resolution.mount.mount_point
            )));
        }

        let inode = self
            .inodes
            .lookup(&self.zone, path)?
            .ok_or_else(|| AgentFsError::NotFound(format!("no inode at {path}")))?;
        let new_version_id = self.versions.restore(&self.zone, inode.id, version_id, &subject.entity_id)?;
        let version = self
            .versions
            .load(&self.zone, inode.id, new_version_id)?
            .ok_or_else(|| AgentFsError::Corrupt("restored version vanished immediately after append".to_string()))?;
        let size = self.content.size(&self.zone, &version.content_hash)?.unwrap_or(0);

        self.inodes.update_meta(
            &self.zone,
            inode.id,
            MetaPatch {
                size: Some(size),
                content_hash: Some(version.content_hash),
                current_version: Some(new_version_id),
                ..Default::default()
            },
        )
    }

    /// Streams a file's lines and returns the ones matching `pattern`,
    /// gated on `read` (via the underlying `read` call). Lines, not the
    /// whole file, are held in memory at once.
    pub async fn grep(&self, subject: &Entity, path: &str, pattern: &str) -> Result<Vec<String>> {
        let regex = Regex::new(pattern).map_err(|e| AgentFsError::InvalidArgument(format!("invalid pattern: {e}")))?;
        let stream = self.read(subject, path, ConsistencyLevel::Eventual).await?;
        let mut lines = BufReader::new(stream).lines();
        let mut matches = Vec::new();
        while let Some(line) = lines.next_line().await.map_err(AgentFsError::from)? {
            if regex.is_match(&line) {
                matches.push(line);
            }
        }
        Ok(matches)
    }

    /// Reclaims content blobs tombstoned for longer than the configured
    /// grace window (spec §4.D: "grace window is configurable, minimum
    /// 60s"), using `config().gc.content_grace()`. Not scheduled by the
    /// facade itself; callers run this periodically or via the CLI.
    /// Returns the number of blobs actually removed.
    pub async fn gc(&self) -> Result<u64> {
        self.content.sweep_tombstones(&self.zone, self.config.gc.content_grace()).await
    }

    /// Adds a mount, gated on `admin` over the zone's root mount policy
    /// object.
    pub fn mount(&self, subject: &Entity, mount_point: &str, backend_id: &str, object_type: ObjectType, flags: MountFlags) -> Result<Mount> {
        self.require_permission(subject, ADMIN, &self.root_mount_entity(), ConsistencyLevel::Eventual)?;
        let mount = self.mounts.add_mount(&self.zone, mount_point, backend_id, object_type, flags)?;
        self.cache.l2().invalidate_zone(&self.zone);
        Ok(mount)
    }

    /// Removes a mount, gated on `admin` over the zone's root mount policy
    /// object.
    pub fn unmount(&self, subject: &Entity, mount_point: &str) -> Result<()> {
        self.require_permission(subject, ADMIN, &self.root_mount_entity(), ConsistencyLevel::Eventual)?;
        self.mounts.remove_mount(&self.zone, mount_point)?;
        self.cache.l2().invalidate_zone(&self.zone);
        Ok(())
    }

    /// Returns the mounts `subject` can see, read-through the L2 namespace
    /// cache (spec §4.J).
    pub fn list_mounts(&self, subject: &Entity, consistency: ConsistencyLevel) -> Result<NamespaceView> {
        let candidates = self.mounts.list_mounts(&self.zone)?;
        let current = self.cache.check_engine().zone_revision(&self.zone);
        let min_revision = match consistency {
            ConsistencyLevel::Strong => current,
            ConsistencyLevel::Bounded(token) => token,
            ConsistencyLevel::Eventual => Revision::ZERO,
        };
        let oracle = CheckEngineOracle {
            engine: self.cache.check_engine(),
        };
        self.cache
            .l2()
            .visible_mounts(&self.zone, subject, min_revision, current, candidates, "list", &oracle)
    }

    /// Writes a ReBAC tuple directly, running the full cache invalidation
    /// protocol (spec §4.L).
    pub fn rebac_write(&self, tuple: Tuple) -> Result<Revision> {
        self.cache.write_tuple(tuple)
    }

    /// Deletes a ReBAC tuple directly, running the same invalidation
    /// protocol as `rebac_write`.
    pub fn rebac_delete(&self, subject: &Subject, relation: &str, object: &Entity) -> Result<Revision> {
        self.cache.delete_tuple(&self.zone, subject, relation, object)
    }

    /// Evaluates an arbitrary permission check, independent of path
    /// resolution (e.g. checking a relation the facade's own path
    /// operations never name).
    pub fn rebac_check(&self, subject: &Entity, permission: &str, object: &Entity, consistency: ConsistencyLevel) -> Result<bool> {
        self.check_permission(subject, permission, object, consistency)
    }

    /// Returns every subject holding `permission` on `object`.
    pub fn rebac_expand(&self, object: &Entity, permission: &str) -> Result<FxHashSet<Entity>> {
        self.cache.check_engine().expand(&self.zone, object, permission)
    }

    /// Lists raw tuples matching `filter`, bypassing the check engine
    /// entirely (an audit/debugging surface, not a permission check).
    /// `order` only re-sorts the returned page; `next_cursor` always
    /// refers to key-order position, so paginating through `WriteOrder`
    /// still requires following cursors in the store's natural order.
    pub fn rebac_list_tuples(&self, filter: &TupleFilter, after_key: Option<Vec<u8>>, limit: usize, order: ListOrder) -> Result<TuplePage> {
        let mut page = self.tuples.list(&self.zone, filter, after_key, limit)?;
        if order == ListOrder::WriteOrder {
            page.entries.sort_by_key(|tuple| tuple.revision);
        }
        Ok(page)
    }

    /// A content blob's current refcount, or `None` if untracked (spec §8's
    /// dedup invariant made observable to callers, not just internal to the
    /// content layer).
    pub fn content_refcount(&self, hash: &agentfs_std::ContentHash) -> Result<Option<u64>> {
        self.content.refcount(&self.zone, hash)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentfs_blob::InMemoryBlobStore;
    use agentfs_metadata::InMemoryMetadataStore;
    use agentfs_rebac::{InMemoryTupleStore, NamespaceConfig, RewriteRule};

    use super::*;
    use crate::config::AgentFsConfig;

    fn facade() -> (Facade<InMemoryMetadataStore, InMemoryBlobStore>, ZoneId) {
        let zone = ZoneId::new("zone-a");
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let tuples: Arc<dyn TupleStore> = Arc::new(InMemoryTupleStore::new(metadata.clone()));
        let mut namespace = NamespaceConfig::new();
        namespace.define("file", READ, RewriteRule::This);
        let facade = Facade::new(
            zone.clone(),
            metadata,
            blobs,
            tuples,
            namespace,
            Vec::<String>::new(),
            Vec::<String>::new(),
            AgentFsConfig::default(),
        );
        (facade, zone)
    }

    #[test]
    fn rebac_list_tuples_write_order_sorts_by_revision_not_key() {
        let (facade, zone) = facade();
        let alice = Entity::new(zone.clone(), "user", "alice");
        // Write to "b" before "a" so key order and write order disagree.
        let object_b = Entity::new(zone.clone(), "file", "/b");
        let object_a = Entity::new(zone.clone(), "file", "/a");
        let first = facade
            .rebac_write(Tuple {
                subject: Subject::Direct(alice.clone()),
                relation: READ.to_string(),
                object: object_b,
                zone: zone.clone(),
                caveat: None,
                expiry: None,
                revision: Revision::ZERO,
            })
            .unwrap();
        let second = facade
            .rebac_write(Tuple {
                subject: Subject::Direct(alice),
                relation: READ.to_string(),
                object: object_a,
                zone,
                caveat: None,
                expiry: None,
                revision: Revision::ZERO,
            })
            .unwrap();
        assert!(first < second);

        let page = facade.rebac_list_tuples(&TupleFilter::default(), None, 16, ListOrder::WriteOrder).unwrap();
        let revisions: Vec<Revision> = page.entries.iter().map(|t| t.revision).collect();
        let mut sorted = revisions.clone();
        sorted.sort();
        assert_eq!(revisions, sorted, "WriteOrder must yield a revision-sorted page");
    }

    #[test]
    fn content_refcount_is_none_for_an_unknown_hash() {
        let (facade, _zone) = facade();
        let hash = agentfs_std::ContentHash::of(b"never written");
        assert_eq!(facade.content_refcount(&hash).unwrap(), None);
    }
}
