//! Component G — the ReBAC tuple store: `(subject, relation, object, zone)`
//! relationship facts, with tenant isolation enforced on write.

use std::sync::Arc;

use agentfs_metadata::{Batch, MetadataStore, Precondition, ScanPage};
use agentfs_std::time::UtcDateTime;
use agentfs_std::{AgentFsError, Result, Revision, ZoneId};
use serde::{Deserialize, Serialize};

/// An addressable entity: `(entity_type, entity_id)`, scoped to a zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    /// The zone this entity belongs to.
    pub zone: ZoneId,
    /// The entity's type, e.g. `user`, `group`, `file`, `database:table`.
    pub entity_type: String,
    /// The entity's id within its type.
    pub entity_id: String,
}

impl Entity {
    /// Builds an entity reference.
    pub fn new(zone: impl Into<ZoneId>, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    fn encode(&self) -> String {
        format!("{}:{}", self.entity_type, self.entity_id)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.zone, self.encode())
    }
}

/// A tuple's subject: either a direct entity, or a userset — "everyone who
/// holds `relation` on `entity`" — used to model group membership (spec
/// §3, `Tuple`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// A single entity.
    Direct(Entity),
    /// Every subject holding `relation` on `entity`.
    Userset {
        /// The entity the userset is defined on.
        entity: Entity,
        /// The relation defining userset membership.
        relation: String,
    },
}

impl Subject {
    /// The entity backing this subject (the userset's own entity, for a
    /// userset subject).
    pub fn entity(&self) -> &Entity {
        match self {
            Subject::Direct(e) => e,
            Subject::Userset { entity, .. } => entity,
        }
    }

    fn encode(&self) -> String {
        match self {
            Subject::Direct(e) => format!("direct:{}", e.encode()),
            Subject::Userset { entity, relation } => {
                format!("userset:{}#{relation}", entity.encode())
            }
        }
    }
}

/// A boolean predicate attached to a tuple, evaluated at check time (spec
/// §4.G).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Caveat {
    /// The tuple is only valid while `now < not_after`. Distinct from the
    /// tuple's own `expiry` field: a caveat is evaluated per-check (and can
    /// in principle carry richer context in the future), while `expiry` is
    /// a simple absolute cutoff the store itself can use for GC.
    NotAfter(UtcDateTime),
}

impl Caveat {
    /// Evaluates the caveat against the current time.
    pub fn holds(&self, now: UtcDateTime) -> bool {
        match self {
            Caveat::NotAfter(deadline) => now < *deadline,
        }
    }
}

/// A single ReBAC relationship fact (spec §3, `Tuple`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    /// Who holds the relation.
    pub subject: Subject,
    /// The relation's name.
    pub relation: String,
    /// What the relation is held on.
    pub object: Entity,
    /// The zone this tuple was written in.
    pub zone: ZoneId,
    /// Optional evaluated-at-check-time predicate.
    pub caveat: Option<Caveat>,
    /// Optional absolute expiry.
    #[serde(default)]
    pub expiry: Option<UtcDateTime>,
    /// The revision this tuple was last written at.
    pub revision: Revision,
}

impl Tuple {
    fn key(&self) -> Vec<u8> {
        tuple_key(&self.zone, &self.object, &self.relation, &self.subject)
    }
}

fn tuple_key(zone: &ZoneId, object: &Entity, relation: &str, subject: &Subject) -> Vec<u8> {
    format!(
        "rebac/tuple/{}/{}/{}/{}",
        zone.0,
        object.encode(),
        relation,
        subject.encode()
    )
    .into_bytes()
}

fn object_relation_prefix(zone: &ZoneId, object: &Entity, relation: &str) -> Vec<u8> {
    format!("rebac/tuple/{}/{}/{}/", zone.0, object.encode(), relation).into_bytes()
}

fn zone_prefix(zone: &ZoneId) -> Vec<u8> {
    format!("rebac/tuple/{}/", zone.0).into_bytes()
}

/// Selects which tuples [`InMemoryTupleStore::list`] returns. Every
/// populated field is an AND condition.
#[derive(Debug, Clone, Default)]
pub struct TupleFilter {
    /// Restrict to this subject.
    pub subject: Option<Subject>,
    /// Restrict to this relation.
    pub relation: Option<String>,
    /// Restrict to this object.
    pub object: Option<Entity>,
}

impl TupleFilter {
    fn matches(&self, tuple: &Tuple) -> bool {
        if let Some(subject) = &self.subject {
            if &tuple.subject != subject {
                return false;
            }
        }
        if let Some(relation) = &self.relation {
            if &tuple.relation != relation {
                return false;
            }
        }
        if let Some(object) = &self.object {
            if &tuple.object != object {
                return false;
            }
        }
        true
    }
}

/// A page of [`TupleStore::list`] results.
pub struct TuplePage {
    /// Matching tuples.
    pub entries: Vec<Tuple>,
    /// Cursor to resume from.
    pub next_cursor: Option<Vec<u8>>,
}

/// How [`crate::Facade::rebac_list_tuples`] orders a page's entries (spec's
/// Open Question on `rebac_list_tuples` ordering, resolved in
/// `SPEC_FULL.md`). The default is key order, the store's natural order and
/// the cheapest to produce; `WriteOrder` re-sorts the already-fetched page
/// by `revision` for callers that want a write-history view. Pagination
/// cursors always refer to key-order position regardless of `order`, since
/// the underlying scan is never re-ordered, only the returned page is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListOrder {
    /// The store's natural key order.
    #[default]
    KeyOrder,
    /// Sorted by `revision`, oldest write first.
    WriteOrder,
}

/// Component G's contract (spec §4.G).
pub trait TupleStore: Send + Sync {
    /// Writes a tuple, enforcing uniqueness and tenant isolation. Returns
    /// the zone revision the write committed at.
    fn write(&self, tuple: Tuple) -> Result<Revision>;

    /// Deletes a tuple identified by `(subject, relation, object, zone)`.
    /// Returns the zone revision the delete committed at. Not an error if
    /// the tuple did not exist (returns the current revision unchanged).
    fn delete(&self, zone: &ZoneId, subject: &Subject, relation: &str, object: &Entity) -> Result<Revision>;

    /// Lists tuples matching `filter`, scoped to `zone`, key-ordered by
    /// default (spec's Open Question on `rebac_list_tuples` ordering is
    /// resolved as key order; see `SPEC_FULL.md`).
    fn list(
        &self,
        zone: &ZoneId,
        filter: &TupleFilter,
        after_key: Option<Vec<u8>>,
        limit: usize,
    ) -> Result<TuplePage>;

    /// Reads the exact tuple `(subject, relation, object)` in `zone`, if
    /// present and (when given) committed at or after `min_revision`.
    fn read_at(
        &self,
        zone: &ZoneId,
        subject: &Subject,
        relation: &str,
        object: &Entity,
        min_revision: Option<Revision>,
    ) -> Result<Option<Tuple>>;

    /// Lists every direct tuple for `(object, relation)` in `zone` — the
    /// primary access pattern the check engine's `this` rule and
    /// `tuple_to_userset` pivot use. More efficient than `list` with an
    /// object+relation filter because it is backed by a dedicated key
    /// prefix rather than a full zone scan.
    fn tuples_for_object_relation(
        &self,
        zone: &ZoneId,
        object: &Entity,
        relation: &str,
    ) -> Result<Vec<Tuple>>;

    /// The zone's current metadata revision, used to stamp
    /// [`crate::check::CheckDecision::revision`] and to resolve
    /// `ConsistencyLevel::Bounded`.
    fn current_revision(&self, zone: &ZoneId) -> Revision;
}

/// An in-process [`TupleStore`] over any [`MetadataStore`].
pub struct InMemoryTupleStore<S> {
    store: Arc<S>,
}

impl<S: MetadataStore> InMemoryTupleStore<S> {
    /// Wraps a metadata store with the tuple store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: MetadataStore> TupleStore for InMemoryTupleStore<S> {
    fn write(&self, mut tuple: Tuple) -> Result<Revision> {
        if tuple.subject.entity().zone != tuple.zone || tuple.object.zone != tuple.zone {
            return Err(AgentFsError::CrossTenant(format!(
                "tuple zone {} does not match subject/object zone",
                tuple.zone
            )));
        }
        let key = tuple.key();
        loop {
            let existing = self.store.get(&key)?;
            let precondition = match &existing {
                Some(v) => Precondition::ValueEquals(v.clone()),
                None => Precondition::Absent,
            };
            let revision_before = self.store.current_revision(&tuple.zone);
            tuple.revision = revision_before.next();
            let value = serde_json::to_vec(&tuple)
                .map_err(|e| AgentFsError::InvalidArgument(e.to_string()))?;
            let batch = Batch::new().put_if(key.clone(), value, precondition);
            match self.store.batch(&tuple.zone, batch) {
                Ok(result) => return Ok(result.revision),
                Err(AgentFsError::CasFailure(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn delete(
        &self,
        zone: &ZoneId,
        subject: &Subject,
        relation: &str,
        object: &Entity,
    ) -> Result<Revision> {
        let key = tuple_key(zone, object, relation, subject);
        let Some(existing) = self.store.get(&key)? else {
            return Ok(self.store.current_revision(zone));
        };
        let batch = Batch::new().delete_if(key, Precondition::ValueEquals(existing));
        let result = self.store.batch(zone, batch)?;
        Ok(result.revision)
    }

    fn list(
        &self,
        zone: &ZoneId,
        filter: &TupleFilter,
        after_key: Option<Vec<u8>>,
        limit: usize,
    ) -> Result<TuplePage> {
        let prefix = match &filter.object {
            Some(object) => match &filter.relation {
                Some(relation) => object_relation_prefix(zone, object, relation),
                None => format!("rebac/tuple/{}/{}/", zone.0, object.encode()).into_bytes(),
            },
            None => zone_prefix(zone),
        };

        let mut entries = Vec::new();
        let mut cursor = after_key;
        loop {
            let ScanPage {
                entries: page_entries,
                next_cursor,
            } = self
                .store
                .prefix_scan(&prefix, limit.max(1), cursor.as_deref())?;
            let exhausted = next_cursor.is_none();
            for (_, value) in page_entries {
                let tuple: Tuple = serde_json::from_slice(&value)
                    .map_err(|e| AgentFsError::Corrupt(format!("tuple record: {e}")))?;
                if filter.matches(&tuple) {
                    entries.push(tuple);
                    if entries.len() == limit {
                        return Ok(TuplePage {
                            entries,
                            next_cursor,
                        });
                    }
                }
            }
            cursor = next_cursor;
            if exhausted {
                break;
            }
        }
        Ok(TuplePage {
            entries,
            next_cursor: None,
        })
    }

    fn read_at(
        &self,
        zone: &ZoneId,
        subject: &Subject,
        relation: &str,
        object: &Entity,
        min_revision: Option<Revision>,
    ) -> Result<Option<Tuple>> {
        let key = tuple_key(zone, object, relation, subject);
        let Some(bytes) = self.store.get(&key)? else {
            return Ok(None);
        };
        let tuple: Tuple = serde_json::from_slice(&bytes)
            .map_err(|e| AgentFsError::Corrupt(format!("tuple record: {e}")))?;
        if let Some(min_rev) = min_revision {
            if tuple.revision < min_rev {
                return Ok(None);
            }
        }
        Ok(Some(tuple))
    }

    fn tuples_for_object_relation(
        &self,
        zone: &ZoneId,
        object: &Entity,
        relation: &str,
    ) -> Result<Vec<Tuple>> {
        let prefix = object_relation_prefix(zone, object, relation);
        let mut entries = Vec::new();
        let mut cursor = None;
        loop {
            let ScanPage {
                entries: page_entries,
                next_cursor,
            } = self.store.prefix_scan(&prefix, 256, cursor)?;
            for (_, value) in page_entries {
                let tuple: Tuple = serde_json::from_slice(&value)
                    .map_err(|e| AgentFsError::Corrupt(format!("tuple record: {e}")))?;
                entries.push(tuple);
            }
            cursor = next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(entries)
    }

    fn current_revision(&self, zone: &ZoneId) -> Revision {
        self.store.current_revision(zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentfs_metadata::InMemoryMetadataStore;

    fn zone() -> ZoneId {
        ZoneId::new("acme")
    }

    fn tuple(zone: &ZoneId, subject_id: &str, relation: &str, object_id: &str) -> Tuple {
        Tuple {
            subject: Subject::Direct(Entity::new(zone.clone(), "user", subject_id)),
            relation: relation.to_string(),
            object: Entity::new(zone.clone(), "file", object_id),
            zone: zone.clone(),
            caveat: None,
            expiry: None,
            revision: Revision::ZERO,
        }
    }

    #[test]
    fn write_then_read_at_roundtrips() {
        let store = InMemoryTupleStore::new(Arc::new(InMemoryMetadataStore::new()));
        let zone = zone();
        let t = tuple(&zone, "alice", "owner", "doc1");
        let subject = t.subject.clone();
        let object = t.object.clone();
        store.write(t).unwrap();

        let found = store
            .read_at(&zone, &subject, "owner", &object, None)
            .unwrap()
            .unwrap();
        assert_eq!(found.relation, "owner");
    }

    #[test]
    fn cross_tenant_write_rejected() {
        let store = InMemoryTupleStore::new(Arc::new(InMemoryMetadataStore::new()));
        let zone_a = ZoneId::new("a");
        let zone_b = ZoneId::new("b");
        let mut t = tuple(&zone_a, "alice", "owner", "doc1");
        t.object = Entity::new(zone_b, "file", "doc1");
        let err = store.write(t).unwrap_err();
        assert_eq!(err.tag(), "cross_tenant");
    }

    #[test]
    fn delete_removes_tuple() {
        let store = InMemoryTupleStore::new(Arc::new(InMemoryMetadataStore::new()));
        let zone = zone();
        let t = tuple(&zone, "alice", "owner", "doc1");
        let subject = t.subject.clone();
        let object = t.object.clone();
        store.write(t).unwrap();
        store.delete(&zone, &subject, "owner", &object).unwrap();

        assert!(store
            .read_at(&zone, &subject, "owner", &object, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn tuples_for_object_relation_filters_correctly() {
        let store = InMemoryTupleStore::new(Arc::new(InMemoryMetadataStore::new()));
        let zone = zone();
        store.write(tuple(&zone, "alice", "owner", "doc1")).unwrap();
        store.write(tuple(&zone, "bob", "reader", "doc1")).unwrap();
        store.write(tuple(&zone, "carol", "owner", "doc2")).unwrap();

        let owners = store
            .tuples_for_object_relation(&zone, &Entity::new(zone.clone(), "file", "doc1"), "owner")
            .unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].subject, Subject::Direct(Entity::new(zone.clone(), "user", "alice")));
    }

    #[test]
    fn list_with_relation_filter() {
        let store = InMemoryTupleStore::new(Arc::new(InMemoryMetadataStore::new()));
        let zone = zone();
        store.write(tuple(&zone, "alice", "owner", "doc1")).unwrap();
        store.write(tuple(&zone, "bob", "reader", "doc1")).unwrap();

        let filter = TupleFilter {
            relation: Some("reader".to_string()),
            ..Default::default()
        };
        let page = store.list(&zone, &filter, None, 10).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].relation, "reader");
    }
}
