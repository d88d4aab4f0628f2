//! Component H — the userset-rewrite check engine: `check`, `expand` and
//! `list_objects` over a [`TupleStore`], bounded by `MAX_DEPTH`,
//! `MAX_FAN_OUT` and a wall-clock timeout so a misconfigured or adversarial
//! namespace can't turn a check into a hang (spec §4.H).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use agentfs_std::hash::FxHashSet;
use agentfs_std::time::utc_now;
use agentfs_std::{AgentFsError, Result, Revision, ZoneId};

use crate::closure::GroupClosureIndex;
use crate::tuple::{Entity, Subject, Tuple, TupleFilter, TupleStore};

/// Recursion stops past this depth (spec §4.H).
pub const MAX_DEPTH: usize = 50;
/// A single check visits at most this many tuples in total (spec §4.H).
pub const MAX_FAN_OUT: usize = 1000;
/// Wall-clock budget for a single `check`/`expand`/`list_objects` call
/// (spec §4.H).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// How fresh the tuple data backing a check must be (spec §3,
/// `ConsistencyLevel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyLevel {
    /// Accept whatever the store currently has.
    Eventual,
    /// Require the store to have observed at least this revision.
    Bounded(Revision),
    /// Require the check to be evaluated against the store's latest state.
    Strong,
}

/// The userset-rewrite expression attached to a relation (spec §4.H).
#[derive(Debug, Clone)]
pub enum RewriteRule {
    /// Direct tuples naming this relation on the object.
    This,
    /// Delegates to another relation defined on the same object.
    ComputedUserset {
        /// The relation to evaluate instead.
        relation: String,
    },
    /// For every tuple `(pivot, tupleset_relation, object)`, delegates to
    /// `computed_relation` evaluated on `pivot` (the "parent folder's
    /// editors are this file's editors" shape).
    TupleToUserset {
        /// The relation whose tuples name the pivot entities.
        tupleset_relation: String,
        /// The relation evaluated on each pivot entity.
        computed_relation: String,
    },
    /// Satisfied if any child rule is satisfied.
    Union(Vec<RewriteRule>),
    /// Satisfied only if every child rule is satisfied.
    Intersection(Vec<RewriteRule>),
    /// Satisfied if `base` is satisfied and `subtract` is not.
    Exclusion {
        /// The permissive rule.
        base: Box<RewriteRule>,
        /// The rule that, if satisfied, overrides `base`.
        subtract: Box<RewriteRule>,
    },
}

/// Per-object-type relation definitions (spec §4.H, "namespace config").
#[derive(Debug, Clone, Default)]
pub struct NamespaceConfig {
    object_types: IndexMap<String, IndexMap<String, RewriteRule>>,
}

impl NamespaceConfig {
    /// Starts an empty namespace configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines `relation` on `object_type` with the given rewrite rule.
    /// Overwrites any prior definition for the same pair.
    pub fn define(&mut self, object_type: impl Into<String>, relation: impl Into<String>, rule: RewriteRule) -> &mut Self {
        self.object_types
            .entry(object_type.into())
            .or_default()
            .insert(relation.into(), rule);
        self
    }

    fn rewrite_for(&self, object_type: &str, relation: &str) -> Result<&RewriteRule> {
        self.object_types
            .get(object_type)
            .and_then(|relations| relations.get(relation))
            .ok_or_else(|| {
                AgentFsError::SchemaError(format!(
                    "no rewrite rule for {object_type}#{relation}"
                ))
            })
    }
}

/// The outcome of a [`CheckEngine::check`] call (spec §3, `CheckDecision`).
#[derive(Debug, Clone)]
pub struct CheckDecision {
    /// Whether the subject holds the permission.
    pub allowed: bool,
    /// A short, stable reason code (`"allow"`, `"deny"`, or
    /// `"indeterminate:<cause>"`).
    pub decision_reason: String,
    /// The zone revision this decision was evaluated against.
    pub revision: Revision,
}

/// A page of [`CheckEngine::list_objects`] results.
pub struct ObjectPage {
    /// Objects the subject holds the permission on, in key order.
    pub entries: Vec<Entity>,
    /// Cursor to resume from.
    pub next_cursor: Option<Vec<u8>>,
}

struct Budget {
    max_depth: usize,
    max_fan_out: usize,
    deadline: Instant,
    depth: usize,
    fan_out: usize,
}

impl Budget {
    fn new(max_depth: usize, max_fan_out: usize, timeout: Duration) -> Self {
        Self {
            max_depth,
            max_fan_out,
            deadline: Instant::now() + timeout,
            depth: 0,
            fan_out: 0,
        }
    }

    fn check_deadline(&self) -> Result<()> {
        if Instant::now() > self.deadline {
            return Err(AgentFsError::Indeterminate("check timed out".to_string()));
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(AgentFsError::Indeterminate(format!(
                "exceeded max recursion depth {}",
                self.max_depth
            )));
        }
        self.check_deadline()
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    fn tally(&mut self, n: usize) -> Result<()> {
        self.fan_out += n;
        if self.fan_out > self.max_fan_out {
            return Err(AgentFsError::Indeterminate(format!(
                "exceeded max fan-out {}",
                self.max_fan_out
            )));
        }
        self.check_deadline()
    }
}

fn tuple_is_live(tuple: &Tuple) -> bool {
    let now = utc_now();
    if let Some(expiry) = tuple.expiry {
        if now >= expiry {
            return false;
        }
    }
    match &tuple.caveat {
        Some(caveat) => caveat.holds(now),
        None => true,
    }
}

/// Component H, wired over any [`TupleStore`].
pub struct CheckEngine {
    tuples: Arc<dyn TupleStore>,
    namespace: NamespaceConfig,
    closure: GroupClosureIndex,
    group_relations: FxHashSet<String>,
    max_depth: usize,
    max_fan_out: usize,
    timeout: Duration,
}

impl CheckEngine {
    /// Builds a check engine. `group_relations` names the relations treated
    /// as transitively-closed group membership (e.g. `"member"`) and kept
    /// in the closure index; every other relation is evaluated by plain
    /// recursive descent.
    pub fn new(
        tuples: Arc<dyn TupleStore>,
        namespace: NamespaceConfig,
        group_relations: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            tuples,
            namespace,
            closure: GroupClosureIndex::new(),
            group_relations: group_relations.into_iter().collect(),
            max_depth: MAX_DEPTH,
            max_fan_out: MAX_FAN_OUT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the graph bounds (tests use tight bounds to exercise
    /// `Indeterminate` without constructing huge fixtures).
    pub fn with_bounds(mut self, max_depth: usize, max_fan_out: usize, timeout: Duration) -> Self {
        self.max_depth = max_depth;
        self.max_fan_out = max_fan_out;
        self.timeout = timeout;
        self
    }

    /// Writes a tuple through the check engine so group-relation edges stay
    /// in the closure index, updated synchronously before the write's
    /// revision is returned to the caller (spec §4.H).
    pub fn write_tuple(&self, tuple: Tuple) -> Result<Revision> {
        let edge = self
            .group_relations
            .contains(&tuple.relation)
            .then(|| (tuple.zone.clone(), tuple.subject.entity().clone(), tuple.object.clone()));
        let revision = self.tuples.write(tuple)?;
        if let Some((zone, subject, object)) = edge {
            tracing::trace!(%zone, %subject, %object, "group closure edge recorded");
            self.closure.record_edge(&zone, subject, object);
        }
        Ok(revision)
    }

    /// Deletes a tuple through the check engine, keeping the closure index
    /// in sync.
    pub fn delete_tuple(
        &self,
        zone: &ZoneId,
        subject: &Subject,
        relation: &str,
        object: &Entity,
    ) -> Result<Revision> {
        let revision = self.tuples.delete(zone, subject, relation, object)?;
        if self.group_relations.contains(relation) {
            tracing::trace!(%zone, subject = %subject.entity(), %object, "group closure edge removed");
            self.closure.remove_edge(zone, subject.entity(), object);
        }
        Ok(revision)
    }

    fn resolve_revision(&self, zone: &ZoneId, consistency: ConsistencyLevel) -> Result<Revision> {
        match consistency {
            ConsistencyLevel::Eventual | ConsistencyLevel::Strong => {
                // This check engine reads directly from the authoritative
                // tuple store; there is no cache tier in front of it here
                // (that distinction is introduced once this engine is wired
                // behind the cache components), so both levels simply use
                // whatever the store currently reports.
                Ok(self.current_revision(zone))
            }
            ConsistencyLevel::Bounded(token) => {
                let current = self.current_revision(zone);
                if current < token {
                    return Err(AgentFsError::Unavailable(format!(
                        "zone {zone} at revision {current}, requested at-least {token}"
                    )));
                }
                Ok(current)
            }
        }
    }

    fn current_revision(&self, zone: &ZoneId) -> Revision {
        self.tuples.current_revision(zone)
    }

    /// The zone's current revision, with no check performed. Callers that
    /// need to stamp a derived view (e.g. a namespace cache miss) with a
    /// fresh revision, but have no `CheckDecision` of their own to borrow one
    /// from, use this instead of round-tripping through `check`.
    pub fn zone_revision(&self, zone: &ZoneId) -> Revision {
        self.current_revision(zone)
    }

    /// Evaluates whether `subject` holds `permission` on `object`.
    pub fn check(
        &self,
        zone: &ZoneId,
        subject: &Entity,
        permission: &str,
        object: &Entity,
        consistency: ConsistencyLevel,
    ) -> Result<CheckDecision> {
        let revision = self.resolve_revision(zone, consistency)?;
        let mut budget = Budget::new(self.max_depth, self.max_fan_out, self.timeout);
        let outcome = match self.check_relation(object, permission, subject, zone, &mut budget) {
            Ok(allowed) => Ok(CheckDecision {
                allowed,
                decision_reason: if allowed { "allow".to_string() } else { "deny".to_string() },
                revision,
            }),
            Err(AgentFsError::Indeterminate(reason)) => {
                if matches!(consistency, ConsistencyLevel::Strong) {
                    Err(AgentFsError::Indeterminate(reason))
                } else {
                    Ok(CheckDecision {
                        allowed: false,
                        decision_reason: format!("indeterminate:{reason}"),
                        revision,
                    })
                }
            }
            Err(e) => Err(e),
        };
        if let Ok(decision) = &outcome {
            tracing::trace!(%subject, permission, %object, allowed = decision.allowed, reason = %decision.decision_reason, "check decided");
        }
        outcome
    }

    fn check_relation(
        &self,
        object: &Entity,
        relation: &str,
        subject: &Entity,
        zone: &ZoneId,
        budget: &mut Budget,
    ) -> Result<bool> {
        budget.enter()?;
        let rule = self.namespace.rewrite_for(&object.entity_type, relation)?.clone();
        let result = self.evaluate(&rule, object, relation, subject, zone, budget);
        budget.exit();
        result
    }

    fn evaluate(
        &self,
        rule: &RewriteRule,
        object: &Entity,
        relation: &str,
        subject: &Entity,
        zone: &ZoneId,
        budget: &mut Budget,
    ) -> Result<bool> {
        match rule {
            RewriteRule::This => self.evaluate_this(object, relation, subject, zone, budget),
            RewriteRule::ComputedUserset { relation: next } => {
                self.check_relation(object, next, subject, zone, budget)
            }
            RewriteRule::TupleToUserset {
                tupleset_relation,
                computed_relation,
            } => self.evaluate_ttu(object, tupleset_relation, computed_relation, subject, zone, budget),
            RewriteRule::Union(rules) => {
                for r in rules {
                    if self.evaluate(r, object, relation, subject, zone, budget)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            RewriteRule::Intersection(rules) => {
                for r in rules {
                    if !self.evaluate(r, object, relation, subject, zone, budget)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RewriteRule::Exclusion { base, subtract } => {
                let allowed = self.evaluate(base, object, relation, subject, zone, budget)?;
                if !allowed {
                    return Ok(false);
                }
                Ok(!self.evaluate(subtract, object, relation, subject, zone, budget)?)
            }
        }
    }

    fn evaluate_this(
        &self,
        object: &Entity,
        relation: &str,
        subject: &Entity,
        zone: &ZoneId,
        budget: &mut Budget,
    ) -> Result<bool> {
        let tuples = self.tuples.tuples_for_object_relation(zone, object, relation)?;
        budget.tally(tuples.len())?;

        if self.group_relations.contains(relation) && self.closure.contains(zone, subject, object) {
            return Ok(true);
        }

        for tuple in &tuples {
            if !tuple_is_live(tuple) {
                continue;
            }
            match &tuple.subject {
                Subject::Direct(entity) => {
                    if entity == subject {
                        return Ok(true);
                    }
                }
                Subject::Userset { entity, relation: nested } => {
                    if self.check_relation(entity, nested, subject, zone, budget)? {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    fn evaluate_ttu(
        &self,
        object: &Entity,
        tupleset_relation: &str,
        computed_relation: &str,
        subject: &Entity,
        zone: &ZoneId,
        budget: &mut Budget,
    ) -> Result<bool> {
        let tuples = self
            .tuples
            .tuples_for_object_relation(zone, object, tupleset_relation)?;
        budget.tally(tuples.len())?;
        for tuple in &tuples {
            if !tuple_is_live(tuple) {
                continue;
            }
            let pivot = tuple.subject.entity().clone();
            if self.check_relation(&pivot, computed_relation, subject, zone, budget)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns every subject that holds `permission` on `object`, subject to
    /// the same graph bounds as `check`.
    pub fn expand(&self, zone: &ZoneId, object: &Entity, permission: &str) -> Result<FxHashSet<Entity>> {
        let mut budget = Budget::new(self.max_depth, self.max_fan_out, self.timeout);
        self.expand_relation(object, permission, zone, &mut budget)
    }

    fn expand_relation(
        &self,
        object: &Entity,
        relation: &str,
        zone: &ZoneId,
        budget: &mut Budget,
    ) -> Result<FxHashSet<Entity>> {
        budget.enter()?;
        let rule = self.namespace.rewrite_for(&object.entity_type, relation)?.clone();
        let result = self.expand_rule(&rule, object, relation, zone, budget);
        budget.exit();
        result
    }

    fn expand_rule(
        &self,
        rule: &RewriteRule,
        object: &Entity,
        relation: &str,
        zone: &ZoneId,
        budget: &mut Budget,
    ) -> Result<FxHashSet<Entity>> {
        match rule {
            RewriteRule::This => {
                let tuples = self.tuples.tuples_for_object_relation(zone, object, relation)?;
                budget.tally(tuples.len())?;
                let mut set = FxHashSet::default();
                for tuple in &tuples {
                    if !tuple_is_live(tuple) {
                        continue;
                    }
                    match &tuple.subject {
                        Subject::Direct(entity) => {
                            set.insert(entity.clone());
                        }
                        Subject::Userset { entity, relation: nested } => {
                            set.extend(self.expand_relation(entity, nested, zone, budget)?);
                        }
                    }
                }
                Ok(set)
            }
            RewriteRule::ComputedUserset { relation: next } => {
                self.expand_relation(object, next, zone, budget)
            }
            RewriteRule::TupleToUserset {
                tupleset_relation,
                computed_relation,
            } => {
                let tuples = self
                    .tuples
                    .tuples_for_object_relation(zone, object, tupleset_relation)?;
                budget.tally(tuples.len())?;
                let mut set = FxHashSet::default();
                for tuple in &tuples {
                    if !tuple_is_live(tuple) {
                        continue;
                    }
                    let pivot = tuple.subject.entity().clone();
                    set.extend(self.expand_relation(&pivot, computed_relation, zone, budget)?);
                }
                Ok(set)
            }
            RewriteRule::Union(rules) => {
                let mut set = FxHashSet::default();
                for r in rules {
                    set.extend(self.expand_rule(r, object, relation, zone, budget)?);
                }
                Ok(set)
            }
            RewriteRule::Intersection(rules) => {
                let mut rules = rules.iter();
                let Some(first) = rules.next() else {
                    return Ok(FxHashSet::default());
                };
                let mut acc = self.expand_rule(first, object, relation, zone, budget)?;
                for r in rules {
                    let next = self.expand_rule(r, object, relation, zone, budget)?;
                    acc.retain(|e| next.contains(e));
                }
                Ok(acc)
            }
            RewriteRule::Exclusion { base, subtract } => {
                let mut base_set = self.evaluate_exclusion_base(base, object, relation, zone, budget)?;
                let subtract_set = self.expand_rule(subtract, object, relation, zone, budget)?;
                base_set.retain(|e| !subtract_set.contains(e));
                Ok(base_set)
            }
        }
    }

    fn evaluate_exclusion_base(
        &self,
        rule: &RewriteRule,
        object: &Entity,
        relation: &str,
        zone: &ZoneId,
        budget: &mut Budget,
    ) -> Result<FxHashSet<Entity>> {
        self.expand_rule(rule, object, relation, zone, budget)
    }

    /// Lists objects of `object_type` in `zone` that `subject` holds
    /// `permission` on, paginated by object key order.
    pub fn list_objects(
        &self,
        zone: &ZoneId,
        subject: &Entity,
        permission: &str,
        object_type: &str,
        after_key: Option<Vec<u8>>,
        limit: usize,
    ) -> Result<ObjectPage> {
        let mut candidates: BTreeSet<Entity> = BTreeSet::new();
        let mut cursor = None;
        loop {
            let page = self.tuples.list(zone, &TupleFilter::default(), cursor, 256)?;
            let exhausted = page.next_cursor.is_none();
            for tuple in page.entries {
                if tuple.object.entity_type == object_type {
                    candidates.insert(tuple.object);
                }
            }
            cursor = page.next_cursor;
            if exhausted {
                break;
            }
        }

        let mut entries = Vec::new();
        let mut next_cursor = None;
        for object in candidates {
            if let Some(after) = &after_key {
                if object.to_string().as_bytes() <= after.as_slice() {
                    continue;
                }
            }
            let decision = self.check(zone, subject, permission, &object, ConsistencyLevel::Eventual)?;
            if decision.allowed {
                entries.push(object.clone());
                if entries.len() == limit {
                    next_cursor = Some(object.to_string().into_bytes());
                    break;
                }
            }
        }
        Ok(ObjectPage {
            entries,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::InMemoryTupleStore;
    use agentfs_metadata::InMemoryMetadataStore;

    fn zone() -> ZoneId {
        ZoneId::new("acme")
    }

    fn user(zone: &ZoneId, id: &str) -> Entity {
        Entity::new(zone.clone(), "user", id)
    }

    fn group(zone: &ZoneId, id: &str) -> Entity {
        Entity::new(zone.clone(), "group", id)
    }

    fn doc(zone: &ZoneId, id: &str) -> Entity {
        Entity::new(zone.clone(), "doc", id)
    }

    fn direct_tuple(subject: Entity, relation: &str, object: Entity, zone: ZoneId) -> Tuple {
        Tuple {
            subject: Subject::Direct(subject),
            relation: relation.to_string(),
            object,
            zone,
            caveat: None,
            expiry: None,
            revision: Revision::ZERO,
        }
    }

    fn doc_namespace() -> NamespaceConfig {
        let mut ns = NamespaceConfig::new();
        ns.define("doc", "owner", RewriteRule::This);
        ns.define(
            "doc",
            "editor",
            RewriteRule::Union(vec![
                RewriteRule::This,
                RewriteRule::ComputedUserset {
                    relation: "owner".to_string(),
                },
            ]),
        );
        ns.define(
            "doc",
            "viewer",
            RewriteRule::Union(vec![
                RewriteRule::This,
                RewriteRule::ComputedUserset {
                    relation: "editor".to_string(),
                },
                RewriteRule::TupleToUserset {
                    tupleset_relation: "parent".to_string(),
                    computed_relation: "viewer".to_string(),
                },
            ]),
        );
        ns.define("group", "member", RewriteRule::This);
        ns
    }

    fn engine_with(tuples: Vec<Tuple>) -> (CheckEngine, ZoneId) {
        let zone = zone();
        let store = InMemoryTupleStore::new(Arc::new(InMemoryMetadataStore::new()));
        for t in tuples {
            store.write(t).unwrap();
        }
        let engine = CheckEngine::new(Arc::new(store), doc_namespace(), vec!["member".to_string()]);
        (engine, zone)
    }

    #[test]
    fn direct_owner_is_allowed() {
        let zone = zone();
        let alice = user(&zone, "alice");
        let doc1 = doc(&zone, "doc1");
        let (engine, zone) = engine_with(vec![direct_tuple(alice.clone(), "owner", doc1.clone(), zone.clone())]);

        let decision = engine
            .check(&zone, &alice, "owner", &doc1, ConsistencyLevel::Eventual)
            .unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn computed_userset_owner_implies_editor() {
        let zone = zone();
        let alice = user(&zone, "alice");
        let doc1 = doc(&zone, "doc1");
        let (engine, zone) = engine_with(vec![direct_tuple(alice.clone(), "owner", doc1.clone(), zone.clone())]);

        let decision = engine
            .check(&zone, &alice, "editor", &doc1, ConsistencyLevel::Eventual)
            .unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn unrelated_subject_is_denied() {
        let zone = zone();
        let alice = user(&zone, "alice");
        let bob = user(&zone, "bob");
        let doc1 = doc(&zone, "doc1");
        let (engine, zone) = engine_with(vec![direct_tuple(alice, "owner", doc1.clone(), zone.clone())]);

        let decision = engine
            .check(&zone, &bob, "owner", &doc1, ConsistencyLevel::Eventual)
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.decision_reason, "deny");
    }

    #[test]
    fn tuple_to_userset_inherits_from_parent() {
        let zone = zone();
        let alice = user(&zone, "alice");
        let folder = doc(&zone, "folder1");
        let doc1 = doc(&zone, "doc1");
        let (engine, zone) = engine_with(vec![
            direct_tuple(alice.clone(), "viewer", folder.clone(), zone.clone()),
            direct_tuple(folder.clone(), "parent", doc1.clone(), zone.clone()),
        ]);

        let decision = engine
            .check(&zone, &alice, "viewer", &doc1, ConsistencyLevel::Eventual)
            .unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn nested_group_membership_is_transitive_via_closure() {
        let zone = zone();
        let alice = user(&zone, "alice");
        let eng = group(&zone, "eng");
        let all = group(&zone, "all");
        let doc1 = doc(&zone, "doc1");

        let store = InMemoryTupleStore::new(Arc::new(InMemoryMetadataStore::new()));
        let engine = CheckEngine::new(Arc::new(store), doc_namespace(), vec!["member".to_string()]);

        engine.write_tuple(direct_tuple(alice.clone(), "member", eng.clone(), zone.clone())).unwrap();
        engine
            .write_tuple(Tuple {
                subject: Subject::Userset {
                    entity: eng.clone(),
                    relation: "member".to_string(),
                },
                relation: "member".to_string(),
                object: all.clone(),
                zone: zone.clone(),
                caveat: None,
                expiry: None,
                revision: Revision::ZERO,
            })
            .unwrap();
        engine
            .write_tuple(Tuple {
                subject: Subject::Userset {
                    entity: all.clone(),
                    relation: "member".to_string(),
                },
                relation: "viewer".to_string(),
                object: doc1.clone(),
                zone: zone.clone(),
                caveat: None,
                expiry: None,
                revision: Revision::ZERO,
            })
            .unwrap();

        let decision = engine
            .check(&zone, &alice, "viewer", &doc1, ConsistencyLevel::Eventual)
            .unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn exceeding_fan_out_yields_deny_under_eventual_consistency() {
        let zone = zone();
        let alice = user(&zone, "alice");
        let doc1 = doc(&zone, "doc1");
        let mut tuples = Vec::new();
        for i in 0..10 {
            tuples.push(direct_tuple(user(&zone, &format!("other{i}")), "owner", doc1.clone(), zone.clone()));
        }
        let (engine, zone) = engine_with(tuples);
        let engine = engine.with_bounds(MAX_DEPTH, 5, DEFAULT_TIMEOUT);

        let decision = engine
            .check(&zone, &alice, "owner", &doc1, ConsistencyLevel::Eventual)
            .unwrap();
        assert!(!decision.allowed);
        assert!(decision.decision_reason.starts_with("indeterminate:"));
    }

    #[test]
    fn exceeding_fan_out_under_strong_consistency_is_an_error() {
        let zone = zone();
        let alice = user(&zone, "alice");
        let doc1 = doc(&zone, "doc1");
        let mut tuples = Vec::new();
        for i in 0..10 {
            tuples.push(direct_tuple(user(&zone, &format!("other{i}")), "owner", doc1.clone(), zone.clone()));
        }
        let (engine, zone) = engine_with(tuples);
        let engine = engine.with_bounds(MAX_DEPTH, 5, DEFAULT_TIMEOUT);

        let err = engine
            .check(&zone, &alice, "owner", &doc1, ConsistencyLevel::Strong)
            .unwrap_err();
        assert_eq!(err.tag(), "indeterminate");
    }

    #[test]
    fn expand_collects_direct_and_inherited_subjects() {
        let zone = zone();
        let alice = user(&zone, "alice");
        let bob = user(&zone, "bob");
        let doc1 = doc(&zone, "doc1");
        let (engine, zone) = engine_with(vec![
            direct_tuple(alice.clone(), "owner", doc1.clone(), zone.clone()),
            direct_tuple(bob.clone(), "editor", doc1.clone(), zone.clone()),
        ]);

        let subjects = engine.expand(&zone, &doc1, "editor").unwrap();
        assert!(subjects.contains(&alice));
        assert!(subjects.contains(&bob));
    }

    #[test]
    fn list_objects_returns_only_objects_subject_can_view() {
        let zone = zone();
        let alice = user(&zone, "alice");
        let doc1 = doc(&zone, "doc1");
        let doc2 = doc(&zone, "doc2");
        let (engine, zone) = engine_with(vec![
            direct_tuple(alice.clone(), "owner", doc1.clone(), zone.clone()),
            direct_tuple(user(&zone, "bob"), "owner", doc2.clone(), zone.clone()),
        ]);

        let page = engine
            .list_objects(&zone, &alice, "owner", "doc", None, 10)
            .unwrap();
        assert_eq!(page.entries, vec![doc1]);
    }
}
