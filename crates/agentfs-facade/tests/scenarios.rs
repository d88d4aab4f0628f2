//! End-to-end scenarios exercising the facade as an embedder would: a
//! subject runs VFS and ReBAC operations against a fresh zone and observes
//! the results a moment later, with no internal crate access.

use std::sync::Arc;

use agentfs_blob::{read_to_vec, stream_from_bytes, InMemoryBlobStore};
use agentfs_core::{MountFlags, ObjectType};
use agentfs_facade::{AgentFsConfig, Facade, GcConfig, ADMIN, OWNER, READ, WRITE};
use agentfs_metadata::InMemoryMetadataStore;
use agentfs_rebac::{
    ConsistencyLevel, Entity, InMemoryTupleStore, NamespaceConfig, RewriteRule, Subject, Tuple,
    TupleStore,
};
use agentfs_std::{Revision, ZoneId};

type TestFacade = Facade<InMemoryMetadataStore, InMemoryBlobStore>;

/// The relations the facade's own path operations hardcode (`READ`,
/// `WRITE`, `OWNER`, `ADMIN`), plus the `can-read`/`can-write` relations
/// the numbered scenarios check directly and a `group`'s `member-of`.
fn namespace() -> NamespaceConfig {
    let mut namespace = NamespaceConfig::new();
    namespace
        .define("file", OWNER, RewriteRule::This)
        .define(
            "file",
            WRITE,
            RewriteRule::Union(vec![RewriteRule::This, RewriteRule::ComputedUserset { relation: OWNER.to_string() }]),
        )
        .define(
            "file",
            READ,
            RewriteRule::Union(vec![RewriteRule::This, RewriteRule::ComputedUserset { relation: WRITE.to_string() }]),
        )
        .define(
            "file",
            "can-write",
            RewriteRule::Union(vec![
                RewriteRule::This,
                RewriteRule::ComputedUserset { relation: "owner".to_string() },
            ]),
        )
        .define(
            "file",
            "can-read",
            RewriteRule::Union(vec![
                RewriteRule::This,
                RewriteRule::ComputedUserset { relation: "can-write".to_string() },
            ]),
        )
        .define("mount", ADMIN, RewriteRule::This)
        .define("group", "member-of", RewriteRule::This);
    namespace
}

/// Builds a fresh zone with a root mount already admin-granted to `root`
/// and mounted at `/`, ready for path operations.
fn fresh_zone(zone_name: &str) -> (TestFacade, Entity, ZoneId) {
    fresh_zone_with_config(zone_name, AgentFsConfig::default())
}

/// Same as `fresh_zone`, but with a caller-supplied configuration (e.g. a
/// shorter GC grace window than the default 60s, for tests that want to
/// observe collection without waiting).
fn fresh_zone_with_config(zone_name: &str, config: AgentFsConfig) -> (TestFacade, Entity, ZoneId) {
    let zone = ZoneId::new(zone_name.to_string());
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let blobs = Arc::new(InMemoryBlobStore::new());
    let tuples: Arc<dyn TupleStore> = Arc::new(InMemoryTupleStore::new(metadata.clone()));

    let facade = Facade::new(
        zone.clone(),
        metadata,
        blobs,
        tuples,
        namespace(),
        vec!["member-of".to_string()],
        Vec::<String>::new(),
        config,
    );

    let root = Entity::new(zone.clone(), "user", "root");
    facade
        .rebac_write(Tuple {
            subject: Subject::Direct(root.clone()),
            relation: ADMIN.to_string(),
            object: Entity::new(zone.clone(), "mount", "/"),
            zone: zone.clone(),
            caveat: None,
            expiry: None,
            revision: Revision::ZERO,
        })
        .expect("grant root admin on mount:/");
    facade
        .mount(&root, "/", "local-fs", ObjectType::from("file"), MountFlags::default())
        .expect("mount /");
    (facade, root, zone)
}

fn entity(zone: &ZoneId, entity_type: &str, id: &str) -> Entity {
    Entity::new(zone.clone(), entity_type, id)
}

/// Scenario 1 + 2: a grant makes a subject's read allowed as of the
/// revision it was written at, and a later revoke makes it denied as of
/// the revision the delete landed at.
#[test]
fn grant_then_revoke_changes_decision_at_bounded_revision() {
    let (facade, _root, zone) = fresh_zone("acme");
    let alice = entity(&zone, "user", "alice");
    let readme = entity(&zone, "file", "/docs/readme.md");

    let grant_revision = facade
        .rebac_write(Tuple {
            subject: Subject::Direct(alice.clone()),
            relation: "can-read".to_string(),
            object: readme.clone(),
            zone: zone.clone(),
            caveat: None,
            expiry: None,
            revision: Revision::ZERO,
        })
        .expect("grant can-read");

    let allowed = facade
        .check_permission(&alice, "can-read", &readme, ConsistencyLevel::Bounded(grant_revision))
        .expect("check after grant");
    assert!(allowed, "alice should be able to read readme.md right after the grant");

    let revoke_revision = facade
        .rebac_delete(&Subject::Direct(alice.clone()), "can-read", &readme)
        .expect("revoke can-read");

    let denied = facade
        .check_permission(&alice, "can-read", &readme, ConsistencyLevel::Bounded(revoke_revision))
        .expect("check after revoke");
    assert!(!denied, "alice should lose read access right after the revoke");
}

/// Scenario 3: permission held transitively through group membership, via
/// a userset subject referencing the group's own membership relation —
/// the shape `GroupClosureIndex` and `CheckEngine::evaluate_this` actually
/// recognize as a group edge, not a bare direct grant to the group entity.
#[test]
fn transitive_group_membership_is_revoked_on_membership_removal() {
    let (facade, _root, zone) = fresh_zone("acme");
    let bob = entity(&zone, "user", "bob");
    let eng = entity(&zone, "group", "eng");
    let main_rs = entity(&zone, "file", "/src/main.rs");

    facade
        .rebac_write(Tuple {
            subject: Subject::Direct(bob.clone()),
            relation: "member-of".to_string(),
            object: eng.clone(),
            zone: zone.clone(),
            caveat: None,
            expiry: None,
            revision: Revision::ZERO,
        })
        .expect("bob joins eng");

    facade
        .rebac_write(Tuple {
            subject: Subject::Userset { entity: eng.clone(), relation: "member-of".to_string() },
            relation: "can-write".to_string(),
            object: main_rs.clone(),
            zone: zone.clone(),
            caveat: None,
            expiry: None,
            revision: Revision::ZERO,
        })
        .expect("eng can write main.rs");

    let allowed = facade
        .check_permission(&bob, "can-write", &main_rs, ConsistencyLevel::Eventual)
        .expect("transitive check");
    assert!(allowed, "bob should inherit can-write through eng membership");

    facade
        .rebac_delete(&Subject::Direct(bob.clone()), "member-of", &eng)
        .expect("bob leaves eng");

    let denied = facade
        .check_permission(&bob, "can-write", &main_rs, ConsistencyLevel::Eventual)
        .expect("post-removal check");
    assert!(!denied, "bob should lose can-write once he leaves eng");
}

/// Scenario 4: a tuple whose subject or object zone disagrees with its
/// own `zone` field is rejected outright, never silently narrowed or
/// widened to either zone.
#[test]
fn cross_tenant_tuple_is_rejected() {
    let (facade, _root, zone) = fresh_zone("acme");
    let other_zone = ZoneId::new("other".to_string());
    let alice_other = entity(&other_zone, "user", "alice");
    let x_other = entity(&other_zone, "file", "/x");

    let result = facade.rebac_write(Tuple {
        subject: Subject::Direct(alice_other),
        relation: "can-read".to_string(),
        object: x_other,
        zone: zone.clone(),
        caveat: None,
        expiry: None,
        revision: Revision::ZERO,
    });

    assert!(matches!(result, Err(agentfs_std::AgentFsError::CrossTenant(_))));
}

/// Scenario 5: two writes of identical bytes share one content blob; each
/// delete only drops the entry from the chain once nothing else refers to
/// it.
#[tokio::test]
async fn identical_content_is_deduplicated_and_refcounted() {
    let (facade, root, zone) = fresh_zone("acme");
    let bytes = vec![b'X'; 1024 * 1024];

    let first = facade
        .write(&root, "/a/1.bin", stream_from_bytes(bytes.clone()))
        .await
        .expect("write 1.bin");
    let second = facade
        .write(&root, "/a/2.bin", stream_from_bytes(bytes.clone()))
        .await
        .expect("write 2.bin");

    let hash = first.content_hash.expect("1.bin has content");
    assert_eq!(second.content_hash, Some(hash), "identical bytes hash the same");
    assert_eq!(facade.content_refcount(&hash).unwrap(), Some(2));

    facade.delete(&root, "/a/1.bin").expect("delete 1.bin");
    assert_eq!(facade.content_refcount(&hash).unwrap(), Some(1), "second file still refers to the blob");

    let stream = facade
        .read(&root, "/a/2.bin", ConsistencyLevel::Strong)
        .await
        .expect("2.bin still readable");
    assert_eq!(read_to_vec(stream).await.unwrap(), bytes);

    facade.delete(&root, "/a/2.bin").expect("delete 2.bin");
    assert_eq!(facade.content_refcount(&hash).unwrap(), Some(0), "last reference drops the blob to zero");
}

/// Scenario 6: five rapid grant/revoke cycles under bounded consistency
/// each land correctly, one revision apart.
#[test]
fn rapid_grant_revoke_cycles_are_each_correct_under_bounded_consistency() {
    let (facade, _root, zone) = fresh_zone("acme");
    let alice = entity(&zone, "user", "alice");
    let doc = entity(&zone, "file", "/doc");

    for _ in 0..5 {
        let grant_revision = facade
            .rebac_write(Tuple {
                subject: Subject::Direct(alice.clone()),
                relation: "can-read".to_string(),
                object: doc.clone(),
                zone: zone.clone(),
                caveat: None,
                expiry: None,
                revision: Revision::ZERO,
            })
            .unwrap();
        assert!(facade
            .check_permission(&alice, "can-read", &doc, ConsistencyLevel::Bounded(grant_revision))
            .unwrap());

        let revoke_revision = facade.rebac_delete(&Subject::Direct(alice.clone()), "can-read", &doc).unwrap();
        assert!(!facade
            .check_permission(&alice, "can-read", &doc, ConsistencyLevel::Bounded(revoke_revision))
            .unwrap());
    }
}

/// A plain facade-level smoke test beyond the numbered scenarios: mkdir,
/// write inside it, list sees the file, and a non-owner is denied.
#[tokio::test]
async fn mkdir_write_list_and_permission_denial() {
    let (facade, root, zone) = fresh_zone("acme");

    facade.mkdir(&root, "/docs").expect("mkdir /docs");
    facade
        .write(&root, "/docs/readme.md", stream_from_bytes(b"hello".to_vec()))
        .await
        .expect("write readme.md");

    let page = facade.list(&root, "/docs", None, 64, ConsistencyLevel::Strong).expect("list /docs");
    assert!(page.entries.iter().any(|entry| entry.path == "/docs/readme.md"));

    let mallory = entity(&zone, "user", "mallory");
    let denied = facade
        .check_permission(&mallory, READ, &entity(&zone, "file", "/docs/readme.md"), ConsistencyLevel::Strong)
        .expect("check as mallory");
    assert!(!denied, "mallory has no grant and is not the owner");
}

/// With a zero grace window, `gc` reclaims a blob as soon as its last
/// reference is dropped, proving the facade actually threads
/// `config.gc.content_grace()` down to `ContentStore::sweep_tombstones`
/// rather than leaving it unreachable.
#[tokio::test]
async fn gc_reclaims_a_tombstoned_blob_past_its_grace_window() {
    let config = AgentFsConfig {
        gc: GcConfig { content_grace_secs: 0 },
        ..AgentFsConfig::default()
    };
    let (facade, root, _zone) = fresh_zone_with_config("acme", config);

    let inode = facade
        .write(&root, "/notes.txt", stream_from_bytes(b"ephemeral".to_vec()))
        .await
        .expect("write notes.txt");
    let hash = inode.content_hash.expect("write leaves a content hash");
    assert_eq!(facade.content_refcount(&hash).unwrap(), Some(1));

    facade.delete(&root, "/notes.txt").expect("delete notes.txt");
    assert_eq!(facade.content_refcount(&hash).unwrap(), Some(0), "tombstoned, not yet collected");

    let collected = facade.gc().await.expect("gc");
    assert_eq!(collected, 1);
    assert_eq!(facade.content_refcount(&hash).unwrap(), None, "swept away entirely");
}
