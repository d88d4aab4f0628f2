//! The CLI's default ReBAC schema. The facade itself takes a caller-supplied
//! `NamespaceConfig` and has no opinion on how relations are computed; this
//! is the CLI's own opinion, the way an embedding application would define
//! its own schema at startup.

use agentfs_rebac::{NamespaceConfig, RewriteRule};

/// Relations that trigger coarse, whole-zone cache invalidation on write
/// rather than the narrow per-object kind (spec §4.L: group membership
/// changes can change who sees arbitrarily many objects).
pub const GROUP_RELATIONS: &[&str] = &["member"];

/// Relations treated the same way as `GROUP_RELATIONS` for invalidation.
/// The default schema defines none.
pub const HIERARCHY_RELATIONS: &[&str] = &[];

/// Builds the default namespace: `owner` is a direct grant; `write` is a
/// direct grant or ownership; `read` is a direct grant, write, or
/// ownership. `mount` objects use a single `admin` relation, and `group`
/// objects use `member` for direct membership.
pub fn default_namespace() -> NamespaceConfig {
    let mut namespace = NamespaceConfig::new();
    namespace
        .define("file", "owner", RewriteRule::This)
        .define(
            "file",
            "write",
            RewriteRule::Union(vec![
                RewriteRule::This,
                RewriteRule::ComputedUserset { relation: "owner".to_string() },
            ]),
        )
        .define(
            "file",
            "read",
            RewriteRule::Union(vec![
                RewriteRule::This,
                RewriteRule::ComputedUserset { relation: "write".to_string() },
            ]),
        )
        .define("mount", "admin", RewriteRule::This)
        .define("group", "member", RewriteRule::This);
    namespace
}
