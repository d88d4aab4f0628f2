//! Stable error taxonomy shared by every component of the workspace.
//!
//! Every store, cache and the facade return [`AgentFsError`] (aliased as
//! [`Error`]) so that callers can match on a fixed set of kinds instead of
//! parsing messages. See spec §7 for the source of truth on propagation
//! rules for each variant.

/// The result type used throughout the `agentfs` workspace.
pub type Result<T, E = AgentFsError> = std::result::Result<T, E>;

/// The stable error taxonomy (spec §7).
#[derive(thiserror::Error, Debug, Clone)]
pub enum AgentFsError {
    /// The requested key, path, tuple or hash does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An active record already exists where a unique one was expected.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A caller-supplied argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A compare-and-swap precondition did not hold; the caller should
    /// re-read and retry.
    #[error("CAS precondition failed: {0}")]
    CasFailure(String),

    /// A tuple write or read crossed a zone boundary without an explicit
    /// bridge object.
    #[error("cross-tenant access rejected: {0}")]
    CrossTenant(String),

    /// A rename crossed mount points backed by different backends/object
    /// types.
    #[error("rename crosses incompatible mounts: {0}")]
    CrossMountRename(String),

    /// Adding a mount would overlap an existing one.
    #[error("mount conflict: {0}")]
    MountConflict(String),

    /// The ReBAC check denied the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A check could not be decided within the configured graph bounds;
    /// callers must treat this as a deny unless they asked for `STRONG`
    /// consistency, in which case it is surfaced as-is (spec §7).
    #[error("indeterminate: {0}")]
    Indeterminate(String),

    /// The call's deadline elapsed before it completed.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A transient failure in a backing store; retriable with backoff.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A backend-enforced storage quota was exceeded.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Cache invalidation (typically L3) could not complete; the write
    /// still committed. Policy default is proceed-with-warning (spec §4.L).
    #[error("cache unavailable during invalidation: {0}")]
    CacheUnavailable(String),

    /// Persisted state failed an integrity check. Never retried, never
    /// swallowed.
    #[error("corrupt state: {0}")]
    Corrupt(String),

    /// A relation or object type referenced a namespace definition that
    /// does not exist.
    #[error("schema error: {0}")]
    SchemaError(String),
}

impl AgentFsError {
    /// Whether the caller may transparently retry the operation with
    /// backoff (spec §7: `Unavailable`, and `CasFailure` for idempotent
    /// helpers).
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::CasFailure(_))
    }

    /// Whether the error must always be surfaced to the caller and never
    /// swallowed or retried (spec §7: `Corrupt`).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }

    /// Short, stable tag for the error kind, suitable for metrics labels
    /// and the `decision_reason` field of a `CheckDecision`.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::CasFailure(_) => "cas_failure",
            Self::CrossTenant(_) => "cross_tenant",
            Self::CrossMountRename(_) => "cross_mount_rename",
            Self::MountConflict(_) => "mount_conflict",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Indeterminate(_) => "indeterminate",
            Self::Timeout(_) => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::CacheUnavailable(_) => "cache_unavailable",
            Self::Corrupt(_) => "corrupt",
            Self::SchemaError(_) => "schema_error",
        }
    }
}

/// Adds a short, static location tag to an error without losing its kind.
/// Mirrors the teacher's `WithContext` trait but keeps the stable
/// [`AgentFsError`] variant instead of collapsing to a string.
pub trait WithLoc<T> {
    /// Annotates the error (if any) with `loc`, a `module::function`-style
    /// static string.
    fn loc(self, loc: &'static str) -> Result<T>;
}

impl<T> WithLoc<T> for Result<T> {
    fn loc(self, loc: &'static str) -> Result<T> {
        self.map_err(|e| e.with_loc(loc))
    }
}

impl AgentFsError {
    /// Prefixes the error message with a location tag, preserving the
    /// variant so callers can still match on `tag()`.
    pub fn with_loc(self, loc: &'static str) -> Self {
        fn prefix(loc: &'static str, msg: String) -> String {
            format!("{loc}: {msg}")
        }
        match self {
            Self::NotFound(m) => Self::NotFound(prefix(loc, m)),
            Self::AlreadyExists(m) => Self::AlreadyExists(prefix(loc, m)),
            Self::InvalidArgument(m) => Self::InvalidArgument(prefix(loc, m)),
            Self::CasFailure(m) => Self::CasFailure(prefix(loc, m)),
            Self::CrossTenant(m) => Self::CrossTenant(prefix(loc, m)),
            Self::CrossMountRename(m) => Self::CrossMountRename(prefix(loc, m)),
            Self::MountConflict(m) => Self::MountConflict(prefix(loc, m)),
            Self::PermissionDenied(m) => Self::PermissionDenied(prefix(loc, m)),
            Self::Indeterminate(m) => Self::Indeterminate(prefix(loc, m)),
            Self::Timeout(m) => Self::Timeout(prefix(loc, m)),
            Self::Unavailable(m) => Self::Unavailable(prefix(loc, m)),
            Self::QuotaExceeded(m) => Self::QuotaExceeded(prefix(loc, m)),
            Self::CacheUnavailable(m) => Self::CacheUnavailable(prefix(loc, m)),
            Self::Corrupt(m) => Self::Corrupt(prefix(loc, m)),
            Self::SchemaError(m) => Self::SchemaError(prefix(loc, m)),
        }
    }
}

impl From<std::io::Error> for AgentFsError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match e.kind() {
            NotFound => AgentFsError::NotFound(e.to_string()),
            AlreadyExists => AgentFsError::AlreadyExists(e.to_string()),
            _ => AgentFsError::Unavailable(e.to_string()),
        }
    }
}
