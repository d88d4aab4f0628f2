//! Static configuration for a [`crate::Facade`] instance: graph bounds,
//! cache sizing, the tombstone grace window and retry ceilings. Loaded from
//! TOML the way the rest of the workspace's embedding applications load
//! their settings, rather than wired up by hand at each call site.

use std::time::Duration;

use agentfs_std::{AgentFsError, Result};
use serde::{Deserialize, Serialize};

fn default_max_depth() -> usize {
    agentfs_rebac::MAX_DEPTH
}

fn default_max_fan_out() -> usize {
    agentfs_rebac::MAX_FAN_OUT
}

fn default_check_timeout_ms() -> u64 {
    agentfs_rebac::DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_content_grace_secs() -> u64 {
    60
}

fn default_l3_retries() -> u32 {
    3
}

fn default_l3_backoff_ms() -> u64 {
    10
}

/// Graph-traversal bounds handed to the check engine (spec §4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckBounds {
    /// Maximum userset-rewrite recursion depth.
    pub max_depth: usize,
    /// Maximum tuples visited across one `check`/`expand`/`list_objects`.
    pub max_fan_out: usize,
    /// Wall-clock budget per call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for CheckBounds {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_fan_out: default_max_fan_out(),
            timeout_ms: default_check_timeout_ms(),
        }
    }
}

impl CheckBounds {
    /// The configured timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Blob and version-history garbage collection settings (spec §4.D: "grace
/// window is configurable, minimum 60s").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Seconds a tombstoned blob waits before it is eligible for collection.
    pub content_grace_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            content_grace_secs: default_content_grace_secs(),
        }
    }
}

impl GcConfig {
    /// The configured grace window as a [`Duration`].
    pub fn content_grace(&self) -> Duration {
        Duration::from_secs(self.content_grace_secs)
    }
}

/// How hard the cache coordinator retries a failing L3 invalidation before
/// falling back to its failure policy (spec §4.L).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct L3RetryConfig {
    /// Number of retries after the first attempt.
    pub retries: u32,
    /// Initial backoff; doubles on each retry.
    pub backoff_ms: u64,
}

impl Default for L3RetryConfig {
    fn default() -> Self {
        Self {
            retries: default_l3_retries(),
            backoff_ms: default_l3_backoff_ms(),
        }
    }
}

/// Top-level configuration for an embedding application (spec §9 ambient
/// stack: "ReBAC graph limits, consistency default, closure cache enabled"
/// as construction-time settings on the check engine, generalized here to
/// the whole facade).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentFsConfig {
    /// Userset-rewrite traversal bounds.
    pub check: CheckBounds,
    /// Blob/version garbage collection settings.
    pub gc: GcConfig,
    /// L3 invalidation retry policy.
    pub l3_retry: L3RetryConfig,
}

impl AgentFsConfig {
    /// Parses configuration from a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AgentFsError::InvalidArgument(format!("config: {e}")))
    }

    /// Serializes the configuration back to TOML, e.g. to write out a
    /// default config file for a new deployment.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AgentFsError::InvalidArgument(format!("config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AgentFsConfig::from_toml("").unwrap();
        assert_eq!(config.check.max_depth, agentfs_rebac::MAX_DEPTH);
        assert_eq!(config.gc.content_grace_secs, 60);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = AgentFsConfig::from_toml("[gc]\ncontent_grace_secs = 120\n").unwrap();
        assert_eq!(config.gc.content_grace_secs, 120);
        assert_eq!(config.check.max_fan_out, agentfs_rebac::MAX_FAN_OUT);
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = AgentFsConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AgentFsConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.check.max_depth, config.check.max_depth);
    }
}
