//! Components I through L: the three-tier permission cache (L1 decision
//! cache, L2 namespace/mount-view cache, L3 persistent namespace view) and
//! the `CacheCoordinator` that keeps all three coherent with the
//! authoritative ReBAC tuple store.

#![deny(missing_docs)]

pub mod coordinator;
pub mod l1;
pub mod l2;
pub mod l3;

pub use coordinator::{CacheCoordinator, L3FailurePolicy};
pub use l1::{CacheStats, CachedDecision, DecisionCache, DecisionKey};
pub use l2::{MountVisibilityOracle, NamespaceCache, NamespaceView, MOUNT_OBJECT_TYPE};
pub use l3::PersistentNamespaceStore;
