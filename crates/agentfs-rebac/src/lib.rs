//! Components G and H: a Zanzibar-style tuple store and the userset-rewrite
//! check engine built on top of it.

#![deny(missing_docs)]

pub mod check;
pub mod closure;
pub mod tuple;

pub use check::{
    CheckDecision, CheckEngine, ConsistencyLevel, NamespaceConfig, ObjectPage, RewriteRule,
    DEFAULT_TIMEOUT, MAX_DEPTH, MAX_FAN_OUT,
};
pub use closure::GroupClosureIndex;
pub use tuple::{Caveat, Entity, InMemoryTupleStore, ListOrder, Subject, Tuple, TupleFilter, TuplePage, TupleStore};
