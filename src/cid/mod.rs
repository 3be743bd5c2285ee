//! Marker ledger and the CID document it produces.

pub mod cache;
pub mod document;
pub mod manager;

pub use cache::{check_cache, CacheDecision, CacheMiss};
pub use document::{
    CidDocument, ConditionNode, DecisionRecord, Evaluation, Polarity, CID_FORMAT_VERSION,
};
pub use manager::{calculate_hash, CidManager, IdSequence};
