//! Tiered caching in front of the metadata providers
//!
//! Layout mirrors the read path: fingerprint derivation, the in-process
//! edge tier, the durable KV tier, and the unified read-through service
//! that owns the coalescer.

pub mod edge;
pub mod fingerprint;
pub mod kv;
pub mod unified;

pub use edge::EdgeCache;
pub use fingerprint::{fingerprint, QueryKind};
pub use kv::KvCache;
pub use unified::{CacheOutcome, CacheStatus, LoadError, LoadedValue, UnifiedCache};
