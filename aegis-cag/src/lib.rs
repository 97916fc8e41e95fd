//! Cache-augmented generation engine (spec §4.6): exact, similar, and
//! embedding hit tiers over a single-flight-coalesced downstream LLM call,
//! with adaptive TTL, deterministic eviction, and encrypted persistence.

mod engine;
mod entry;
mod normalize;
mod singleflight;
mod store;

pub use engine::{CacheEngine, CacheMetrics, QueryOptions};
pub use entry::{CacheEntry, CacheHitType, CacheResponse};
pub use normalize::{normalize, query_id};
pub use singleflight::SingleFlight;
pub use store::CachePersistence;
