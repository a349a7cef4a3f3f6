//! Distributed-cache capability backend
//!
//! Keys live in an external cache as protobuf records with a native TTL. The
//! store process keeps no key state of its own; only usage-limit revocation
//! goes through a local kill queue.

mod client;
mod record;
#[cfg(feature = "redis")]
mod redis_cache;
mod store;

pub use client::{CacheClient, InMemoryCache};
pub use record::{CapabilityRecord, RecordTimestamp};
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
pub use store::CacheCapabilityStore;
