//! securestore-access: Revocable capability keys for anonymous downloads
//!
//! A capability key grants download access to one stored object, optionally
//! bounded by an expiry instant, a usage limit and a set of accepted secret
//! digests. Stores revoke keys in the background once a trigger fires.
//!
//! ## Backends
//!
//! | Store                     | Feature  | Expiry                  |
//! |---------------------------|----------|-------------------------|
//! | `InMemoryCapabilityStore` | (none)   | per-key timer tasks     |
//! | `CacheCapabilityStore`    | (none)   | native cache TTL        |
//! | `SqliteCapabilityStore`   | `sqlite` | per-key timer tasks     |
//!
//! `CacheCapabilityStore` runs over any `CacheClient`; the `redis` feature
//! provides `RedisCache`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use securestore_access::{CapabilityKey, CapabilityStore, InMemoryCapabilityStore, KeyOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = InMemoryCapabilityStore::new();
//! let options = KeyOptions::new(None, Some(1), None, false)?;
//! store.add_key(CapabilityKey::new("bucket", "object", "url-key", options)).await?;
//!
//! let (report, key) = store.access(CancellationToken::new(), "url-key").await?;
//! // ... deliver key.bucket_id / key.object_id ...
//! report.consumed().settled().await;
//! ```

mod error;
mod external;
mod key;
mod report;
mod revocation;
mod secret;
mod store;

pub mod cache;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-exports
pub use error::{AccessError, AccessResult};
pub use external::ExternalCapabilityKey;
pub use key::{CapabilityKey, KeyOptions};
pub use report::{ReportHandle, UsageReport};
pub use secret::{DIGEST_LEN, SecretDigest, SecretValidator, digest, to_digest};
pub use store::CapabilityStore;

pub use cache::{CacheCapabilityStore, CacheClient, InMemoryCache};
pub use memory::InMemoryCapabilityStore;

#[cfg(feature = "redis")]
pub use cache::RedisCache;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCapabilityStore;
