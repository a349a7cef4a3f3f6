//! Capability store trait

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::AccessResult;
use crate::key::{CapabilityKey, KeyOptions};
use crate::report::UsageReport;

/// Persistence and revocation of capability keys
///
/// Implementations must be thread-safe (Send + Sync) for use across async
/// tasks. Usage-limit and expiry revocation happen in background tasks owned
/// by the store, so they are eventual rather than immediate.
#[async_trait]
pub trait CapabilityStore: Send + Sync {
    /// Store a new key
    ///
    /// Fails with `KeyAlreadyExists` if the url key is taken, or
    /// `TtlAlreadyExpired` if the key has gone stale.
    async fn add_key(&self, key: CapabilityKey) -> AccessResult<()>;

    /// Resolve a url key
    ///
    /// The returned report decides whether this access counts towards the
    /// usage limit. If `cancel` fires before a report arrives the count is
    /// left alone.
    async fn access(
        &self,
        cancel: CancellationToken,
        url_key: &str,
    ) -> AccessResult<(UsageReport, CapabilityKey)>;

    /// Remove a key, failing with `KeyDoesntExist` if it is absent
    async fn delete_key(&self, key: &CapabilityKey) -> AccessResult<()>;

    /// Remove whatever key currently holds `url_key`
    async fn delete_url_key(&self, url_key: &str) -> AccessResult<()> {
        let key = CapabilityKey::new("", "", url_key, KeyOptions::default());
        self.delete_key(&key).await
    }
}
