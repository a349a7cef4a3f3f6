//! Capability store over a `CacheClient`

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::CacheClient;
use super::record::CapabilityRecord;
use crate::error::{AccessError, AccessResult};
use crate::key::CapabilityKey;
use crate::report::UsageReport;
use crate::revocation::{KillQueue, Revoke};
use crate::store::CapabilityStore;

struct CacheReaper<C>(Arc<C>);

#[async_trait]
impl<C: CacheClient> Revoke for CacheReaper<C> {
    async fn revoke(&self, key: &CapabilityKey) -> AccessResult<()> {
        delete(self.0.as_ref(), &key.url_key).await
    }
}

async fn delete<C: CacheClient + ?Sized>(client: &C, url_key: &str) -> AccessResult<()> {
    if client.delete(url_key).await? {
        Ok(())
    } else {
        Err(AccessError::KeyDoesntExist(url_key.to_string()))
    }
}

/// Capability store whose only source of truth is the cache
///
/// Expiry is left to the cache's native TTL. Must be created inside a tokio
/// runtime.
pub struct CacheCapabilityStore<C: CacheClient> {
    client: Arc<C>,
    kills: KillQueue,
}

impl<C: CacheClient> CacheCapabilityStore<C> {
    pub fn new(client: C) -> Self {
        let client = Arc::new(client);
        let kills = KillQueue::spawn(CacheReaper(client.clone()));
        Self { client, kills }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

/// Apply one usage report to the cached record
async fn settle<C: CacheClient>(
    client: &C,
    kills: &KillQueue,
    url_key: &str,
    consumed: bool,
) -> AccessResult<()> {
    let Some(data) = client.get(url_key).await? else {
        // Revoked while the report was pending
        return Ok(());
    };
    let mut record = CapabilityRecord::from_bytes(&data)?;

    if consumed {
        record.used_times += 1;
        let key = CapabilityKey::try_from(record.clone())?;
        match key.remaining_ttl() {
            Some(ttl) if ttl.is_zero() => {
                debug!(url_key, "capability key expired during access");
                client.delete(url_key).await?;
                return Ok(());
            }
            ttl => {
                client.replace(url_key, record.to_bytes(), ttl).await?;
            }
        }
        debug!(url_key, used = record.used_times, "capability key consumed");
    }

    if record.limited && record.used_times >= record.limit {
        kills.post(CapabilityKey::try_from(record)?);
    }
    Ok(())
}

#[async_trait]
impl<C: CacheClient> CapabilityStore for CacheCapabilityStore<C> {
    async fn add_key(&self, key: CapabilityKey) -> AccessResult<()> {
        key.ensure_not_expired()?;
        let ttl = key.remaining_ttl();
        if let (Some(ttl), Some(at)) = (ttl, key.expires_at()) {
            if ttl.is_zero() {
                return Err(AccessError::ttl_expired(at));
            }
        }

        let record = CapabilityRecord::from(&key);
        if !self.client.set_new(&key.url_key, record.to_bytes(), ttl).await? {
            return Err(AccessError::KeyAlreadyExists(key.url_key));
        }
        debug!(url_key = %key.url_key, "added capability key");
        Ok(())
    }

    async fn access(
        &self,
        cancel: CancellationToken,
        url_key: &str,
    ) -> AccessResult<(UsageReport, CapabilityKey)> {
        let data = self
            .client
            .get(url_key)
            .await?
            .ok_or_else(|| AccessError::KeyDoesntExist(url_key.to_string()))?;
        let key = CapabilityKey::try_from(CapabilityRecord::from_bytes(&data)?)?;
        if key.is_expired() {
            return Err(AccessError::KeyDoesntExist(url_key.to_string()));
        }

        let (report, mut pending) = UsageReport::channel();
        let client = self.client.clone();
        let kills = self.kills.clone();
        let url_key = url_key.to_string();

        tokio::spawn(async move {
            let Some(consumed) = pending.wait(&cancel).await else {
                return;
            };
            if let Err(e) = settle(client.as_ref(), &kills, &url_key, consumed).await {
                warn!(url_key = %url_key, error = %e, "failed to apply usage report");
            }
        });

        Ok((report, key))
    }

    async fn delete_key(&self, key: &CapabilityKey) -> AccessResult<()> {
        delete(self.client.as_ref(), &key.url_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::key::KeyOptions;

    #[tokio::test]
    async fn test_usage_written_back() {
        let store = CacheCapabilityStore::new(InMemoryCache::new());
        let options = KeyOptions::new(None, Some(3), None, false).unwrap();
        store
            .add_key(CapabilityKey::new("b", "o", "u", options))
            .await
            .unwrap();

        let (report, _) = store.access(CancellationToken::new(), "u").await.unwrap();
        report.consumed().settled().await;
        let (report, key) = store.access(CancellationToken::new(), "u").await.unwrap();
        report.aborted().settled().await;

        assert_eq!(key.used_count(), 1);
    }

    #[tokio::test]
    async fn test_report_after_revocation_does_not_resurrect() {
        let store = CacheCapabilityStore::new(InMemoryCache::new());
        let key = CapabilityKey::new("b", "o", "u", KeyOptions::default());
        store.add_key(key.clone()).await.unwrap();

        let (report, _) = store.access(CancellationToken::new(), "u").await.unwrap();
        store.delete_key(&key).await.unwrap();
        report.consumed().settled().await;

        assert!(store.client().is_empty());
    }
}
