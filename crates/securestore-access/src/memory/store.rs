//! In-memory capability store

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AccessError, AccessResult};
use crate::key::CapabilityKey;
use crate::report::UsageReport;
use crate::revocation::{ExpiryScheduler, KillQueue, Revoke};
use crate::store::CapabilityStore;

type KeyMap = Arc<DashMap<String, CapabilityKey>>;

/// Revocation target; only removes the exact key instance that was queued
struct Reaper(KeyMap);

#[async_trait]
impl Revoke for Reaper {
    async fn revoke(&self, key: &CapabilityKey) -> AccessResult<()> {
        self.0
            .remove_if(&key.url_key, |_, stored| stored.same_instance(key))
            .map(|_| ())
            .ok_or_else(|| AccessError::KeyDoesntExist(key.url_key.clone()))
    }
}

/// Process-local capability store
///
/// Must be created inside a tokio runtime; the revocation tasks are spawned on
/// construction and stop when the store is dropped.
pub struct InMemoryCapabilityStore {
    keys: KeyMap,
    kills: KillQueue,
    expiry: ExpiryScheduler,
}

impl InMemoryCapabilityStore {
    pub fn new() -> Self {
        let keys: KeyMap = Arc::new(DashMap::new());
        let kills = KillQueue::spawn(Reaper(keys.clone()));
        let expiry = ExpiryScheduler::spawn(kills.clone());
        Self {
            keys,
            kills,
            expiry,
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for InMemoryCapabilityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityStore for InMemoryCapabilityStore {
    async fn add_key(&self, key: CapabilityKey) -> AccessResult<()> {
        key.ensure_not_expired()?;

        match self.keys.entry(key.url_key.clone()) {
            Entry::Occupied(_) => Err(AccessError::KeyAlreadyExists(key.url_key)),
            Entry::Vacant(slot) => {
                self.expiry.schedule(&key);
                debug!(url_key = %key.url_key, "added capability key");
                slot.insert(key);
                Ok(())
            }
        }
    }

    async fn access(
        &self,
        cancel: CancellationToken,
        url_key: &str,
    ) -> AccessResult<(UsageReport, CapabilityKey)> {
        let key = self
            .keys
            .get(url_key)
            .map(|k| k.value().clone())
            .filter(|k| !k.is_expired())
            .ok_or_else(|| AccessError::KeyDoesntExist(url_key.to_string()))?;

        let (report, mut pending) = UsageReport::channel();
        let kills = self.kills.clone();
        let tracked = key.clone();

        tokio::spawn(async move {
            let Some(consumed) = pending.wait(&cancel).await else {
                return;
            };
            if consumed {
                let used = tracked.record_use();
                debug!(url_key = %tracked.url_key, used, "capability key consumed");
            }
            if tracked.limit_reached() {
                kills.post(tracked);
            }
        });

        Ok((report, key))
    }

    async fn delete_key(&self, key: &CapabilityKey) -> AccessResult<()> {
        self.expiry.cancel(&key.url_key);
        self.keys
            .remove(&key.url_key)
            .map(|_| ())
            .ok_or_else(|| AccessError::KeyDoesntExist(key.url_key.clone()))
    }
}
