//! Background revocation shared by the capability backends
//!
//! Each store owns one kill-queue drainer and, when it has no native expiry,
//! an expiry scheduler that starts one timer task per expiring key.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AccessResult;
use crate::key::CapabilityKey;

/// Backend side of a revocation
#[async_trait]
pub(crate) trait Revoke: Send + Sync + 'static {
    async fn revoke(&self, key: &CapabilityKey) -> AccessResult<()>;
}

/// Single-consumer queue of keys to delete
#[derive(Clone, Debug)]
pub(crate) struct KillQueue {
    tx: mpsc::UnboundedSender<CapabilityKey>,
}

impl KillQueue {
    /// Start the drainer; it stops once every queue handle is dropped
    pub(crate) fn spawn<T: Revoke>(target: T) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<CapabilityKey>();

        tokio::spawn(async move {
            while let Some(key) = rx.recv().await {
                match target.revoke(&key).await {
                    Ok(()) => debug!(url_key = %key.url_key, "revoked capability key"),
                    Err(e) if e.is_not_found() => {
                        debug!(url_key = %key.url_key, "capability key already gone")
                    }
                    Err(e) => {
                        warn!(url_key = %key.url_key, error = %e, "failed to revoke capability key")
                    }
                }
            }
        });

        Self { tx }
    }

    pub(crate) fn post(&self, key: CapabilityKey) {
        if self.tx.send(key).is_err() {
            debug!("kill queue closed, dropping revocation");
        }
    }
}

struct Timer {
    generation: u64,
    token: CancellationToken,
}

/// Time-based kill queue: one cancellable timer per expiring key
#[derive(Debug)]
pub(crate) struct ExpiryScheduler {
    tx: mpsc::UnboundedSender<(CapabilityKey, u64, CancellationToken)>,
    timers: Arc<DashMap<String, Timer>>,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl ExpiryScheduler {
    pub(crate) fn spawn(kills: KillQueue) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(CapabilityKey, u64, CancellationToken)>();
        let timers: Arc<DashMap<String, Timer>> = Arc::new(DashMap::new());

        let registry = timers.clone();
        tokio::spawn(async move {
            while let Some((key, generation, token)) = rx.recv().await {
                let Some(delay) = key.remaining_ttl() else {
                    continue;
                };
                let kills = kills.clone();
                let registry = registry.clone();

                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            registry.remove_if(&key.url_key, |_, t| t.generation == generation);
                            debug!(url_key = %key.url_key, "capability key expired");
                            kills.post(key);
                        }
                    }
                });
            }
        });

        Self {
            tx,
            timers,
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Arm a timer for an expiring key; keys without a TTL are ignored
    pub(crate) fn schedule(&self, key: &CapabilityKey) {
        if !key.expires() {
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();
        let timer = Timer {
            generation,
            token: token.clone(),
        };
        if let Some(stale) = self.timers.insert(key.url_key.clone(), timer) {
            stale.token.cancel();
        }
        if self.tx.send((key.clone(), generation, token)).is_err() {
            debug!("expiry scheduler closed");
        }
    }

    /// Disarm the timer for `url_key`, if any
    pub(crate) fn cancel(&self, url_key: &str) {
        if let Some((_, timer)) = self.timers.remove(url_key) {
            timer.token.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
