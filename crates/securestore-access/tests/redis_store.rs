//! Live Redis suite; set REDIS_TEST_URL (default redis://127.0.0.1:6379)

#![cfg(feature = "redis-tests")]

mod common;

use std::sync::Arc;

use common::Store;
use securestore_access::{CacheCapabilityStore, RedisCache};

async fn store() -> Store {
    let url = std::env::var("REDIS_TEST_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
    let cache = RedisCache::connect(&url).await.unwrap();
    Arc::new(CacheCapabilityStore::new(cache))
}

// Tests share one server, so each uses its own url keys and runs serially
// through a single test function.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redis_contract() {
    let store = store().await;
    for url_key in ["dup-key", "limited-key", "expiring-key", "secret-key"] {
        let _ = store.delete_url_key(url_key).await;
    }

    common::duplicate_then_delete(store.clone()).await;
    let _ = store.delete_url_key("dup-key").await;
    common::missing_keys_not_found(store.clone()).await;
    common::limit_revokes_after_n_uses(store.clone()).await;
    common::expiry_revokes(store.clone()).await;
    common::counted_use_keeps_expiry(store.clone()).await;
    common::secret_survives_storage(store.clone()).await;
    let _ = store.delete_url_key("secret-key").await;
    common::concurrent_add_and_delete(store).await;
}
