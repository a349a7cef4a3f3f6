#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use common::Store;
use securestore_access::SqliteCapabilityStore;

fn store() -> Store {
    Arc::new(SqliteCapabilityStore::in_memory().unwrap())
}

#[tokio::test]
async fn test_duplicate_then_delete() {
    common::duplicate_then_delete(store()).await;
}

#[tokio::test]
async fn test_missing_keys_not_found() {
    common::missing_keys_not_found(store()).await;
}

#[tokio::test]
async fn test_stale_ttl_rejected() {
    common::stale_ttl_rejected(store()).await;
}

#[tokio::test]
async fn test_limit_revokes_after_n_uses() {
    common::limit_revokes_after_n_uses(store()).await;
}

#[tokio::test]
async fn test_aborted_access_not_counted() {
    common::aborted_access_not_counted(store()).await;
}

#[tokio::test]
async fn test_cancelled_access_not_counted() {
    common::cancelled_access_not_counted(store()).await;
}

#[tokio::test]
async fn test_expiry_revokes() {
    common::expiry_revokes(store()).await;
}

#[tokio::test]
async fn test_counted_use_keeps_expiry() {
    common::counted_use_keeps_expiry(store()).await;
}

#[tokio::test]
async fn test_secret_survives_storage() {
    common::secret_survives_storage(store()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_and_delete() {
    common::concurrent_add_and_delete(store()).await;
}

#[tokio::test]
async fn test_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capabilities.db");
    let store: Store = Arc::new(SqliteCapabilityStore::open(path.to_str().unwrap()).unwrap());

    common::duplicate_then_delete(store.clone()).await;
    common::limit_revokes_after_n_uses(store).await;
}
