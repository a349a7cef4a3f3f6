//! Behaviour every `CapabilityStore` backend must share

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use securestore_access::{
    AccessError, CapabilityKey, CapabilityStore, KeyOptions, SecretValidator, digest,
};
use tokio_util::sync::CancellationToken;

pub type Store = Arc<dyn CapabilityStore>;

pub fn plain_key(url_key: &str) -> CapabilityKey {
    CapabilityKey::new("bucket", "object", url_key, KeyOptions::default())
}

pub fn limited_key(url_key: &str, limit: u64) -> CapabilityKey {
    let options = KeyOptions::new(None, Some(limit), None, false).unwrap();
    CapabilityKey::new("bucket", "object", url_key, options)
}

pub fn expiring_key(url_key: &str, ttl: Duration) -> CapabilityKey {
    let at = Utc::now() + chrono::Duration::from_std(ttl).unwrap();
    let options = KeyOptions::new(Some(at), None, None, false).unwrap();
    CapabilityKey::new("bucket", "object", url_key, options)
}

pub fn expiring_limited_key(url_key: &str, ttl: Duration, limit: u64) -> CapabilityKey {
    let at = Utc::now() + chrono::Duration::from_std(ttl).unwrap();
    let options = KeyOptions::new(Some(at), Some(limit), None, false).unwrap();
    CapabilityKey::new("bucket", "object", url_key, options)
}

/// Poll until `url_key` can no longer be accessed
pub async fn wait_until_revoked(store: &Store, url_key: &str) {
    for _ in 0..300 {
        match store.access(CancellationToken::new(), url_key).await {
            Err(e) if e.is_not_found() => return,
            Err(e) => panic!("unexpected error: {e}"),
            Ok((report, _)) => drop(report),
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{url_key} was never revoked");
}

pub async fn duplicate_then_delete(store: Store) {
    let key = plain_key("dup-key");
    store.add_key(key.clone()).await.unwrap();

    let again = store.add_key(plain_key("dup-key")).await;
    assert!(matches!(again, Err(AccessError::KeyAlreadyExists(ref u)) if u == "dup-key"));

    store.delete_key(&key).await.unwrap();
    let result = store.access(CancellationToken::new(), "dup-key").await;
    assert!(result.unwrap_err().is_not_found());

    // The url key is free again
    store.add_key(plain_key("dup-key")).await.unwrap();
}

pub async fn missing_keys_not_found(store: Store) {
    let result = store.access(CancellationToken::new(), "nobody").await;
    assert!(matches!(result, Err(AccessError::KeyDoesntExist(_))));

    let result = store.delete_key(&plain_key("nobody")).await;
    assert!(result.unwrap_err().is_not_found());
}

pub async fn stale_ttl_rejected(store: Store) {
    let key = expiring_key("stale-key", Duration::from_millis(30));
    tokio::time::sleep(Duration::from_millis(60)).await;

    let result = store.add_key(key).await;
    assert!(matches!(result, Err(AccessError::TtlAlreadyExpired { .. })));
    let result = store.access(CancellationToken::new(), "stale-key").await;
    assert!(result.unwrap_err().is_not_found());
}

pub async fn limit_revokes_after_n_uses(store: Store) {
    store.add_key(limited_key("limited-key", 3)).await.unwrap();

    for _ in 0..3 {
        let (report, key) = store
            .access(CancellationToken::new(), "limited-key")
            .await
            .unwrap();
        assert_eq!(key.object_id, "object");
        report.consumed().settled().await;
    }

    wait_until_revoked(&store, "limited-key").await;
}

pub async fn aborted_access_not_counted(store: Store) {
    store.add_key(limited_key("aborted-key", 1)).await.unwrap();

    let (report, _) = store
        .access(CancellationToken::new(), "aborted-key")
        .await
        .unwrap();
    report.aborted().settled().await;

    let (report, _) = store
        .access(CancellationToken::new(), "aborted-key")
        .await
        .unwrap();
    drop(report);

    let (report, _) = store
        .access(CancellationToken::new(), "aborted-key")
        .await
        .unwrap();
    report.consumed().settled().await;
    wait_until_revoked(&store, "aborted-key").await;
}

pub async fn cancelled_access_not_counted(store: Store) {
    store.add_key(limited_key("cancel-key", 1)).await.unwrap();

    let cancel = CancellationToken::new();
    let (report, _) = store.access(cancel.clone(), "cancel-key").await.unwrap();
    cancel.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    report.consumed().settled().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.access(CancellationToken::new(), "cancel-key").await.is_ok());
}

pub async fn expiry_revokes(store: Store) {
    store
        .add_key(expiring_key("expiring-key", Duration::from_millis(150)))
        .await
        .unwrap();
    assert!(store.access(CancellationToken::new(), "expiring-key").await.is_ok());

    wait_until_revoked(&store, "expiring-key").await;
}

/// A counted use must keep the expiry in force
pub async fn counted_use_keeps_expiry(store: Store) {
    store
        .add_key(expiring_limited_key("counted-key", Duration::from_millis(300), 5))
        .await
        .unwrap();

    let (report, _) = store
        .access(CancellationToken::new(), "counted-key")
        .await
        .unwrap();
    report.consumed().settled().await;

    // Under the limit, so only the expiry can remove it
    let (report, key) = store
        .access(CancellationToken::new(), "counted-key")
        .await
        .unwrap();
    assert!(key.expires());
    assert_eq!(key.used_count(), 1);
    drop(report);

    wait_until_revoked(&store, "counted-key").await;
}

pub async fn secret_survives_storage(store: Store) {
    let validator = SecretValidator::from_secrets([b"letmein".as_slice()]);
    let options = KeyOptions::new(None, None, Some(validator), true).unwrap();
    store
        .add_key(CapabilityKey::new("bucket", "object", "secret-key", options))
        .await
        .unwrap();

    let (report, key) = store
        .access(CancellationToken::new(), "secret-key")
        .await
        .unwrap();
    report.aborted().settled().await;

    assert!(key.needs_secret());
    assert!(key.resolve_secret_from_url);
    assert!(key.validate(&digest(b"letmein")).unwrap());
    assert!(!key.validate(&digest(b"letmeout")).unwrap());
    assert!(key.validate(&[0u8; 12]).is_err());
}

pub async fn concurrent_add_and_delete(store: Store) {
    const N: usize = 32;

    let adds: Vec<_> = (0..N)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.add_key(plain_key(&format!("key-{i}"))).await })
        })
        .collect();
    for handle in adds {
        handle.await.unwrap().unwrap();
    }

    let deletes: Vec<_> = (0..N)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.delete_url_key(&format!("key-{i}")).await })
        })
        .collect();
    for handle in deletes {
        handle.await.unwrap().unwrap();
    }

    for i in 0..N {
        let result = store.access(CancellationToken::new(), &format!("key-{i}")).await;
        assert!(result.unwrap_err().is_not_found());
    }
}
