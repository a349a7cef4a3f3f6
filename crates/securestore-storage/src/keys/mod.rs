//! Per-object encryption keys

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use rand::{RngCore, rngs::OsRng};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{StorageError, StorageResult};

#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKeyStore;

pub const KEY_LEN: usize = 32;

/// Symmetric key for one stored object (zeroized on drop)
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Fresh key from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| StorageError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Bucketed store of encryption keys
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn new_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Store a key; fails if the object already has one
    async fn write_key(&self, bucket: &str, object: &str, key: &EncryptionKey) -> StorageResult<()>;

    async fn read_key(&self, bucket: &str, object: &str) -> StorageResult<EncryptionKey>;

    async fn delete_key(&self, bucket: &str, object: &str) -> StorageResult<()>;

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;
}

/// Process-local key store
#[derive(Default)]
pub struct InMemoryKeyStore {
    buckets: RwLock<HashMap<String, HashMap<String, EncryptionKey>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn new_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().unwrap();
        if buckets.contains_key(bucket) {
            return Err(StorageError::BucketAlreadyExists(bucket.to_string()));
        }
        buckets.insert(bucket.to_string(), HashMap::new());
        Ok(())
    }

    async fn write_key(&self, bucket: &str, object: &str, key: &EncryptionKey) -> StorageResult<()> {
        let mut buckets = self.buckets.write().unwrap();
        let keys = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?;
        if keys.contains_key(object) {
            return Err(StorageError::duplicate_object(bucket, object));
        }
        keys.insert(object.to_string(), key.clone());
        Ok(())
    }

    async fn read_key(&self, bucket: &str, object: &str) -> StorageResult<EncryptionKey> {
        let buckets = self.buckets.read().unwrap();
        buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?
            .get(object)
            .cloned()
            .ok_or_else(|| StorageError::missing_object(bucket, object))
    }

    async fn delete_key(&self, bucket: &str, object: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().unwrap();
        buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?
            .remove(object)
            .map(|_| ())
            .ok_or_else(|| StorageError::missing_object(bucket, object))
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.buckets
            .write()
            .unwrap()
            .remove(bucket)
            .map(|_| ())
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))
    }
}
