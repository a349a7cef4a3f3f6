//! Plaintext object metadata

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteMetadataStore;

/// Descriptive data stored unencrypted alongside an object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Plaintext length in bytes
    pub length: u64,
    pub filename: String,
}

impl Metadata {
    pub fn new(length: u64, filename: impl Into<String>) -> Self {
        Self {
            length,
            filename: filename.into(),
        }
    }
}

/// Bucketed metadata store; also the authority on which buckets exist
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn new_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Store metadata, replacing any previous entry for the object
    async fn write(&self, bucket: &str, object: &str, metadata: &Metadata) -> StorageResult<()>;

    async fn read(&self, bucket: &str, object: &str) -> StorageResult<Metadata>;

    async fn delete(&self, bucket: &str, object: &str) -> StorageResult<()>;

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Bucket names in sorted order
    async fn list_buckets(&self) -> StorageResult<Vec<String>>;
}

/// Process-local metadata store
#[derive(Default)]
pub struct InMemoryMetadataStore {
    buckets: RwLock<HashMap<String, HashMap<String, Metadata>>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn new_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().unwrap();
        if buckets.contains_key(bucket) {
            return Err(StorageError::BucketAlreadyExists(bucket.to_string()));
        }
        buckets.insert(bucket.to_string(), HashMap::new());
        Ok(())
    }

    async fn write(&self, bucket: &str, object: &str, metadata: &Metadata) -> StorageResult<()> {
        let mut buckets = self.buckets.write().unwrap();
        buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?
            .insert(object.to_string(), metadata.clone());
        Ok(())
    }

    async fn read(&self, bucket: &str, object: &str) -> StorageResult<Metadata> {
        let buckets = self.buckets.read().unwrap();
        buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?
            .get(object)
            .cloned()
            .ok_or_else(|| StorageError::missing_object(bucket, object))
    }

    async fn delete(&self, bucket: &str, object: &str) -> StorageResult<()> {
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

    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self.buckets.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_overwrites() {
        let store = InMemoryMetadataStore::new();
        store.new_bucket("bucket").await.unwrap();

        store.write("bucket", "obj", &Metadata::new(1, "a.txt")).await.unwrap();
        store.write("bucket", "obj", &Metadata::new(2, "b.txt")).await.unwrap();

        assert_eq!(
            store.read("bucket", "obj").await.unwrap(),
            Metadata::new(2, "b.txt")
        );
    }

    #[tokio::test]
    async fn test_write_requires_bucket() {
        let store = InMemoryMetadataStore::new();
        let result = store.write("missing", "obj", &Metadata::new(1, "a")).await;
        assert!(matches!(result, Err(StorageError::BucketDoesNotExist(_))));
    }

    #[tokio::test]
    async fn test_list_buckets_sorted() {
        let store = InMemoryMetadataStore::new();
        for name in ["zeta", "alpha", "mid"] {
            store.new_bucket(name).await.unwrap();
        }
        assert!(store.new_bucket("mid").await.unwrap_err().is_conflict());

        assert_eq!(store.list_buckets().await.unwrap(), ["alpha", "mid", "zeta"]);
    }
}
