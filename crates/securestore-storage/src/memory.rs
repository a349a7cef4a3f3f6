//! In-memory object storage (for testing)

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectReader, ObjectStorage};

type Bucket = HashMap<String, Arc<[u8]>>;

/// In-memory object storage for unit tests
///
/// Thread-safe via `RwLock`, not persistent.
#[derive(Default)]
pub struct InMemoryObjectStorage {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all buckets
    pub fn len(&self) -> usize {
        self.buckets.read().unwrap().values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored bytes of an object
    pub fn raw(&self, bucket: &str, object: &str) -> Option<Vec<u8>> {
        self.buckets
            .read()
            .unwrap()
            .get(bucket)?
            .get(object)
            .map(|data| data.to_vec())
    }

    fn ensure_slot(&self, bucket: &str, object: &str) -> StorageResult<()> {
        let buckets = self.buckets.read().unwrap();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?;
        if objects.contains_key(object) {
            return Err(StorageError::duplicate_object(bucket, object));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn new_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().unwrap();
        if buckets.contains_key(bucket) {
            return Err(StorageError::BucketAlreadyExists(bucket.to_string()));
        }
        buckets.insert(bucket.to_string(), Bucket::new());
        Ok(())
    }

    async fn write(&self, bucket: &str, object: &str, mut data: ObjectReader) -> StorageResult<u64> {
        self.ensure_slot(bucket, object)?;

        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        let written = buf.len() as u64;

        // Re-check: the bucket may have changed while the stream was drained
        let mut buckets = self.buckets.write().unwrap();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?;
        if objects.contains_key(object) {
            return Err(StorageError::duplicate_object(bucket, object));
        }
        objects.insert(object.to_string(), buf.into());
        Ok(written)
    }

    async fn read(&self, bucket: &str, object: &str) -> StorageResult<ObjectReader> {
        let buckets = self.buckets.read().unwrap();
        let data = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?
            .get(object)
            .cloned()
            .ok_or_else(|| StorageError::missing_object(bucket, object))?;
        Ok(Box::new(Cursor::new(data)))
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
