//! Encrypted object pipeline
//!
//! Binds metadata, the per-object key and ciphertext across three sub-stores.
//! Steps run in a fixed order and nothing is rolled back: a failure part-way
//! leaves the earlier stores written.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::debug;

use crate::cipher::CipherReader;
use crate::error::StorageResult;
use crate::keys::{EncryptionKey, InMemoryKeyStore, KeyStore};
use crate::memory::InMemoryObjectStorage;
use crate::metadata::{InMemoryMetadataStore, Metadata, MetadataStore};
use crate::traits::{ObjectReader, ObjectStorage};

#[derive(Clone)]
pub struct EncryptedObjectStore {
    metadata: Arc<dyn MetadataStore>,
    keys: Arc<dyn KeyStore>,
    objects: Arc<dyn ObjectStorage>,
}

impl EncryptedObjectStore {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        keys: Arc<dyn KeyStore>,
        objects: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            metadata,
            keys,
            objects,
        }
    }

    /// All three sub-stores in memory
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(InMemoryKeyStore::new()),
            Arc::new(InMemoryObjectStorage::new()),
        )
    }

    pub async fn new_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.metadata.new_bucket(bucket).await?;
        self.keys.new_bucket(bucket).await?;
        self.objects.new_bucket(bucket).await?;
        debug!(bucket, "created bucket");
        Ok(())
    }

    /// Encrypt `data` under `key` and store it with its metadata
    ///
    /// Returns the number of bytes stored. If that differs from
    /// `metadata.length`, the metadata is rewritten with the real length.
    pub async fn write<R>(
        &self,
        bucket: &str,
        object: &str,
        metadata: &Metadata,
        key: &EncryptionKey,
        data: R,
    ) -> StorageResult<u64>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.metadata.write(bucket, object, metadata).await?;
        self.keys.write_key(bucket, object, key).await?;

        let ciphertext: ObjectReader = Box::new(CipherReader::new(key, data));
        let written = self.objects.write(bucket, object, ciphertext).await?;

        if written != metadata.length {
            debug!(bucket, object, declared = metadata.length, written, "correcting object length");
            let corrected = Metadata {
                length: written,
                ..metadata.clone()
            };
            self.metadata.write(bucket, object, &corrected).await?;
        }
        Ok(written)
    }

    /// Open an object; plaintext is produced lazily as the stream is read
    pub async fn read(&self, bucket: &str, object: &str) -> StorageResult<(Metadata, ObjectReader)> {
        let metadata = self.metadata.read(bucket, object).await?;
        let key = self.keys.read_key(bucket, object).await?;
        let ciphertext = self.objects.read(bucket, object).await?;
        Ok((metadata, Box::new(CipherReader::new(&key, ciphertext))))
    }

    pub async fn delete(&self, bucket: &str, object: &str) -> StorageResult<()> {
        self.metadata.delete(bucket, object).await?;
        self.keys.delete_key(bucket, object).await?;
        self.objects.delete(bucket, object).await?;
        debug!(bucket, object, "deleted object");
        Ok(())
    }

    pub async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.metadata.delete_bucket(bucket).await?;
        self.keys.delete_bucket(bucket).await?;
        self.objects.delete_bucket(bucket).await?;
        debug!(bucket, "deleted bucket");
        Ok(())
    }

    /// Buckets as recorded by the metadata store
    pub async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        self.metadata.list_buckets().await
    }
}
