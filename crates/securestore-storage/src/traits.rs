//! Raw object storage trait

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::StorageResult;

/// Byte stream handed into and out of object storage
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Bucketed storage of opaque byte streams
///
/// Objects are immutable once written: `write` fails with
/// `StorageError::ObjectAlreadyExists` rather than overwriting.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn new_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Drain `data` into a new object, returning the number of bytes stored
    async fn write(&self, bucket: &str, object: &str, data: ObjectReader) -> StorageResult<u64>;

    /// Open an object for streaming
    async fn read(&self, bucket: &str, object: &str) -> StorageResult<ObjectReader>;

    async fn delete(&self, bucket: &str, object: &str) -> StorageResult<()>;

    /// Remove a bucket and everything in it
    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Bucket names in sorted order
    async fn list_buckets(&self) -> StorageResult<Vec<String>>;
}
