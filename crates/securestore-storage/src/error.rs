//! Storage error types

use std::path::PathBuf;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket with id {0} does not exist")]
    BucketDoesNotExist(String),

    #[error("bucket with id {0} already exists")]
    BucketAlreadyExists(String),

    #[error("object {object} does not exist in bucket {bucket}")]
    ObjectDoesNotExist { bucket: String, object: String },

    #[error("object {object} already exists in bucket {bucket}")]
    ObjectAlreadyExists { bucket: String, object: String },

    #[error("encryption key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid path component: {0}")]
    InvalidPath(String),

    #[error("directory {0} holds files but is not a storage root")]
    UnmarkedDirectory(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("marker file error: {0}")]
    Marker(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StorageError {
    pub(crate) fn missing_object(bucket: &str, object: &str) -> Self {
        StorageError::ObjectDoesNotExist {
            bucket: bucket.to_string(),
            object: object.to_string(),
        }
    }

    pub(crate) fn duplicate_object(bucket: &str, object: &str) -> Self {
        StorageError::ObjectAlreadyExists {
            bucket: bucket.to_string(),
            object: object.to_string(),
        }
    }

    /// Bucket or object absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::BucketDoesNotExist(_) | StorageError::ObjectDoesNotExist { .. }
        )
    }

    /// Bucket or object already present
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::BucketAlreadyExists(_) | StorageError::ObjectAlreadyExists { .. }
        )
    }
}
