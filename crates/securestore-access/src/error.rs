//! Capability store error types

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type AccessResult<T> = Result<T, AccessError>;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("key assigned to url key {0} already exists")]
    KeyAlreadyExists(String),

    #[error("no key is assigned to the url key {0}")]
    KeyDoesntExist(String),

    #[error("TTL {ttl} already expired {elapsed} ago")]
    TtlAlreadyExpired {
        ttl: DateTime<Utc>,
        elapsed: chrono::Duration,
    },

    #[error("secret digest has the wrong length: expected {expected} bytes, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("invalid capability record: {0}")]
    InvalidRecord(String),

    #[error("record encoding failed: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("record decoding failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("malformed capability key JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache error: {0}")]
    Cache(String),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl AccessError {
    pub(crate) fn ttl_expired(ttl: DateTime<Utc>) -> Self {
        AccessError::TtlAlreadyExpired {
            ttl,
            elapsed: Utc::now() - ttl,
        }
    }

    /// The capability key is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, AccessError::KeyDoesntExist(_))
    }

    /// The `url_key` is already occupied
    pub fn is_conflict(&self) -> bool {
        matches!(self, AccessError::KeyAlreadyExists(_))
    }

    /// Caller supplied something malformed (stale TTL, bad digest, bad JSON)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AccessError::TtlAlreadyExpired { .. }
                | AccessError::InvalidDigestLength { .. }
                | AccessError::Json(_)
        )
    }
}
