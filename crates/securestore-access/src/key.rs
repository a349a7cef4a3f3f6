//! Capability key: an anonymous, revocable download token for one object

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{AccessError, AccessResult};
use crate::secret::SecretValidator;

/// Restrictions attached to a capability key at creation
#[derive(Clone, Debug, Default)]
pub struct KeyOptions {
    expires_at: Option<DateTime<Utc>>,
    limit: Option<u64>,
    secret: Option<SecretValidator>,
    resolve_secret_from_url: bool,
}

impl KeyOptions {
    /// Validate and bundle key restrictions
    ///
    /// Fails with `TtlAlreadyExpired` unless `ttl` lies strictly in the
    /// future. An empty validator means no secret is required.
    pub fn new(
        ttl: Option<DateTime<Utc>>,
        limit: Option<u64>,
        secret: Option<SecretValidator>,
        resolve_secret_from_url: bool,
    ) -> AccessResult<Self> {
        if let Some(ttl) = ttl {
            if ttl <= Utc::now() {
                return Err(AccessError::ttl_expired(ttl));
            }
        }
        Ok(Self::unchecked(ttl, limit, secret, resolve_secret_from_url))
    }

    /// Bundle restrictions read back from a backend, which may already be stale
    pub(crate) fn unchecked(
        ttl: Option<DateTime<Utc>>,
        limit: Option<u64>,
        secret: Option<SecretValidator>,
        resolve_secret_from_url: bool,
    ) -> Self {
        Self {
            expires_at: ttl,
            limit,
            secret: secret.filter(|s| !s.is_empty()),
            resolve_secret_from_url,
        }
    }
}

/// A capability key
///
/// Clones share the usage counter: a key handed out by the in-process store
/// observes increments made through the stored copy.
#[derive(Clone, Debug)]
pub struct CapabilityKey {
    pub bucket_id: String,
    pub object_id: String,
    /// Opaque token, unique among the live keys of a store
    pub url_key: String,
    expires_at: Option<DateTime<Utc>>,
    limit: Option<u64>,
    used_count: Arc<AtomicU64>,
    secret: Option<SecretValidator>,
    /// Transport hint: the secret travels in the URL rather than a header
    pub resolve_secret_from_url: bool,
}

impl CapabilityKey {
    pub fn new(
        bucket_id: impl Into<String>,
        object_id: impl Into<String>,
        url_key: impl Into<String>,
        options: KeyOptions,
    ) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            object_id: object_id.into(),
            url_key: url_key.into(),
            expires_at: options.expires_at,
            limit: options.limit,
            used_count: Arc::new(AtomicU64::new(0)),
            secret: options.secret,
            resolve_secret_from_url: options.resolve_secret_from_url,
        }
    }

    /// Restore the usage counter of a key read back from a backend
    pub(crate) fn with_used_count(self, used: u64) -> Self {
        Self {
            used_count: Arc::new(AtomicU64::new(used)),
            ..self
        }
    }

    pub fn expires(&self) -> bool {
        self.expires_at.is_some()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn limited(&self) -> bool {
        self.limit.is_some()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn used_count(&self) -> u64 {
        self.used_count.load(Ordering::SeqCst)
    }

    pub fn needs_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn secret(&self) -> Option<&SecretValidator> {
        self.secret.as_ref()
    }

    /// Check a presented secret digest; keys without a secret accept anything
    pub fn validate(&self, presented: &[u8]) -> AccessResult<bool> {
        match &self.secret {
            Some(validator) => validator.validate(presented),
            None => Ok(true),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    pub fn ensure_not_expired(&self) -> AccessResult<()> {
        match self.expires_at {
            Some(at) if at <= Utc::now() => Err(AccessError::ttl_expired(at)),
            _ => Ok(()),
        }
    }

    /// Time left until expiry; `None` for keys that never expire
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Whether the usage limit has been met or exceeded
    pub fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.used_count() >= limit)
    }

    /// Count one consumption, returning the updated count
    pub(crate) fn record_use(&self) -> u64 {
        self.used_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether both handles come from the same `CapabilityKey::new` call
    pub(crate) fn same_instance(&self, other: &CapabilityKey) -> bool {
        Arc::ptr_eq(&self.used_count, &other.used_count)
    }
}

impl PartialEq for CapabilityKey {
    fn eq(&self, other: &Self) -> bool {
        self.bucket_id == other.bucket_id
            && self.object_id == other.object_id
            && self.url_key == other.url_key
            && self.expires_at == other.expires_at
            && self.limit == other.limit
            && self.used_count() == other.used_count()
            && self.secret == other.secret
            && self.resolve_secret_from_url == other.resolve_secret_from_url
    }
}

impl Eq for CapabilityKey {}
