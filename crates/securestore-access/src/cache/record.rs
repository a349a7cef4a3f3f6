//! Binary cache record for capability keys

use chrono::{DateTime, Utc};
use prost::Message;

use crate::error::{AccessError, AccessResult};
use crate::key::{CapabilityKey, KeyOptions};
use crate::secret::SecretValidator;

/// Wire-compatible with `google.protobuf.Timestamp`
#[derive(Clone, Copy, PartialEq, Eq, Message)]
pub struct RecordTimestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

impl From<DateTime<Utc>> for RecordTimestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self {
            seconds: at.timestamp(),
            nanos: at.timestamp_subsec_nanos() as i32,
        }
    }
}

impl TryFrom<RecordTimestamp> for DateTime<Utc> {
    type Error = AccessError;

    fn try_from(ts: RecordTimestamp) -> AccessResult<Self> {
        u32::try_from(ts.nanos)
            .ok()
            .and_then(|nanos| DateTime::from_timestamp(ts.seconds, nanos))
            .ok_or_else(|| {
                AccessError::InvalidRecord(format!(
                    "timestamp out of range: {}s {}ns",
                    ts.seconds, ts.nanos
                ))
            })
    }
}

/// Capability key as stored in the cache
#[derive(Clone, PartialEq, Eq, Message)]
pub struct CapabilityRecord {
    #[prost(bool, tag = "1")]
    pub expires: bool,
    #[prost(message, optional, tag = "2")]
    pub ttl: Option<RecordTimestamp>,
    #[prost(bool, tag = "3")]
    pub limited: bool,
    #[prost(uint64, tag = "4")]
    pub limit: u64,
    #[prost(uint64, tag = "5")]
    pub used_times: u64,
    #[prost(string, tag = "6")]
    pub bucket_id: String,
    #[prost(string, tag = "7")]
    pub key_id: String,
    #[prost(string, tag = "8")]
    pub url_key: String,
    #[prost(bool, tag = "9")]
    pub needs_key: bool,
    #[prost(bytes = "vec", repeated, tag = "10")]
    pub valid_keys: Vec<Vec<u8>>,
    #[prost(bool, tag = "11")]
    pub resolve_by_url_key: bool,
}

impl CapabilityRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> AccessResult<Self> {
        Ok(Self::decode(bytes)?)
    }
}

impl From<&CapabilityKey> for CapabilityRecord {
    fn from(key: &CapabilityKey) -> Self {
        Self {
            expires: key.expires(),
            ttl: key.expires_at().map(RecordTimestamp::from),
            limited: key.limited(),
            limit: key.limit().unwrap_or(0),
            used_times: key.used_count(),
            bucket_id: key.bucket_id.clone(),
            key_id: key.object_id.clone(),
            url_key: key.url_key.clone(),
            needs_key: key.needs_secret(),
            valid_keys: key
                .secret()
                .map(|s| s.iter().map(|d| d.to_vec()).collect())
                .unwrap_or_default(),
            resolve_by_url_key: key.resolve_secret_from_url,
        }
    }
}

impl TryFrom<CapabilityRecord> for CapabilityKey {
    type Error = AccessError;

    fn try_from(record: CapabilityRecord) -> AccessResult<Self> {
        let ttl = match (record.expires, record.ttl) {
            (true, Some(ts)) => Some(DateTime::<Utc>::try_from(ts)?),
            (true, None) => {
                return Err(AccessError::InvalidRecord(
                    "expiring record without ttl".to_string(),
                ));
            }
            (false, _) => None,
        };
        let secret = if record.needs_key {
            Some(SecretValidator::from_digests(&record.valid_keys)?)
        } else {
            None
        };
        let limit = record.limited.then_some(record.limit);
        let options = KeyOptions::unchecked(ttl, limit, secret, record.resolve_by_url_key);

        Ok(
            CapabilityKey::new(record.bucket_id, record.key_id, record.url_key, options)
                .with_used_count(record.used_times),
        )
    }
}
