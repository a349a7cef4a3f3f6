//! External JSON representation used by key-creation requests

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, AccessResult};
use crate::key::{CapabilityKey, KeyOptions};
use crate::secret::SecretValidator;

/// Capability key as submitted by clients
///
/// `ValidKeys` entries are base64 (standard alphabet) encoded 64-byte digests.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExternalCapabilityKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_list")]
    pub valid_keys: Vec<Vec<u8>>,
    #[serde(default)]
    pub resolve_by_url_key: bool,
    pub bucket_id: String,
    pub key_id: String,
    pub url_key: String,
}

impl ExternalCapabilityKey {
    /// Parse and validate a JSON request body in one step
    pub fn parse(json: &str) -> AccessResult<CapabilityKey> {
        let external: ExternalCapabilityKey = serde_json::from_str(json)?;
        external.try_into()
    }
}

impl TryFrom<ExternalCapabilityKey> for CapabilityKey {
    type Error = AccessError;

    fn try_from(ex: ExternalCapabilityKey) -> AccessResult<Self> {
        let validator = if ex.valid_keys.is_empty() {
            None
        } else {
            Some(SecretValidator::from_digests(&ex.valid_keys)?)
        };
        let options = KeyOptions::new(ex.ttl, ex.limit, validator, ex.resolve_by_url_key)?;
        Ok(CapabilityKey::new(ex.bucket_id, ex.key_id, ex.url_key, options))
    }
}

impl From<&CapabilityKey> for ExternalCapabilityKey {
    fn from(key: &CapabilityKey) -> Self {
        Self {
            ttl: key.expires_at(),
            limit: key.limit(),
            valid_keys: key
                .secret()
                .map(|s| s.iter().map(|d| d.to_vec()).collect())
                .unwrap_or_default(),
            resolve_by_url_key: key.resolve_secret_from_url,
            bucket_id: key.bucket_id.clone(),
            key_id: key.object_id.clone(),
            url_key: key.url_key.clone(),
        }
    }
}

mod base64_list {
    use super::BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(keys: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: Vec<String> = keys.iter().map(|k| BASE64.encode(k)).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded: Option<Vec<String>> = Option::deserialize(deserializer)?;
        encoded
            .unwrap_or_default()
            .iter()
            .map(|s| BASE64.decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}
