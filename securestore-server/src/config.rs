use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Collapse every download failure into one `403 access forbidden`
    #[serde(default)]
    pub hardened: bool,
    #[serde(default = "default_access_deadline_secs")]
    pub access_deadline_secs: u64,
    /// Bearer token for management routes; unset leaves them open
    #[serde(default)]
    pub admin_token: Option<String>,

    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub keys: KeyStoreConfig,
    #[serde(default)]
    pub access: AccessConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String, // "memory", "local"
    pub local_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetadataConfig {
    #[serde(default = "default_backend")]
    pub backend: String, // "memory", "sqlite"
    pub sqlite_path: Option<String>,
}

/// Where per-object encryption keys are kept
#[derive(Debug, Deserialize, Clone)]
pub struct KeyStoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String, // "memory", "sqlite"
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccessConfig {
    #[serde(default = "default_backend")]
    pub backend: String, // "memory", "redis", "sqlite"
    pub redis_url: Option<String>,
    pub sqlite_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local_path: None,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: None,
        }
    }
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: None,
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            redis_url: None,
            sqlite_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            hardened: false,
            access_deadline_secs: default_access_deadline_secs(),
            admin_token: None,
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            keys: KeyStoreConfig::default(),
            access: AccessConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_backend() -> String {
    "memory".into()
}
fn default_access_deadline_secs() -> u64 {
    100
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config: Config = Self::figment().extract()?;
        Ok(config)
    }

    /// `securestore.toml` overridden by `SECURESTORE_` env vars
    /// (`SECURESTORE_ACCESS__BACKEND=redis` sets `access.backend`)
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("securestore.toml"))
            .merge(Env::prefixed("SECURESTORE_").split("__"))
    }

    pub fn access_deadline(&self) -> Duration {
        Duration::from_secs(self.access_deadline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config: Config = Figment::new().merge(Toml::string("")).extract().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.access_deadline(), Duration::from_secs(100));
        assert_eq!(config.access.backend, "memory");
        assert!(!config.hardened);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_sections_parsed() {
        let toml = r#"
            hardened = true
            admin_token = "s3cret"

            [storage]
            backend = "local"
            local_path = "/var/lib/securestore"

            [keys]
            backend = "sqlite"
            sqlite_path = "/var/lib/securestore/keys.db"

            [access]
            backend = "redis"
            redis_url = "redis://127.0.0.1:6379"
        "#;
        let config: Config = Figment::new().merge(Toml::string(toml)).extract().unwrap();
        assert!(config.hardened);
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(config.storage.backend, "local");
        assert_eq!(config.storage.local_path.as_deref(), Some("/var/lib/securestore"));
        assert_eq!(config.access.backend, "redis");
        assert_eq!(config.metadata.backend, "memory");
        assert_eq!(config.keys.backend, "sqlite");
        assert_eq!(config.keys.sqlite_path.as_deref(), Some("/var/lib/securestore/keys.db"));
    }
}
