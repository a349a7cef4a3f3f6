use std::sync::Arc;

use securestore_access::{
    CacheCapabilityStore, CapabilityStore, InMemoryCapabilityStore, RedisCache,
    SqliteCapabilityStore,
};
use securestore_storage::{
    EncryptedObjectStore, InMemoryKeyStore, InMemoryMetadataStore, InMemoryObjectStorage,
    KeyStore, LocalFileStorage, MetadataStore, ObjectStorage, SqliteKeyStore, SqliteMetadataStore,
};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub objects: EncryptedObjectStore,
    pub keys: Arc<dyn CapabilityStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let storage: Arc<dyn ObjectStorage> = match config.storage.backend.as_str() {
            "memory" => Arc::new(InMemoryObjectStorage::new()),
            "local" => {
                let path = config
                    .storage
                    .local_path
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("local storage requires local_path"))?;
                Arc::new(LocalFileStorage::new(path).await?)
            }
            other => anyhow::bail!(
                "Unknown storage backend '{}'. Valid options: 'memory', 'local'",
                other
            ),
        };

        let metadata: Arc<dyn MetadataStore> = match config.metadata.backend.as_str() {
            "memory" => Arc::new(InMemoryMetadataStore::new()),
            "sqlite" => {
                let path = config
                    .metadata
                    .sqlite_path
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("sqlite metadata requires sqlite_path"))?;
                Arc::new(SqliteMetadataStore::open(path)?)
            }
            other => anyhow::bail!(
                "Unknown metadata backend '{}'. Valid options: 'memory', 'sqlite'",
                other
            ),
        };

        let encryption_keys: Arc<dyn KeyStore> = match config.keys.backend.as_str() {
            "memory" => {
                // Persisted buckets would come back without their keys
                if config.storage.backend != "memory" || config.metadata.backend != "memory" {
                    anyhow::bail!(
                        "durable storage or metadata requires a durable key store (keys.backend = 'sqlite')"
                    );
                }
                Arc::new(InMemoryKeyStore::new())
            }
            "sqlite" => {
                let path = config
                    .keys
                    .sqlite_path
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("sqlite key store requires sqlite_path"))?;
                Arc::new(SqliteKeyStore::open(path)?)
            }
            other => anyhow::bail!(
                "Unknown key store backend '{}'. Valid options: 'memory', 'sqlite'",
                other
            ),
        };

        let keys: Arc<dyn CapabilityStore> = match config.access.backend.as_str() {
            "memory" => Arc::new(InMemoryCapabilityStore::new()),
            "redis" => {
                let url = config
                    .access
                    .redis_url
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("redis access store requires redis_url"))?;
                Arc::new(CacheCapabilityStore::new(RedisCache::connect(url).await?))
            }
            "sqlite" => {
                let path = config
                    .access
                    .sqlite_path
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("sqlite access store requires sqlite_path"))?;
                Arc::new(SqliteCapabilityStore::open(path)?)
            }
            other => anyhow::bail!(
                "Unknown access backend '{}'. Valid options: 'memory', 'redis', 'sqlite'",
                other
            ),
        };

        tracing::info!(
            storage = %config.storage.backend,
            metadata = %config.metadata.backend,
            keys = %config.keys.backend,
            access = %config.access.backend,
            "backends ready"
        );

        Ok(Self {
            objects: EncryptedObjectStore::new(metadata, encryption_keys, storage),
            keys,
            config: Arc::new(config.clone()),
        })
    }
}
