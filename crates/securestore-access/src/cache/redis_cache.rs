//! Redis cache client

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use super::client::CacheClient;
use crate::error::AccessResult;

/// Redis-backed cache over a reconnecting connection manager
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect and verify the server answers `PING`
    pub async fn connect(url: &str) -> AccessResult<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("connected to redis");
        Ok(Self { conn })
    }

    async fn set_conditional(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        condition: &str,
    ) -> AccessResult<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg(condition);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        // Nil reply when the condition does not hold
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> AccessResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_new(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> AccessResult<bool> {
        self.set_conditional(key, value, ttl, "NX").await
    }

    async fn replace(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> AccessResult<bool> {
        self.set_conditional(key, value, ttl, "XX").await
    }

    async fn delete(&self, key: &str) -> AccessResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }
}
