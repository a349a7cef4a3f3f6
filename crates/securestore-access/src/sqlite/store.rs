//! SQLite capability store

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::schema::init_schema;
use crate::error::{AccessError, AccessResult};
use crate::key::{CapabilityKey, KeyOptions};
use crate::report::UsageReport;
use crate::revocation::{ExpiryScheduler, KillQueue, Revoke};
use crate::secret::SecretValidator;
use crate::store::CapabilityStore;

type Db = Arc<Mutex<Connection>>;

/// SQLite-backed capability store
///
/// Every operation, including background revocation and usage reports, takes
/// the same connection lock, so counter updates never interleave within one
/// process. Must be created inside a tokio runtime.
pub struct SqliteCapabilityStore {
    conn: Db,
    kills: KillQueue,
    expiry: ExpiryScheduler,
}

/// Revocation target; deletes a row only while it is actually expired or
/// exhausted, so a newer key under the same url key survives stale triggers
struct Reaper(Db);

#[async_trait]
impl Revoke for Reaper {
    async fn revoke(&self, key: &CapabilityKey) -> AccessResult<()> {
        let conn = self.0.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM capability_keys WHERE url_key = ?1 AND (
                 (expires_at IS NOT NULL AND expires_at <= ?2)
                 OR (usage_limit IS NOT NULL AND used_times >= usage_limit)
             )",
            params![key.url_key, now_millis()],
        )?;
        if deleted == 0 {
            return Err(AccessError::KeyDoesntExist(key.url_key.clone()));
        }
        Ok(())
    }
}

impl SqliteCapabilityStore {
    /// Open or create a database at the given path
    ///
    /// Keys that went stale while the store was closed are purged and timers
    /// are re-armed for the remaining expiring keys.
    pub fn open(path: &str) -> AccessResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> AccessResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> AccessResult<Self> {
        init_schema(&conn)?;
        let conn: Db = Arc::new(Mutex::new(conn));
        let kills = KillQueue::spawn(Reaper(conn.clone()));
        let expiry = ExpiryScheduler::spawn(kills.clone());
        let store = Self {
            conn,
            kills,
            expiry,
        };
        store.restore()?;
        Ok(store)
    }

    fn restore(&self) -> AccessResult<()> {
        let conn = self.conn.lock().unwrap();
        let purged = conn.execute(
            "DELETE FROM capability_keys
             WHERE (expires_at IS NOT NULL AND expires_at <= ?1)
                OR (usage_limit IS NOT NULL AND used_times >= usage_limit)",
            [now_millis()],
        )?;

        let mut stmt =
            conn.prepare("SELECT url_key FROM capability_keys WHERE expires_at IS NOT NULL")?;
        let url_keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for url_key in &url_keys {
            if let Some((_, key)) = load_key(&conn, url_key)? {
                self.expiry.schedule(&key);
            }
        }

        if purged > 0 || !url_keys.is_empty() {
            info!(purged, rearmed = url_keys.len(), "restored capability keys");
        }
        Ok(())
    }

    /// Number of stored keys
    pub fn count(&self) -> AccessResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM capability_keys", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Read a key and its row id
fn load_key(conn: &Connection, url_key: &str) -> AccessResult<Option<(i64, CapabilityKey)>> {
    let row = conn
        .query_row(
            "SELECT id, bucket_id, object_id, expires_at, usage_limit, used_times, resolve_by_url_key
             FROM capability_keys WHERE url_key = ?",
            [url_key],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, bool>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((id, bucket_id, object_id, expires_at, limit, used, resolve)) = row else {
        return Ok(None);
    };

    let ttl = expires_at
        .map(|ms| {
            DateTime::<Utc>::from_timestamp_millis(ms)
                .ok_or_else(|| AccessError::InvalidRecord(format!("bad expiry {ms}")))
        })
        .transpose()?;

    let mut stmt = conn.prepare("SELECT digest FROM secret_digests WHERE key_id = ?")?;
    let digests = stmt
        .query_map([id], |row| row.get::<_, Vec<u8>>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let secret = Some(SecretValidator::from_digests(&digests)?);

    let options = KeyOptions::unchecked(ttl, limit.map(|l| l as u64), secret, resolve);
    let key = CapabilityKey::new(bucket_id, object_id, url_key, options).with_used_count(used as u64);
    Ok(Some((id, key)))
}

/// Apply a usage report to row `id`; returns the refreshed key when it has
/// reached its limit
fn settle(conn: &Connection, id: i64, consumed: bool) -> AccessResult<Option<CapabilityKey>> {
    if consumed {
        let updated = conn.execute(
            "UPDATE capability_keys SET used_times = used_times + 1 WHERE id = ?",
            [id],
        )?;
        if updated == 0 {
            // Revoked while the report was pending
            return Ok(None);
        }
    }

    let url_key: Option<String> = conn
        .query_row(
            "SELECT url_key FROM capability_keys WHERE id = ?",
            [id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(url_key) = url_key else {
        return Ok(None);
    };

    Ok(load_key(conn, &url_key)?
        .map(|(_, key)| key)
        .filter(|key| key.limit_reached()))
}

#[async_trait]
impl CapabilityStore for SqliteCapabilityStore {
    async fn add_key(&self, key: CapabilityKey) -> AccessResult<()> {
        key.ensure_not_expired()?;

        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM capability_keys WHERE url_key = ?)",
                [&key.url_key],
                |row| row.get(0),
            )?;
            if exists {
                return Err(AccessError::KeyAlreadyExists(key.url_key));
            }

            tx.execute(
                "INSERT INTO capability_keys
                 (url_key, bucket_id, object_id, expires_at, usage_limit, used_times,
                  resolve_by_url_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    key.url_key,
                    key.bucket_id,
                    key.object_id,
                    key.expires_at().map(|at| at.timestamp_millis()),
                    key.limit().map(clamp_i64),
                    clamp_i64(key.used_count()),
                    key.resolve_secret_from_url,
                    now_millis(),
                ],
            )?;
            let id = tx.last_insert_rowid();

            if let Some(secret) = key.secret() {
                let mut stmt =
                    tx.prepare("INSERT INTO secret_digests (key_id, digest) VALUES (?, ?)")?;
                for digest in secret.iter() {
                    stmt.execute(params![id, digest.as_slice()])?;
                }
            }
            tx.commit()?;
        }

        self.expiry.schedule(&key);
        debug!(url_key = %key.url_key, "added capability key");
        Ok(())
    }

    async fn access(
        &self,
        cancel: CancellationToken,
        url_key: &str,
    ) -> AccessResult<(UsageReport, CapabilityKey)> {
        let (id, key) = {
            let conn = self.conn.lock().unwrap();
            load_key(&conn, url_key)?
                .filter(|(_, key)| !key.is_expired())
                .ok_or_else(|| AccessError::KeyDoesntExist(url_key.to_string()))?
        };

        let (report, mut pending) = UsageReport::channel();
        let conn = self.conn.clone();
        let kills = self.kills.clone();

        tokio::spawn(async move {
            let Some(consumed) = pending.wait(&cancel).await else {
                return;
            };
            let result = {
                let conn = conn.lock().unwrap();
                settle(&conn, id, consumed)
            };
            match result {
                Ok(Some(exhausted)) => kills.post(exhausted),
                Ok(None) => {}
                Err(e) => warn!(id, error = %e, "failed to apply usage report"),
            }
        });

        Ok((report, key))
    }

    async fn delete_key(&self, key: &CapabilityKey) -> AccessResult<()> {
        self.expiry.cancel(&key.url_key);
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM capability_keys WHERE url_key = ?",
            [&key.url_key],
        )?;
        if deleted == 0 {
            return Err(AccessError::KeyDoesntExist(key.url_key.clone()));
        }
        Ok(())
    }
}
