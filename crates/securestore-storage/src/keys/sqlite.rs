//! SQLite key store
//!
//! Keys are stored as raw 32-byte blobs. The database file must be protected
//! like any other key material.

use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use zeroize::Zeroizing;

use super::{EncryptionKey, KeyStore};
use crate::error::{StorageError, StorageResult};

fn init_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS key_buckets (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL            -- Unix timestamp
        );

        CREATE TABLE IF NOT EXISTS encryption_keys (
            bucket TEXT NOT NULL REFERENCES key_buckets(name) ON DELETE CASCADE,
            object TEXT NOT NULL,
            key BLOB NOT NULL,
            PRIMARY KEY (bucket, object)
        );
    "#,
    )?;
    Ok(())
}

/// SQLite-backed key store
pub struct SqliteKeyStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyStore {
    /// Open or create a database at the given path
    pub fn open(path: &str) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn require_bucket(conn: &Connection, bucket: &str) -> StorageResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM key_buckets WHERE name = ?)",
        [bucket],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StorageError::BucketDoesNotExist(bucket.to_string()))
    }
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    async fn new_bucket(&self, bucket: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO key_buckets (name, created_at) VALUES (?, ?)",
            params![bucket, chrono::Utc::now().timestamp()],
        )?;
        if inserted == 0 {
            return Err(StorageError::BucketAlreadyExists(bucket.to_string()));
        }
        Ok(())
    }

    async fn write_key(&self, bucket: &str, object: &str, key: &EncryptionKey) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        require_bucket(&conn, bucket)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO encryption_keys (bucket, object, key) VALUES (?, ?, ?)",
            params![bucket, object, &key.as_bytes()[..]],
        )?;
        if inserted == 0 {
            return Err(StorageError::duplicate_object(bucket, object));
        }
        Ok(())
    }

    async fn read_key(&self, bucket: &str, object: &str) -> StorageResult<EncryptionKey> {
        let conn = self.conn.lock().unwrap();
        require_bucket(&conn, bucket)?;
        let bytes = conn
            .query_row(
                "SELECT key FROM encryption_keys WHERE bucket = ? AND object = ?",
                [bucket, object],
                |row| row.get::<_, Vec<u8>>(0).map(Zeroizing::new),
            )
            .optional()?
            .ok_or_else(|| StorageError::missing_object(bucket, object))?;
        EncryptionKey::from_bytes(&bytes)
    }

    async fn delete_key(&self, bucket: &str, object: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        require_bucket(&conn, bucket)?;
        let deleted = conn.execute(
            "DELETE FROM encryption_keys WHERE bucket = ? AND object = ?",
            [bucket, object],
        )?;
        if deleted == 0 {
            return Err(StorageError::missing_object(bucket, object));
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM key_buckets WHERE name = ?", [bucket])?;
        if deleted == 0 {
            return Err(StorageError::BucketDoesNotExist(bucket.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_key_written_once() {
        let store = SqliteKeyStore::in_memory().unwrap();
        store.new_bucket("bucket").await.unwrap();
        assert!(store.new_bucket("bucket").await.unwrap_err().is_conflict());

        let key = EncryptionKey::generate();
        store.write_key("bucket", "obj", &key).await.unwrap();
        let again = store.write_key("bucket", "obj", &EncryptionKey::generate()).await;
        assert!(again.unwrap_err().is_conflict());
        assert_eq!(store.read_key("bucket", "obj").await.unwrap(), key);

        store.delete_key("bucket", "obj").await.unwrap();
        assert!(store.read_key("bucket", "obj").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let store = SqliteKeyStore::in_memory().unwrap();
        let result = store.write_key("ghost", "obj", &EncryptionKey::generate()).await;
        assert!(matches!(result, Err(StorageError::BucketDoesNotExist(_))));
        assert!(store.delete_bucket("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_keys_survive_reopen() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("keys.db");
        let key = EncryptionKey::generate();
        {
            let store = SqliteKeyStore::open(path.to_str().unwrap()).unwrap();
            store.new_bucket("bucket").await.unwrap();
            store.write_key("bucket", "obj", &key).await.unwrap();
        }

        let store = SqliteKeyStore::open(path.to_str().unwrap()).unwrap();
        assert_eq!(store.read_key("bucket", "obj").await.unwrap(), key);

        store.delete_bucket("bucket").await.unwrap();
        store.new_bucket("bucket").await.unwrap();
        assert!(store.read_key("bucket", "obj").await.unwrap_err().is_not_found());
    }
}
