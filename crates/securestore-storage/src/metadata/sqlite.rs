//! SQLite metadata store

use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::{Metadata, MetadataStore};
use crate::error::{StorageError, StorageResult};

fn init_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS buckets (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL            -- Unix timestamp
        );

        CREATE TABLE IF NOT EXISTS object_metadata (
            bucket TEXT NOT NULL REFERENCES buckets(name) ON DELETE CASCADE,
            object TEXT NOT NULL,
            length INTEGER NOT NULL,
            filename TEXT NOT NULL,
            PRIMARY KEY (bucket, object)
        );
    "#,
    )?;
    Ok(())
}

/// SQLite-backed metadata store
pub struct SqliteMetadataStore {
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
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

fn bucket_exists(conn: &Connection, bucket: &str) -> StorageResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM buckets WHERE name = ?)",
        [bucket],
        |row| row.get(0),
    )?)
}

fn require_bucket(conn: &Connection, bucket: &str) -> StorageResult<()> {
    if bucket_exists(conn, bucket)? {
        Ok(())
    } else {
        Err(StorageError::BucketDoesNotExist(bucket.to_string()))
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn new_bucket(&self, bucket: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO buckets (name, created_at) VALUES (?, ?)",
            params![bucket, chrono::Utc::now().timestamp()],
        )?;
        if inserted == 0 {
            return Err(StorageError::BucketAlreadyExists(bucket.to_string()));
        }
        Ok(())
    }

    async fn write(&self, bucket: &str, object: &str, metadata: &Metadata) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        require_bucket(&conn, bucket)?;
        conn.execute(
            "INSERT INTO object_metadata (bucket, object, length, filename)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (bucket, object)
             DO UPDATE SET length = excluded.length, filename = excluded.filename",
            params![
                bucket,
                object,
                i64::try_from(metadata.length).unwrap_or(i64::MAX),
                metadata.filename
            ],
        )?;
        Ok(())
    }

    async fn read(&self, bucket: &str, object: &str) -> StorageResult<Metadata> {
        let conn = self.conn.lock().unwrap();
        require_bucket(&conn, bucket)?;
        conn.query_row(
            "SELECT length, filename FROM object_metadata WHERE bucket = ? AND object = ?",
            [bucket, object],
            |row| {
                Ok(Metadata {
                    length: row.get::<_, i64>(0)? as u64,
                    filename: row.get(1)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StorageError::missing_object(bucket, object))
    }

    async fn delete(&self, bucket: &str, object: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        require_bucket(&conn, bucket)?;
        let deleted = conn.execute(
            "DELETE FROM object_metadata WHERE bucket = ? AND object = ?",
            [bucket, object],
        )?;
        if deleted == 0 {
            return Err(StorageError::missing_object(bucket, object));
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM buckets WHERE name = ?", [bucket])?;
        if deleted == 0 {
            return Err(StorageError::BucketDoesNotExist(bucket.to_string()));
        }
        Ok(())
    }

    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM buckets ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        store.new_bucket("photos").await.unwrap();
        assert!(store.new_bucket("photos").await.unwrap_err().is_conflict());

        store
            .write("photos", "cat", &Metadata::new(11, "cat.png"))
            .await
            .unwrap();
        store
            .write("photos", "cat", &Metadata::new(12, "cat2.png"))
            .await
            .unwrap();
        assert_eq!(
            store.read("photos", "cat").await.unwrap(),
            Metadata::new(12, "cat2.png")
        );

        store.delete_bucket("photos").await.unwrap();
        assert!(store.list_buckets().await.unwrap().is_empty());
        assert!(store.read("photos", "cat").await.unwrap_err().is_not_found());

        // Cascade removed the rows along with the bucket
        store.new_bucket("photos").await.unwrap();
        assert!(store.read("photos", "cat").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_bucket_creation_time_recorded() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        let before = chrono::Utc::now().timestamp();
        store.new_bucket("docs").await.unwrap();

        let created: i64 = store
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT created_at FROM buckets WHERE name = 'docs'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(created >= before);
        assert!(created <= chrono::Utc::now().timestamp());
    }

    #[tokio::test]
    async fn test_delete_missing_object() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        store.new_bucket("docs").await.unwrap();

        let result = store.delete("docs", "ghost").await;
        assert!(matches!(result, Err(StorageError::ObjectDoesNotExist { .. })));
    }
}
