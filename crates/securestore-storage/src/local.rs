//! Local filesystem object storage

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectReader, ObjectStorage};

/// Marks a directory as a storage root
const MARKER_FILE: &str = ".securestore.json";

const MARKER_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Marker {
    version: u32,
}

/// Local filesystem storage
///
/// Structure: `{root}/{bucket}/{object}`. The set of known objects is kept in
/// memory and rebuilt from the directory tree on open.
pub struct LocalFileStorage {
    root: PathBuf,
    index: RwLock<HashMap<String, HashSet<String>>>,
}

/// Reject names that would escape or collide with the storage layout
fn check_component(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(StorageError::InvalidPath(name.to_string()));
    }
    Ok(())
}

impl LocalFileStorage {
    /// Open storage at the given root directory
    ///
    /// Creates the directory if it doesn't exist. A directory that already
    /// holds files but no marker is refused.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let mut marked = false;
        let mut stray_files = 0usize;
        let mut index = HashMap::new();

        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                if check_component(&name).is_ok() {
                    let objects = Self::scan_bucket(&entry.path()).await?;
                    index.insert(name, objects);
                }
            } else if name == MARKER_FILE {
                marked = true;
            } else {
                stray_files += 1;
            }
        }
        if stray_files > 0 && !marked {
            return Err(StorageError::UnmarkedDirectory(root));
        }

        let marker = serde_json::to_vec(&Marker {
            version: MARKER_VERSION,
        })?;
        fs::write(root.join(MARKER_FILE), marker).await?;

        info!(root = %root.display(), buckets = index.len(), "opened local storage");
        Ok(Self {
            root,
            index: RwLock::new(index),
        })
    }

    async fn scan_bucket(dir: &Path) -> StorageResult<HashSet<String>> {
        let mut objects = HashSet::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if check_component(&name).is_ok() {
                objects.insert(name);
            }
        }
        Ok(objects)
    }

    /// Storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, object: &str) -> PathBuf {
        self.bucket_path(bucket).join(object)
    }

    fn contains(&self, bucket: &str, object: &str) -> StorageResult<bool> {
        let index = self.index.read().unwrap();
        let objects = index
            .get(bucket)
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?;
        Ok(objects.contains(object))
    }

    /// Claim an object name before its bytes land on disk
    fn reserve(&self, bucket: &str, object: &str) -> StorageResult<()> {
        let mut index = self.index.write().unwrap();
        let objects = index
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?;
        if !objects.insert(object.to_string()) {
            return Err(StorageError::duplicate_object(bucket, object));
        }
        Ok(())
    }

    fn release(&self, bucket: &str, object: &str) {
        if let Some(objects) = self.index.write().unwrap().get_mut(bucket) {
            objects.remove(object);
        }
    }

    async fn write_file(&self, bucket: &str, object: &str, mut data: ObjectReader) -> StorageResult<u64> {
        // Stage under a dot-name so a crash never leaves a half-written object
        let staging = self.bucket_path(bucket).join(format!(".{object}.partial"));
        let mut file = fs::File::create(&staging).await?;
        let written = tokio::io::copy(&mut data, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&staging, self.object_path(bucket, object)).await?;
        Ok(written)
    }
}

#[async_trait]
impl ObjectStorage for LocalFileStorage {
    async fn new_bucket(&self, bucket: &str) -> StorageResult<()> {
        check_component(bucket)?;
        {
            let mut index = self.index.write().unwrap();
            if index.contains_key(bucket) {
                return Err(StorageError::BucketAlreadyExists(bucket.to_string()));
            }
            index.insert(bucket.to_string(), HashSet::new());
        }

        let path = self.bucket_path(bucket);
        debug!(path = %path.display(), "creating bucket dir");
        if let Err(e) = fs::create_dir(&path).await {
            self.index.write().unwrap().remove(bucket);
            return Err(e.into());
        }
        Ok(())
    }

    async fn write(&self, bucket: &str, object: &str, data: ObjectReader) -> StorageResult<u64> {
        check_component(object)?;
        self.reserve(bucket, object)?;

        match self.write_file(bucket, object, data).await {
            Ok(written) => Ok(written),
            Err(e) => {
                self.release(bucket, object);
                let staging = self.bucket_path(bucket).join(format!(".{object}.partial"));
                let _ = fs::remove_file(staging).await;
                Err(e)
            }
        }
    }

    async fn read(&self, bucket: &str, object: &str) -> StorageResult<ObjectReader> {
        if !self.contains(bucket, object)? {
            return Err(StorageError::missing_object(bucket, object));
        }
        match fs::File::open(self.object_path(bucket, object)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            // Reserved but not yet renamed into place
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::missing_object(bucket, object))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, bucket: &str, object: &str) -> StorageResult<()> {
        {
            let mut index = self.index.write().unwrap();
            let objects = index
                .get_mut(bucket)
                .ok_or_else(|| StorageError::BucketDoesNotExist(bucket.to_string()))?;
            if !objects.remove(object) {
                return Err(StorageError::missing_object(bucket, object));
            }
        }

        match fs::remove_file(self.object_path(bucket, object)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let removed = self.index.write().unwrap().remove(bucket);
        if removed.is_none() {
            return Err(StorageError::BucketDoesNotExist(bucket.to_string()));
        }
        match fs::remove_dir_all(self.bucket_path(bucket)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self.index.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
