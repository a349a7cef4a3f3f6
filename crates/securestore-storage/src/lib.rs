//! securestore-storage: Encrypted object storage
//!
//! Every object is split across three sub-stores: plaintext metadata, a
//! per-object symmetric key, and the ciphertext bytes. `EncryptedObjectStore`
//! sequences them and streams bytes through the cipher without buffering.
//!
//! ## Backends
//!
//! | Sub-store | Backends                                           | Feature Flag |
//! |-----------|----------------------------------------------------|--------------|
//! | Metadata  | `InMemoryMetadataStore`, `SqliteMetadataStore`     | `sqlite`     |
//! | Keys      | `InMemoryKeyStore`, `SqliteKeyStore`               | `sqlite`     |
//! | Objects   | `InMemoryObjectStorage`, `LocalFileStorage`        | (always)     |
//!
//! ## Example
//!
//! ```rust,ignore
//! use securestore_storage::{EncryptedObjectStore, EncryptionKey, Metadata};
//! use tokio::io::AsyncReadExt;
//!
//! let store = EncryptedObjectStore::in_memory();
//! store.new_bucket("docs").await?;
//!
//! let data = b"Hello, world";
//! let meta = Metadata::new(data.len() as u64, "hello.txt");
//! store.write("docs", "hello", &meta, &EncryptionKey::generate(), &data[..]).await?;
//!
//! let (meta, mut reader) = store.read("docs", "hello").await?;
//! let mut plaintext = Vec::new();
//! reader.read_to_end(&mut plaintext).await?;
//! ```

mod cipher;
mod error;
mod keys;
mod pipeline;
mod traits;

mod local;
mod memory;

pub mod metadata;

// Re-exports
pub use cipher::CipherReader;
pub use error::{StorageError, StorageResult};
pub use keys::{EncryptionKey, InMemoryKeyStore, KEY_LEN, KeyStore};
pub use metadata::{InMemoryMetadataStore, Metadata, MetadataStore};
pub use pipeline::EncryptedObjectStore;
pub use traits::{ObjectReader, ObjectStorage};

pub use local::LocalFileStorage;
pub use memory::InMemoryObjectStorage;

#[cfg(feature = "sqlite")]
pub use keys::SqliteKeyStore;
#[cfg(feature = "sqlite")]
pub use metadata::SqliteMetadataStore;
