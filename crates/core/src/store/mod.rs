//! Persistent string-keyed storage.
//!
//! This is the leaf the cache and the offline queue are built on. Two backends
//! are provided:
//!
//! - [`SqliteStore`]: durable storage in a single `kv` table, accessed through
//!   tokio-rusqlite with WAL mode and versioned migrations
//! - [`MemoryStore`]: process-local map for tests and ephemeral sessions

pub mod connection;
pub mod memory;
pub mod migrations;

use async_trait::async_trait;

use crate::Error;

pub use connection::SqliteStore;
pub use memory::MemoryStore;

/// Asynchronous key-value store with eventual durability.
///
/// Every operation may fail; callers in this crate log failures instead of
/// propagating them to domain code.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), Error>;

    /// Remove all of `keys`, returning how many existed.
    async fn remove_many(&self, keys: &[String]) -> Result<u64, Error>;

    /// List every key currently stored.
    async fn keys(&self) -> Result<Vec<String>, Error>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        (**self).remove(key).await
    }

    async fn remove_many(&self, keys: &[String]) -> Result<u64, Error> {
        (**self).remove_many(keys).await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        (**self).keys().await
    }
}
