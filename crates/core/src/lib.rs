//! Core storage for the karma data-access layer.
//!
//! This crate provides:
//! - Persistent key-value store with SQLite and in-memory backends
//! - Expiring cache with per-collection TTLs and pattern invalidation
//! - Durable, bounded offline mutation queue
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod queue;
pub mod store;

pub use cache::{CacheEntry, CacheManager, TtlPolicy, query_key};
pub use config::{AppConfig, ConfigError};
pub use error::{Error, LogFailure};
pub use queue::{OfflineAction, OfflineQueue, SettleReport};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
