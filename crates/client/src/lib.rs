//! Client side of the karma data-access layer.
//!
//! This crate provides the remote endpoint (trait and HTTP implementation),
//! the background sync loop that replays queued writes, and the cached,
//! offline-tolerant [`DataService`] built on top of `karma-core`.

pub mod error;
pub mod remote;
pub mod service;
pub mod sync;

pub use error::ApiError;
pub use remote::{ApiResponse, HttpConfig, HttpEndpoint, Operation, RemoteEndpoint};
pub use service::{DataService, USER_DATA_KEY, WriteOutcome};
pub use sync::{DrainOutcome, DrainReport, SyncConfig, SyncLoop};
