//! Per-collection expiry policy.

use std::collections::BTreeMap;
use std::time::Duration;

/// Fallback expiry for collections without an explicit entry: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Static mapping from collection name to expiry duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    default_ttl: Duration,
    per_collection: BTreeMap<String, Duration>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
            .with("user_profile", Duration::from_secs(15 * 60))
            .with("donation_categories", Duration::from_secs(60 * 60))
            .with("community_stats", Duration::from_secs(10 * 60))
            .with("donations_list", Duration::from_secs(5 * 60))
            .with("rides_list", Duration::from_secs(5 * 60))
            .with("chat_conversations", Duration::from_secs(2 * 60))
    }
}

impl TtlPolicy {
    /// Policy with no per-collection entries.
    pub fn new(default_ttl: Duration) -> Self {
        Self { default_ttl, per_collection: BTreeMap::new() }
    }

    /// Add or replace the expiry for one collection.
    pub fn with(mut self, collection: impl Into<String>, ttl: Duration) -> Self {
        self.per_collection.insert(collection.into(), ttl);
        self
    }

    /// Expiry for `collection`, falling back to the default.
    pub fn ttl_for(&self, collection: &str) -> Duration {
        self.per_collection.get(collection).copied().unwrap_or(self.default_ttl)
    }
}
