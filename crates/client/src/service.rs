//! Data-access façade.
//!
//! Reads go through the cache and degrade to an empty result when the backend
//! is unreachable. Writes go straight to the backend; when the call fails the
//! write is queued for the sync loop and reported as accepted.

use std::sync::Arc;

use karma_core::{AppConfig, CacheManager, KeyValueStore, LogFailure, OfflineQueue, query_key};
use serde_json::{Value, json};

use crate::ApiError;
use crate::remote::{ApiResponse, Operation, RemoteEndpoint};
use crate::sync::{DrainOutcome, SyncConfig, SyncLoop};

/// Store key holding the signed-in user record.
pub const USER_DATA_KEY: &str = "karma_user_data";

const USER_PROFILE: &str = "user_profile";
const DONATION_CATEGORIES: &str = "donation_categories";
const DONATIONS_LIST: &str = "donations_list";
const USER_DONATIONS: &str = "user_donations";
const RIDES_LIST: &str = "rides_list";
const COMMUNITY_STATS: &str = "community_stats";

/// Result of a write through the façade.
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// The server answered; the response is returned as-is.
    Completed(ApiResponse),
    /// The server was unreachable; the write is queued for replay.
    Queued { action_id: String },
    /// The write was not sent and is not replayable (session writes, bad payloads).
    Failed(ApiError),
}

impl WriteOutcome {
    /// Whether the caller may treat the write as saved.
    pub fn is_accepted(&self) -> bool {
        match self {
            WriteOutcome::Completed(resp) => resp.success,
            WriteOutcome::Queued { .. } => true,
            WriteOutcome::Failed(_) => false,
        }
    }

    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            WriteOutcome::Completed(resp) => Some(resp),
            _ => None,
        }
    }
}

/// Cached, offline-tolerant access to the karma backend.
pub struct DataService<S: KeyValueStore, R: RemoteEndpoint> {
    store: Arc<S>,
    cache: CacheManager<S>,
    queue: Arc<OfflineQueue<S>>,
    remote: Arc<R>,
    sync: Arc<SyncLoop<S, R>>,
}

impl<S: KeyValueStore, R: RemoteEndpoint> DataService<S, R> {
    /// Build the service, hydrating the offline queue from `store`.
    pub async fn new(store: Arc<S>, remote: Arc<R>, config: &AppConfig) -> Self {
        let cache = CacheManager::new(Arc::clone(&store), config.ttl_policy());
        let queue = Arc::new(OfflineQueue::load(Arc::clone(&store), config.max_queue_size).await);
        let sync = Arc::new(SyncLoop::new(Arc::clone(&queue), Arc::clone(&remote), SyncConfig::from(config)));

        Self { store, cache, queue, remote, sync }
    }

    pub fn cache(&self) -> &CacheManager<S> {
        &self.cache
    }

    pub fn queue(&self) -> &OfflineQueue<S> {
        &self.queue
    }

    // ==================== Users ====================

    /// Register a new account. Never queued: a failure is returned to the caller.
    pub async fn register_user(&self, data: &Value) -> WriteOutcome {
        self.session_write(Operation::RegisterUser, data).await
    }

    pub async fn login_user(&self, credentials: &Value) -> WriteOutcome {
        self.session_write(Operation::LoginUser, credentials).await
    }

    async fn session_write(&self, operation: Operation, payload: &Value) -> WriteOutcome {
        match self.remote.call(operation, payload).await {
            Ok(resp) => {
                if resp.success
                    && let Some(user) = &resp.data
                {
                    self.remember_user(user, None).await;
                }
                WriteOutcome::Completed(resp)
            }
            Err(error) => {
                tracing::warn!(%operation, %error, "session request failed");
                WriteOutcome::Failed(error)
            }
        }
    }

    /// The signed-in user record, if one was stored.
    pub async fn get_current_user(&self) -> Option<Value> {
        let raw = self.store.get(USER_DATA_KEY).await.log_failure("failed to read user data")??;
        serde_json::from_str(&raw)
            .map_err(karma_core::Error::from)
            .log_failure("stored user data is corrupt")
    }

    pub async fn update_user_profile(&self, user_id: &str, update: Value) -> WriteOutcome {
        let payload = json!({ "userId": user_id, "updateData": update });
        let outcome = self.write(Operation::UpdateUserProfile, payload, &[]).await;

        if let WriteOutcome::Completed(resp) = &outcome
            && resp.success
            && let Some(user) = &resp.data
        {
            self.remember_user(user, Some(user_id)).await;
        }
        outcome
    }

    async fn remember_user(&self, user: &Value, fallback_id: Option<&str>) {
        let id = match user.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => fallback_id.map(str::to_string),
        };
        if let Some(id) = id {
            self.cache.set(USER_PROFILE, &id, user).await;
        }

        match serde_json::to_string(user) {
            Ok(json) => {
                self.store
                    .set(USER_DATA_KEY, &json)
                    .await
                    .log_failure("failed to persist user data");
            }
            Err(error) => tracing::warn!(%error, "failed to serialize user data"),
        }
    }

    // ==================== Donations ====================

    pub async fn get_donation_categories(&self) -> Vec<Value> {
        self.read_list(Operation::GetDonationCategories, DONATION_CATEGORIES, "all", &Value::Null, false)
            .await
    }

    pub async fn get_donations(&self, filters: &Value, force_refresh: bool) -> Vec<Value> {
        let key = query_key("donations", filters);
        self.read_list(Operation::GetDonations, DONATIONS_LIST, &key, filters, force_refresh)
            .await
    }

    pub async fn create_donation(&self, data: Value) -> WriteOutcome {
        self.write(Operation::CreateDonation, data, &[DONATIONS_LIST, USER_DONATIONS])
            .await
    }

    // ==================== Rides ====================

    pub async fn get_rides(&self, filters: &Value, force_refresh: bool) -> Vec<Value> {
        let key = query_key("rides", filters);
        self.read_list(Operation::GetRides, RIDES_LIST, &key, filters, force_refresh)
            .await
    }

    pub async fn create_ride(&self, data: Value) -> WriteOutcome {
        self.write(Operation::CreateRide, data, &[RIDES_LIST]).await
    }

    // ==================== Statistics ====================

    /// Community statistics. Unlike the list reads, failures are returned so
    /// callers can tell "no data" from "unavailable".
    pub async fn get_community_stats(&self, filters: &Value, force_refresh: bool) -> Result<Value, ApiError> {
        let key = query_key("stats", filters);

        if !force_refresh && let Some(stats) = self.cache.get::<Value>(COMMUNITY_STATS, &key).await {
            return Ok(stats);
        }

        let resp = self.remote.call(Operation::GetCommunityStats, filters).await?;
        if !resp.success {
            return Err(ApiError::Rejected(resp.reason()));
        }

        match resp.data {
            Some(stats) if !stats.is_null() => {
                self.cache.set(COMMUNITY_STATS, &key, &stats).await;
                Ok(stats)
            }
            _ => {
                tracing::warn!("community stats response carried no data");
                Ok(json!({}))
            }
        }
    }

    pub async fn increment_stat(&self, stat_type: &str, value: i64, city: Option<&str>) -> WriteOutcome {
        let payload = json!({ "stat_type": stat_type, "value": value, "city": city });
        self.write(Operation::IncrementStat, payload, &[COMMUNITY_STATS]).await
    }

    // ==================== Cache & queue ====================

    /// Remove all cached domain data. Queue and user record are kept.
    pub async fn clear_all_cache(&self) -> u64 {
        let removed = self.cache.clear_all().await;
        tracing::info!(removed, "cleared cache");
        removed
    }

    pub async fn offline_queue_size(&self) -> usize {
        self.queue.len().await
    }

    /// Drain the offline queue now instead of waiting for the next tick.
    pub async fn force_sync(&self) -> DrainOutcome {
        self.sync.drain().await
    }

    // ==================== Internals ====================

    async fn read_list(
        &self, operation: Operation, collection: &str, key: &str, payload: &Value, force_refresh: bool,
    ) -> Vec<Value> {
        if !force_refresh && let Some(items) = self.cache.get::<Vec<Value>>(collection, key).await {
            return items;
        }

        match self.remote.call(operation, payload).await {
            Ok(ApiResponse { success: true, data: Some(Value::Array(items)), .. }) => {
                self.cache.set(collection, key, &items).await;
                items
            }
            Ok(resp) if resp.success => {
                tracing::warn!(%operation, "read returned no list, returning empty");
                Vec::new()
            }
            Ok(resp) => {
                tracing::warn!(%operation, reason = %resp.reason(), "read rejected, returning empty");
                Vec::new()
            }
            Err(error) => {
                tracing::warn!(%operation, %error, "read failed, returning empty");
                Vec::new()
            }
        }
    }

    async fn write(&self, operation: Operation, payload: Value, invalidates: &[&str]) -> WriteOutcome {
        match self.remote.call(operation, &payload).await {
            Ok(resp) => {
                if resp.success {
                    for pattern in invalidates {
                        self.cache.invalidate_pattern(pattern).await;
                    }
                }
                WriteOutcome::Completed(resp)
            }
            Err(error) if !error.is_retryable() => {
                tracing::warn!(%operation, %error, "write cannot be sent, not queueing");
                WriteOutcome::Failed(error)
            }
            Err(error) => {
                tracing::warn!(%operation, %error, "write failed, queueing for sync");
                let action = self.queue.enqueue(operation.name(), payload).await;
                WriteOutcome::Queued { action_id: action.id }
            }
        }
    }
}

impl<S, R> DataService<S, R>
where
    S: KeyValueStore + 'static,
    R: RemoteEndpoint + 'static,
{
    pub async fn start_sync(&self) {
        self.sync.start().await;
    }

    pub async fn stop_sync(&self) {
        self.sync.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use super::*;
    use async_trait::async_trait;
    use karma_core::MemoryStore;

    type Reply = Result<ApiResponse, ApiError>;

    /// Replies from a script, then falls back to a fixed reply.
    struct ScriptedRemote {
        replies: StdMutex<VecDeque<Reply>>,
        fallback: Reply,
        calls: StdMutex<Vec<(Operation, Value)>>,
    }

    impl ScriptedRemote {
        fn always(reply: Reply) -> Self {
            Self { replies: StdMutex::new(VecDeque::new()), fallback: reply, calls: StdMutex::new(Vec::new()) }
        }

        fn then(self, reply: Reply) -> Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        fn calls(&self) -> Vec<(Operation, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteEndpoint for ScriptedRemote {
        async fn call(&self, operation: Operation, payload: &Value) -> Reply {
            self.calls.lock().unwrap().push((operation, payload.clone()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn offline() -> Reply {
        Err(ApiError::Timeout)
    }

    type Fixture = (Arc<MemoryStore>, Arc<ScriptedRemote>, DataService<MemoryStore, ScriptedRemote>);

    async fn service(remote: ScriptedRemote) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(remote);
        let service = DataService::new(Arc::clone(&store), Arc::clone(&remote), &AppConfig::default()).await;
        (store, remote, service)
    }

    #[tokio::test]
    async fn test_read_caches_result() {
        let remote = ScriptedRemote::always(Ok(ApiResponse::ok(json!([{"id": "c1"}]))));
        let (_, remote, service) = service(remote).await;

        assert_eq!(service.get_donation_categories().await, vec![json!({"id": "c1"})]);
        assert_eq!(service.get_donation_categories().await, vec![json!({"id": "c1"})]);
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let remote = ScriptedRemote::always(Ok(ApiResponse::ok(json!([{"id": "r2"}]))))
            .then(Ok(ApiResponse::ok(json!([{"id": "r1"}]))));
        let (_, remote, service) = service(remote).await;
        let filters = json!({"from_city": "Haifa"});

        assert_eq!(service.get_rides(&filters, false).await, vec![json!({"id": "r1"})]);
        assert_eq!(service.get_rides(&filters, true).await, vec![json!({"id": "r2"})]);
        assert_eq!(service.get_rides(&filters, false).await, vec![json!({"id": "r2"})]);
        assert_eq!(remote.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_filters_select_distinct_entries() {
        let remote = ScriptedRemote::always(Ok(ApiResponse::ok(json!([]))));
        let (_, remote, service) = service(remote).await;

        service.get_donations(&json!({"city": "Haifa"}), false).await;
        service.get_donations(&json!({"city": "Eilat"}), false).await;
        service.get_donations(&json!({"city": "Haifa"}), false).await;
        assert_eq!(remote.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_read_failure_degrades_to_empty() {
        let (store, _, service) = service(ScriptedRemote::always(offline())).await;

        assert!(service.get_donations(&json!({}), false).await.is_empty());
        assert!(service.get_rides(&Value::Null, false).await.is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_rejected_read_is_not_cached() {
        let remote = ScriptedRemote::always(Ok(ApiResponse::ok(json!([{"id": "d1"}]))))
            .then(Ok(ApiResponse::failure("maintenance")));
        let (_, _, service) = service(remote).await;

        assert!(service.get_donations(&json!({}), false).await.is_empty());
        assert_eq!(service.get_donations(&json!({}), false).await, vec![json!({"id": "d1"})]);
    }

    #[tokio::test]
    async fn test_success_without_list_is_not_cached() {
        let remote = ScriptedRemote::always(Ok(ApiResponse::ok(json!([{"id": "c1"}]))))
            .then(Ok(ApiResponse { success: true, ..Default::default() }))
            .then(Ok(ApiResponse::ok(json!({"unexpected": "object"}))));
        let (store, remote, service) = service(remote).await;

        assert!(service.get_donation_categories().await.is_empty());
        assert!(service.get_donation_categories().await.is_empty());
        assert!(store.is_empty().await);

        assert_eq!(service.get_donation_categories().await, vec![json!({"id": "c1"})]);
        assert_eq!(service.get_donation_categories().await, vec![json!({"id": "c1"})]);
        assert_eq!(remote.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_community_stats_without_data_is_not_cached() {
        let remote = ScriptedRemote::always(Ok(ApiResponse::ok(json!({"volunteers": 4}))))
            .then(Ok(ApiResponse { success: true, ..Default::default() }));
        let (store, _, service) = service(remote).await;

        assert_eq!(service.get_community_stats(&json!({}), false).await.unwrap(), json!({}));
        assert!(store.is_empty().await);
        assert_eq!(service.get_community_stats(&json!({}), false).await.unwrap(), json!({"volunteers": 4}));
    }

    #[tokio::test]
    async fn test_unsendable_write_is_not_queued() {
        let invalid = Err(ApiError::InvalidPayload("update_user_profile requires userId".into()));
        let (_, _, service) = service(ScriptedRemote::always(invalid)).await;

        let outcome = service.update_user_profile("", json!({"bio": "hi"})).await;
        assert!(matches!(outcome, WriteOutcome::Failed(ApiError::InvalidPayload(_))));
        assert!(!outcome.is_accepted());
        assert_eq!(service.offline_queue_size().await, 0);
    }

    #[tokio::test]
    async fn test_community_stats_propagates_failure() {
        let (_, _, service) = service(ScriptedRemote::always(offline())).await;
        let result = service.get_community_stats(&json!({}), false).await;
        assert!(matches!(result, Err(ApiError::Timeout)));
    }

    #[tokio::test]
    async fn test_community_stats_rejection() {
        let (_, _, service) = service(ScriptedRemote::always(Ok(ApiResponse::failure("no stats")))).await;
        let result = service.get_community_stats(&json!({"city": "Haifa"}), false).await;
        assert!(matches!(result, Err(ApiError::Rejected(reason)) if reason == "no stats"));
    }

    #[tokio::test]
    async fn test_community_stats_cached() {
        let remote = ScriptedRemote::always(offline()).then(Ok(ApiResponse::ok(json!({"volunteers": 12}))));
        let (_, _, service) = service(remote).await;

        assert_eq!(service.get_community_stats(&json!({}), false).await.unwrap(), json!({"volunteers": 12}));
        assert_eq!(service.get_community_stats(&json!({}), false).await.unwrap(), json!({"volunteers": 12}));
        assert!(service.get_community_stats(&json!({}), true).await.is_err());
    }

    #[tokio::test]
    async fn test_write_success_invalidates() {
        let remote = ScriptedRemote::always(Ok(ApiResponse::ok(json!({"id": "d9"}))))
            .then(Ok(ApiResponse::ok(json!([{"id": "d1"}]))));
        let (store, _, service) = service(remote).await;

        service.get_donations(&json!({}), false).await;
        service.cache().set("user_donations", "u1", &json!([])).await;
        service.cache().set("rides_list", "all", &json!([])).await;

        let outcome = service.create_donation(json!({"title": "Coat"})).await;
        assert!(outcome.is_accepted());
        assert_eq!(outcome.response().and_then(|r| r.data.clone()), Some(json!({"id": "d9"})));

        let keys = store.keys().await.unwrap();
        assert!(keys.iter().all(|k| !k.contains("donations_list") && !k.contains("user_donations")));
        assert!(keys.contains(&"rides_list_all".to_string()));
    }

    #[tokio::test]
    async fn test_rejected_write_is_returned_not_queued() {
        let (store, _, service) = service(ScriptedRemote::always(Ok(ApiResponse::failure("bad seats")))).await;
        service.cache().set("rides_list", "all", &json!([])).await;

        let outcome = service.create_ride(json!({})).await;
        assert!(!outcome.is_accepted());
        assert!(matches!(&outcome, WriteOutcome::Completed(resp) if resp.reason() == "bad seats"));
        assert_eq!(service.offline_queue_size().await, 0);
        assert!(store.get("rides_list_all").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_write_is_queued() {
        let (_, _, service) = service(ScriptedRemote::always(offline())).await;

        let outcome = service.create_ride(json!({"from_city": "Haifa"})).await;
        assert!(outcome.is_accepted());
        let WriteOutcome::Queued { action_id } = outcome else {
            panic!("expected queued outcome");
        };

        let pending = service.queue().snapshot().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, action_id);
        assert_eq!(pending[0].action, "create_ride");
        assert_eq!(pending[0].data, json!({"from_city": "Haifa"}));
    }

    #[tokio::test]
    async fn test_increment_stat_payload() {
        let (_, _, service) = service(ScriptedRemote::always(offline())).await;
        service.increment_stat("volunteer_hours", 3, Some("Haifa")).await;
        service.increment_stat("meals", 1, None).await;

        let pending = service.queue().snapshot().await;
        assert_eq!(pending[0].data, json!({"stat_type": "volunteer_hours", "value": 3, "city": "Haifa"}));
        assert_eq!(pending[1].data, json!({"stat_type": "meals", "value": 1, "city": null}));
    }

    #[tokio::test]
    async fn test_update_profile_queued_payload() {
        let (_, _, service) = service(ScriptedRemote::always(offline())).await;
        service.update_user_profile("u1", json!({"bio": "hi"})).await;

        let pending = service.queue().snapshot().await;
        assert_eq!(pending[0].action, "update_user_profile");
        assert_eq!(pending[0].data, json!({"userId": "u1", "updateData": {"bio": "hi"}}));
    }

    #[tokio::test]
    async fn test_update_profile_caches_user() {
        let user = json!({"id": "u1", "name": "Dana", "bio": "hi"});
        let (_, _, service) = service(ScriptedRemote::always(Ok(ApiResponse::ok(user.clone())))).await;

        assert!(service.update_user_profile("u1", json!({"bio": "hi"})).await.is_accepted());
        assert_eq!(service.get_current_user().await, Some(user.clone()));
        assert_eq!(service.cache().get::<Value>("user_profile", "u1").await, Some(user));
    }

    #[tokio::test]
    async fn test_login_persists_user() {
        let user = json!({"id": 42, "email": "dana@example.org"});
        let (_, _, service) = service(ScriptedRemote::always(Ok(ApiResponse::ok(user.clone())))).await;

        assert!(service.get_current_user().await.is_none());
        assert!(service.login_user(&json!({"email": "dana@example.org"})).await.is_accepted());
        assert_eq!(service.get_current_user().await, Some(user.clone()));
        assert_eq!(service.cache().get::<Value>("user_profile", "42").await, Some(user));
    }

    #[tokio::test]
    async fn test_session_failure_is_not_queued() {
        let (_, _, service) = service(ScriptedRemote::always(offline())).await;

        let outcome = service.register_user(&json!({"email": "dana@example.org"})).await;
        assert!(matches!(outcome, WriteOutcome::Failed(ApiError::Timeout)));
        assert!(!outcome.is_accepted());
        assert_eq!(service.offline_queue_size().await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_user_data() {
        let (store, _, service) = service(ScriptedRemote::always(offline())).await;
        store.set(USER_DATA_KEY, "{oops").await.unwrap();
        assert!(service.get_current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_all_cache_keeps_session_and_queue() {
        let (store, _, service) = service(ScriptedRemote::always(offline())).await;
        service.cache().set("donations_list", "a", &json!([])).await;
        service.cache().set("user_profile", "u1", &json!({})).await;
        store.set(USER_DATA_KEY, r#"{"id":"u1"}"#).await.unwrap();
        service.create_ride(json!({})).await;

        assert_eq!(service.clear_all_cache().await, 2);
        let keys = store.keys().await.unwrap();
        assert_eq!(keys, vec!["karma_offline_queue".to_string(), USER_DATA_KEY.to_string()]);
    }

    #[tokio::test]
    async fn test_force_sync_drains() {
        let remote = ScriptedRemote::always(Ok(ApiResponse::ok(json!({"id": "d1"})))).then(offline());
        let (_, _, service) = service(remote).await;

        service.create_donation(json!({"title": "Test"})).await;
        assert_eq!(service.offline_queue_size().await, 1);

        assert!(matches!(service.force_sync().await, DrainOutcome::Completed(report) if report.succeeded == 1));
        assert_eq!(service.offline_queue_size().await, 0);
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(ScriptedRemote::always(offline()));
        {
            let service = DataService::new(Arc::clone(&store), Arc::clone(&remote), &AppConfig::default()).await;
            service.create_donation(json!({"title": "Test"})).await;
        }

        let service = DataService::new(store, remote, &AppConfig::default()).await;
        assert_eq!(service.offline_queue_size().await, 1);
    }
}
