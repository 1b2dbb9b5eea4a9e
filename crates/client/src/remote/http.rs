//! HTTP implementation of [`RemoteEndpoint`] for the karma backend.
//!
//! ### Routes
//!
//! | operation                 | method | path                          |
//! |---------------------------|--------|-------------------------------|
//! | `register_user`           | POST   | `/api/users/register`         |
//! | `login_user`              | POST   | `/api/users/login`            |
//! | `update_user_profile`     | PUT    | `/api/users/{userId}`         |
//! | `get_donation_categories` | GET    | `/api/donations/categories`   |
//! | `get_donations`           | GET    | `/api/donations?{filters}`    |
//! | `create_donation`         | POST   | `/api/donations`              |
//! | `get_community_stats`     | GET    | `/api/stats/community?{...}`  |
//! | `increment_stat`          | POST   | `/api/stats/increment`        |
//! | `get_rides`               | GET    | `/api/rides?{filters}`        |
//! | `create_ride`             | POST   | `/api/rides`                  |
//!
//! Path parameters are percent-encoded as single segments. Non-2xx responses
//! become [`ApiError::Http`] carrying the body's `message` or `error` field when
//! one is present.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use karma_core::AppConfig;
use reqwest::{Method, header};
use serde_json::Value;
use url::Url;

use super::{ApiResponse, Operation, RemoteEndpoint};
use crate::ApiError;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = concat!("karma-client/", env!("CARGO_PKG_VERSION"));

/// HTTP endpoint configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL, e.g. `https://api.example.org`. A trailing slash is ignored.
    pub base_url: String,
    /// Request timeout (default: 10s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl From<&AppConfig> for HttpConfig {
    fn from(config: &AppConfig) -> Self {
        Self { base_url: config.api_base_url.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// Method, path segments and body for one call.
#[derive(Debug, PartialEq)]
struct Route {
    method: Method,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

fn segments(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

impl Route {
    fn get(path: &[&str], filters: &Value) -> Self {
        Self { method: Method::GET, segments: segments(path), query: query_pairs(filters), body: None }
    }

    fn send(method: Method, path: &[&str], body: Value) -> Self {
        Self { method, segments: segments(path), query: Vec::new(), body: Some(body) }
    }
}

fn route(operation: Operation, payload: &Value) -> Result<Route, ApiError> {
    let route = match operation {
        Operation::RegisterUser => Route::send(Method::POST, &["api", "users", "register"], payload.clone()),
        Operation::LoginUser => Route::send(Method::POST, &["api", "users", "login"], payload.clone()),
        Operation::UpdateUserProfile => {
            let user_id = payload
                .get("userId")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ApiError::InvalidPayload("update_user_profile requires userId".into()))?;
            let update = payload
                .get("updateData")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            Route::send(Method::PUT, &["api", "users", user_id], update)
        }
        Operation::GetDonationCategories => Route::get(&["api", "donations", "categories"], &Value::Null),
        Operation::GetDonations => Route::get(&["api", "donations"], payload),
        Operation::CreateDonation => Route::send(Method::POST, &["api", "donations"], payload.clone()),
        Operation::GetCommunityStats => Route::get(&["api", "stats", "community"], payload),
        Operation::IncrementStat => Route::send(Method::POST, &["api", "stats", "increment"], payload.clone()),
        Operation::GetRides => Route::get(&["api", "rides"], payload),
        Operation::CreateRide => Route::send(Method::POST, &["api", "rides"], payload.clone()),
    };
    Ok(route)
}

/// Flatten a filter object into query pairs, skipping nulls.
fn query_pairs(filters: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = filters else {
        return Vec::new();
    };

    map.iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// reqwest-backed endpoint.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    http: reqwest::Client,
    base: Url,
}

impl HttpEndpoint {
    /// Create a new endpoint with the given configuration.
    ///
    /// Fails with [`ApiError::InvalidConfig`] when `base_url` is not an http(s) URL.
    pub fn new(config: HttpConfig) -> Result<Self, ApiError> {
        let base =
            Url::parse(&config.base_url).map_err(|e| ApiError::InvalidConfig(format!("{}: {e}", config.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(ApiError::InvalidConfig(format!("unsupported scheme: {}", base.scheme())));
        }

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| ApiError::Network(Arc::new(e)))?;

        Ok(Self { http, base })
    }

    /// Append `segments` to the base path, encoding each one.
    fn url(&self, segments: &[String]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidConfig(format!("{} cannot take a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl RemoteEndpoint for HttpEndpoint {
    async fn call(&self, operation: Operation, payload: &Value) -> Result<ApiResponse, ApiError> {
        let route = route(operation, payload)?;
        let url = self.url(&route.segments)?;
        let start = Instant::now();

        tracing::debug!(%operation, method = %route.method, %url, "API request");

        let mut request = self
            .http
            .request(route.method, url)
            .header(header::ACCEPT, "application/json");
        if !route.query.is_empty() {
            request = request.query(&route.query);
        }
        if let Some(body) = &route.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        tracing::debug!(
            %operation,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "API response"
        );

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiResponse>(&bytes)
                .map(|body| body.reason())
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(ApiError::Http { status: status.as_u16(), message });
        }

        serde_json::from_slice(&bytes).map_err(|e| ApiError::Parse(e.to_string()))
    }
}
