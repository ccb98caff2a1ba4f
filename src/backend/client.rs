use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{RemoteCollection, SelectQuery};
use crate::config::{BackendConfig, RequestConfig};
use crate::error::{BackendError, BackendResult};

/// API key plus the signed-in user's access token, shared by every client.
#[derive(Clone)]
pub struct Credentials {
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl Credentials {
    pub fn new(anon_key: impl Into<String>) -> Self {
        Self {
            anon_key: anon_key.into(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    /// Bearer token: the access token when signed in, else the anon key
    pub async fn bearer(&self) -> String {
        self.access_token
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.anon_key.clone())
    }

    /// Attach `apikey` and `Authorization` headers
    pub async fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.bearer().await))
    }
}

/// Which failures a request may be repeated after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Selects, and updates or deletes by id.
    Transient,
    /// Inserts: only when the request never reached the server, so a
    /// committed row is not written twice.
    BeforeSend,
}

impl Retry {
    fn allows(self, error: &BackendError) -> bool {
        match self {
            Retry::Transient => error.is_transient(),
            Retry::BeforeSend => error.is_connect_failure(),
        }
    }
}

/// Delay before the given retry (1-based), doubling each time
fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    let factor = 2_u64
        .checked_pow(retry.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Client for the hosted backend's REST collection endpoint.
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    credentials: Credentials,
    request_config: RequestConfig,
}

impl RestBackend {
    /// Create a new REST backend client
    pub fn new(
        config: &BackendConfig,
        credentials: Credentials,
        request_config: RequestConfig,
    ) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(BackendError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection)
    }

    /// Send a request, retrying failures the policy allows with exponential backoff
    async fn send<F>(
        &self,
        label: &str,
        collection: &str,
        retry: Retry,
        build: F,
    ) -> BackendResult<Vec<Value>>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = backoff_delay(self.request_config.retry_delay_ms, retries);
                warn!(
                    op = label,
                    collection,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying backend request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            let request = self.credentials.apply(build()).await;

            match self.execute(request).await {
                Ok(rows) => {
                    info!(
                        op = label,
                        collection,
                        rows = rows.len(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Backend request succeeded"
                    );
                    return Ok(rows);
                }
                Err(e) if retry.allows(&e) => {
                    error!(
                        op = label,
                        collection,
                        error = %e,
                        latency_ms = start.elapsed().as_millis() as u64,
                        retry = retries,
                        "Backend request failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
                Err(e) => {
                    error!(op = label, collection, error = %e, "Backend request rejected");
                    return Err(e);
                }
            }
        }

        Err(BackendError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute(&self, request: RequestBuilder) -> BackendResult<Vec<Value>> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                BackendError::Http(e)
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }

        let body = response.text().await.map_err(BackendError::Http)?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(rows)) => Ok(rows),
            Ok(row @ Value::Object(_)) => Ok(vec![row]),
            Ok(other) => Err(BackendError::InvalidResponse {
                message: format!("Expected rows, got {}", other),
            }),
            Err(e) => Err(BackendError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            }),
        }
    }
}

/// Pull `message` out of a PostgREST error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl RemoteCollection for RestBackend {
    async fn select(&self, query: &SelectQuery) -> BackendResult<Vec<Value>> {
        let mut params: Vec<(String, String)> = vec![("select".to_string(), "*".to_string())];
        for (column, value) in &query.filters {
            params.push((column.clone(), format!("eq.{}", value)));
        }
        if let Some(order) = &query.order {
            let direction = if order.descending { "desc" } else { "asc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        debug!(collection = %query.collection, filters = query.filters.len(), "Selecting rows");

        let url = self.table_url(&query.collection);
        self.send("select", &query.collection, Retry::Transient, || {
            self.client.get(&url).query(&params)
        })
        .await
    }

    async fn insert(&self, collection: &str, rows: Vec<Value>) -> BackendResult<Vec<Value>> {
        let url = self.table_url(collection);
        self.send("insert", collection, Retry::BeforeSend, || {
            self.client
                .post(&url)
                .header("Prefer", "return=representation")
                .json(&rows)
        })
        .await
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> BackendResult<Vec<Value>> {
        let url = self.table_url(collection);
        let filter = format!("eq.{}", id);
        self.send("update", collection, Retry::Transient, || {
            self.client
                .patch(&url)
                .query(&[("id", filter.as_str())])
                .header("Prefer", "return=representation")
                .json(&patch)
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> BackendResult<Vec<Value>> {
        let url = self.table_url(collection);
        let filter = format!("eq.{}", id);
        self.send("delete", collection, Retry::Transient, || {
            self.client
                .delete(&url)
                .query(&[("id", filter.as_str())])
                .header("Prefer", "return=representation")
        })
        .await
    }
}
