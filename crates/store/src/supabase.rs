use crate::{Query, RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 250,
        }
    }
}

/// Record store backed by a Supabase project's PostgREST endpoint.
///
/// Every request carries the `apikey` / `Authorization: Bearer` header pair. Reads are
/// retried with linear backoff on connection errors, 429 and 5xx responses; writes are sent
/// once so a timed-out write is never replayed.
pub struct SupabaseStore {
    rest_base: String,
    headers: HeaderMap,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl SupabaseStore {
    pub fn new(
        project_url: &str,
        api_key: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> StoreResult<Self> {
        let project_url = project_url.trim().trim_end_matches('/');
        reqwest::Url::parse(project_url)
            .map_err(|e| StoreError::InvalidConfig(format!("invalid project url: {e}")))?;
        if api_key.trim().is_empty() {
            return Err(StoreError::InvalidConfig("api key cannot be empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            rest_base: format!("{project_url}/rest/v1"),
            headers: auth_headers(api_key.trim())?,
            client,
            retry,
        })
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/{}", self.rest_base, table)
    }

    async fn read_rows(table: &str, resp: reqwest::Response) -> StoreResult<Vec<Value>> {
        let body = resp.text().await.map_err(|e| StoreError::Transport {
            table: table.to_string(),
            message: format!("read body failed: {e}"),
        })?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(rows)) => Ok(rows),
            Ok(Value::Object(row)) => Ok(vec![Value::Object(row)]),
            Ok(other) => Err(StoreError::MalformedBody {
                table: table.to_string(),
                message: format!("expected array of rows, got {other}"),
            }),
            Err(e) => Err(StoreError::MalformedBody {
                table: table.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn status_error(table: &str, resp: reqwest::Response) -> StoreError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        StoreError::Status {
            table: table.to_string(),
            status,
            body,
        }
    }

    #[instrument(name = "store_supabase_get_with_retry", skip(self, query), fields(table = query.table_name()))]
    async fn get_with_retry(&self, query: &Query) -> StoreResult<Vec<Value>> {
        let table = query.table_name();
        let url = self.endpoint(table);
        let pairs = query.to_query_pairs();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let req = self
                .client
                .get(&url)
                .headers(self.headers.clone())
                .query(&pairs);
            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Self::read_rows(table, resp).await;
                }
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts || !is_retryable(resp.status()) {
                        return Err(Self::status_error(table, resp).await);
                    }
                    tracing::debug!(attempt, status = %resp.status(), "retrying store read");
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(StoreError::Transport {
                            table: table.to_string(),
                            message: e.to_string(),
                        });
                    }
                    tracing::debug!(attempt, "retrying store read after error: {}", e);
                }
            }
            tokio::time::sleep(Duration::from_millis(
                self.retry.base_backoff_ms.saturating_mul(attempt as u64),
            ))
            .await;
        }
    }

    async fn write(
        &self,
        method: Method,
        query: &Query,
        body: Value,
    ) -> StoreResult<Vec<Value>> {
        let table = query.table_name();
        let resp = self
            .client
            .request(method, self.endpoint(table))
            .headers(self.headers.clone())
            .header(
                HeaderName::from_static("prefer"),
                HeaderValue::from_static("return=representation"),
            )
            .query(&query.to_query_pairs())
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Transport {
                table: table.to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(Self::status_error(table, resp).await);
        }
        Self::read_rows(table, resp).await
    }
}

#[async_trait]
impl RecordStore for SupabaseStore {
    fn backend_tag(&self) -> &'static str {
        "supabase"
    }

    async fn select(&self, query: &Query) -> StoreResult<Vec<Value>> {
        self.get_with_retry(query).await
    }

    async fn insert(&self, table: &str, row: Value) -> StoreResult<Vec<Value>> {
        self.write(Method::POST, &Query::table(table), row).await
    }

    async fn update(&self, query: &Query, patch: Value) -> StoreResult<Vec<Value>> {
        if query.filters().is_empty() {
            return Err(StoreError::InvalidConfig(format!(
                "refusing unfiltered update of {}",
                query.table_name()
            )));
        }
        self.write(Method::PATCH, query, patch).await
    }
}

fn auth_headers(api_key: &str) -> StoreResult<HeaderMap> {
    let invalid = |e: reqwest::header::InvalidHeaderValue| {
        StoreError::InvalidConfig(format!("invalid api key header: {e}"))
    };
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("apikey"),
        HeaderValue::from_str(api_key).map_err(invalid)?,
    );
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(invalid)?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
