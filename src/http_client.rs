use anyhow::Context;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::CredentialManager;
use crate::error::{ApiError, Result};

/// Build the shared HTTP transport with connection pooling and timeouts
pub fn build_transport(connect_timeout: u64, request_timeout: u64) -> anyhow::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout))
        .timeout(Duration::from_secs(request_timeout))
        .build()
        .context("Failed to create HTTP client")
}

/// What to send along with a request
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    None,
    /// Query string parameters
    Query(Vec<(String, String)>),
    /// JSON request body
    Json(Value),
}

/// Buffered response from the lending API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    content_type: Option<String>,
    body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, content_type: Option<String>, body: String) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
    }

    /// Deserialize the body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ApiError::Internal(anyhow::anyhow!(
                "Failed to parse API response (status {}): {}",
                self.status.as_u16(),
                e
            ))
        })
    }

    /// Body as a JSON value, `Null` when it is not JSON
    pub fn value(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }

    /// Human-readable error detail: the `detail` field of a JSON body, else the raw text
    pub fn detail(&self) -> String {
        if self.is_json() {
            if let Some(detail) = self.value().get("detail") {
                return match detail {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
            }
        }
        self.body.clone()
    }

    /// Turn a non-2xx response into `RemoteRejection`
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ApiError::RemoteRejection {
                status: self.status.as_u16(),
                body: self.body,
            })
        }
    }
}

/// HTTP client for the lending API
/// Injects auth headers and retries once on 401
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// API base URL (no trailing slash)
    base_url: String,

    /// Session owner
    auth: Arc<CredentialManager>,
}

impl ApiClient {
    pub fn new(client: Client, base_url: impl Into<String>, auth: Arc<CredentialManager>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            auth,
        }
    }

    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<ApiResponse> {
        let payload = if params.is_empty() {
            Payload::None
        } else {
            Payload::Query(
                params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        };
        self.request(Method::GET, path, payload).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.request(Method::POST, path, Payload::Json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.request(Method::PUT, path, Payload::Json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.request(Method::DELETE, path, Payload::None).await
    }

    /// Execute a request with current auth headers
    ///
    /// A 401 forces one refresh and one identical retry; whatever the retry
    /// returns is final. Other statuses are passed through untouched.
    pub async fn request(&self, method: Method, path: &str, payload: Payload) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);

        let headers = self.auth.get_headers().await?;
        let response = self.send(&method, &url, &payload, headers.clone()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!(method = %method, path = path, "Got 401, refreshing token and retrying");
        self.auth.refresh_after_rejection(&headers).await?;

        let headers = self.auth.get_headers().await?;
        let response = self.send(&method, &url, &payload, headers).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(method = %method, path = path, "Still unauthorized after token refresh");
        }

        Ok(response)
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        payload: &Payload,
        headers: HeaderMap,
    ) -> Result<ApiResponse> {
        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let mut builder = self.client.request(method.clone(), url).headers(headers);
        builder = match payload {
            Payload::None => builder,
            Payload::Query(params) => builder.query(params),
            Payload::Json(body) => builder.json(body),
        };

        let response = builder.send().await.map_err(|e| {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection_failed"
            } else {
                "request_error"
            };
            tracing::warn!(error_kind = error_kind, error = %e, url = %url, "HTTP request error");
            ApiError::Transport(e)
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        tracing::debug!(status = %status, "Received HTTP response");
        Ok(ApiResponse::new(status, content_type, body))
    }
}
