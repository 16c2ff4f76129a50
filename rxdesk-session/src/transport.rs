//! HTTP transport for the REST backend
//!
//! The session layer talks to the backend only through the [`Transport`]
//! trait, so tests can script responses and the real client can be swapped.

use async_trait::async_trait;
use rxdesk_core::ApiConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{SessionError, SessionResult};

pub const AUTHORIZATION: &str = "authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Patch => write!(f, "PATCH"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// An outbound request, relative to the configured base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    /// Set once the request has been replayed after a token refresh
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Attach a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> SessionResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Header names are stored lowercase
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Replace any existing `Authorization` header with a bearer token
    pub fn with_bearer(self, token: &str) -> Self {
        self.header(AUTHORIZATION, format!("Bearer {}", token))
    }

    pub fn without_auth(mut self) -> Self {
        self.headers.remove(AUTHORIZATION);
        self
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    /// Mark the request as a replay so a second 401 is not recovered again
    pub fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }

    pub fn is_retry(&self) -> bool {
        self.retried
    }
}

/// A response as seen by the session layer
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn json_body(status: u16, body: &Value) -> Self {
        let mut response = Self::new(status, body.to_string());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn json<T: DeserializeOwned>(&self) -> SessionResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Turn a non-2xx response into `RequestFailed`
    pub fn error_for_status(self) -> SessionResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SessionError::RequestFailed {
                status: self.status,
                body: self.text(),
            })
        }
    }
}

/// Sends requests to the backend; knows nothing about tokens
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> SessionResult<ApiResponse>;
}

/// `reqwest`-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &ApiConfig) -> SessionResult<Self> {
        let client = create_http_client(config)?;

        debug!("Created HTTP transport for {}", config.base_url);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> SessionResult<ApiResponse> {
        let url = self.url_for(&request.path);
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        debug!(method = %request.method, url = %url, retry = request.is_retry(), "Sending request");

        let mut builder = self.client.request(method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SessionError::Timeout {
                    operation: format!("{} {}", request.method, request.path),
                    duration_ms: self.timeout.as_millis() as u64,
                }
            } else {
                SessionError::Transport {
                    message: format!("Failed to send request to {}: {}", url, e),
                }
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(|e| SessionError::Transport {
            message: format!("Failed to read response body from {}: {}", url, e),
        })?;

        debug!(status, url = %url, "Received response");

        Ok(ApiResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Helper function to create HTTP client with common configuration
pub(crate) fn create_http_client(config: &ApiConfig) -> SessionResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            SessionError::Config {
                message: format!("Invalid user agent: {}", e),
            }
        })?,
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    for (key, value) in &config.headers {
        let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            SessionError::Config {
                message: format!("Invalid header name '{}': {}", key, e),
            }
        })?;

        let header_value =
            reqwest::header::HeaderValue::from_str(value).map_err(|e| SessionError::Config {
                message: format!("Invalid header value for '{}': {}", key, e),
            })?;

        headers.insert(header_name, header_value);
    }

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| SessionError::Config {
            message: format!("Failed to create HTTP client: {}", e),
        })
}
