//! Thin HTTP layer: one request in, one normalized response (or typed error)
//! out. Knows nothing about sessions or renewal.

use std::time::{Duration, Instant};

use bytes::Bytes;
use hf_core::config::ApiConfig;
use hf_telemetry::metrics::record_http_request;
use hf_telemetry::tracing_setup::{generate_trace_id, REQUEST_ID_HEADER};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;

/// What to send as the request body.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Serialized as JSON text with `Content-Type: application/json`.
    Json(Value),
    /// Sent verbatim (binary upload, pre-encoded multipart).
    Raw {
        bytes: Bytes,
        content_type: Option<String>,
    },
}

/// Method, body and extra headers of one call.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    pub body: RequestBody,
    pub headers: Vec<(String, String)>,
}

impl RequestConfig {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: RequestBody::Empty,
            headers: Vec::new(),
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn raw(mut self, bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        self.body = RequestBody::Raw {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
        };
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Normalized 2xx response. `body` is `{}` for 204 and empty bodies.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

/// Join `base` and `path` with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Failure text from a JSON error body: `error`, else `message`.
pub fn error_message(body: &Value) -> Option<String> {
    ["error", "message"].iter().find_map(|key| {
        body.get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_url: String,
}

impl Transport {
    /// Build a transport with an in-memory cookie jar, so the refresh cookie
    /// set by sign-in or refresh rides along on later calls.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(ApiError::from_reqwest)?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Perform exactly one HTTP call. No retries.
    pub async fn call(
        &self,
        path: &str,
        config: &RequestConfig,
        token: Option<&str>,
    ) -> Result<TransportResponse, ApiError> {
        let url = self.url(path);
        let trace_id = generate_trace_id();

        let mut req = self
            .client
            .request(config.method.clone(), &url)
            .header(REQUEST_ID_HEADER, &trace_id);
        for (name, value) in &config.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req = match &config.body {
            RequestBody::Empty => req,
            RequestBody::Json(value) => req.json(value),
            RequestBody::Raw {
                bytes,
                content_type,
            } => {
                let req = req.body(bytes.clone());
                match content_type {
                    Some(ct) => req.header(CONTENT_TYPE, ct.as_str()),
                    None => req,
                }
            }
        };

        let started = Instant::now();
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                record_http_request(config.method.as_str(), "error", started.elapsed().as_secs_f64());
                debug!(method = %config.method, url = %url, trace_id = %trace_id, error = %e, "request failed");
                return Err(ApiError::from_reqwest(e));
            }
        };

        let status = resp.status();
        record_http_request(
            config.method.as_str(),
            status.as_str(),
            started.elapsed().as_secs_f64(),
        );
        debug!(
            method = %config.method,
            url = %url,
            trace_id = %trace_id,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );

        if status == StatusCode::NO_CONTENT {
            return Ok(TransportResponse {
                status: status.as_u16(),
                body: Value::Object(Default::default()),
            });
        }

        let raw = resp.bytes().await.map_err(ApiError::from_reqwest)?;
        let parsed = if raw.is_empty() {
            None
        } else {
            Some(serde_json::from_slice::<Value>(&raw))
        };

        if !status.is_success() {
            let body = parsed.and_then(Result::ok);
            let message = body
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown Status").to_string());
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
                message,
            });
        }

        let body = match parsed {
            None => Value::Object(Default::default()),
            Some(Ok(value)) => value,
            Some(Err(e)) => return Err(ApiError::Decode(e.to_string())),
        };
        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .finish()
    }
}
