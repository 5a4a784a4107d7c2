//! Shared API types for the hookfilter client crates.
//!
//! Every JSON body exchanged with the hookfilter backend is described here so
//! the transport, session and stream layers agree on one wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Response envelope ──

/// Standard wrapper around every JSON API response.
///
/// The backend sets `success = false` and fills `error` on failures, even when
/// the HTTP status itself is 2xx.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl<T> Envelope<T> {
    /// Successful envelope carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            metadata: None,
        }
    }

    /// Human-readable failure text: `error`, else `message`.
    pub fn failure_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.message.as_deref().filter(|s| !s.is_empty()))
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.metadata.as_ref().and_then(|m| m.pagination.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// The backend historically misspells this key; accept both.
    #[serde(default, alias = "requrest_id")]
    pub request_id: String,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub total_page: u32,
    #[serde(default)]
    pub total_data: u32,
}

// ── Auth ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Body of `sign-in`, `sign-up` and `refresh` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenPayload {
    pub access_token: String,
}

/// The signed-in user as returned by `GET /users/me`.
///
/// Replaced wholesale whenever it changes; never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Pipes ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipe {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub jq_filter: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeRequest {
    pub name: String,
    pub slug: String,
    pub target_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jq_filter: Option<String>,
}

// ── Live stream ──

/// One observed invocation of a pipe's ingest endpoint.
///
/// `payload` and `response_body` are whatever JSON the webhook sender and the
/// forward target produced; their shape is unknown to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub id: String,
    #[serde(default)]
    pub pipe_id: String,
    pub status_code: u16,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<serde_json::Value>,
}
