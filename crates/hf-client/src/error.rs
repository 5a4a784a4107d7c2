//! Error types for each client layer.

use std::time::Duration;

/// Failure of a single API call, as seen by callers of the request pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The backend answered with a non-2xx status, or with a 2xx envelope
    /// whose `success` flag is false.
    ///
    /// `message` is taken from the body's `error` field, then its `message`
    /// field, then the canonical reason phrase of the status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        body: Option<serde_json::Value>,
        message: String,
    },

    /// Connection refused, reset, DNS failure and the like.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// A 2xx body could not be parsed into the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Renewal failed, or the call was rejected again after a renewal.
    /// The local session has already been cleared.
    #[error("session expired")]
    SessionExpired,

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// HTTP status when the backend produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::InvalidUrl(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Outcome of a failed token renewal. Cloned to every waiter of the shared
/// renewal, hence string payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenewalError {
    /// The refresh endpoint refused the cookie (expired, revoked or missing).
    #[error("refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("refresh response invalid: {0}")]
    InvalidResponse(String),

    #[error("refresh transport failure: {0}")]
    Transport(String),

    /// The renewal task ended without producing a result.
    #[error("refresh aborted")]
    Aborted,
}

/// Failure to establish a live stream subscription.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid stream url: {0}")]
    InvalidUrl(String),

    /// The socket needs an access token and none was available.
    #[error("no access token for stream")]
    MissingToken,

    #[error("stream connect failed: {0}")]
    Connect(String),

    #[error("stream connect timed out after {0:?}")]
    Timeout(Duration),
}
