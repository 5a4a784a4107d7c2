//! The single call surface for authenticated API requests.
//!
//! Every call carries the current access token. A 401 triggers one shared
//! renewal and one retry of the identical call; a second 401, or a failed
//! renewal, ends the session.

use std::sync::Arc;

use hf_core::session::{SessionEvent, SessionStore};
use hf_telemetry::metrics::{global_metrics, names};
use hf_telemetry::tracing_setup::create_operation_span;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn, Instrument};

use crate::error::ApiError;
use crate::renewal::RenewalCoordinator;
use crate::transport::{error_message, RequestConfig, Transport};

pub const LOGOUT_PATH: &str = "/auth/logout";

#[derive(Clone)]
pub struct RequestPipeline {
    transport: Transport,
    session: Arc<SessionStore>,
    renewal: Arc<RenewalCoordinator>,
}

impl RequestPipeline {
    pub fn new(
        transport: Transport,
        session: Arc<SessionStore>,
        renewal: Arc<RenewalCoordinator>,
    ) -> Self {
        Self {
            transport,
            session,
            renewal,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Issue a call, renewing and retrying once on 401.
    pub async fn request(&self, path: &str, config: RequestConfig) -> Result<Value, ApiError> {
        self.request_with(path, config, true).await
    }

    pub async fn request_with(
        &self,
        path: &str,
        config: RequestConfig,
        allow_retry: bool,
    ) -> Result<Value, ApiError> {
        let (span, _trace_id) = create_operation_span("api_call");
        let method = config.method.clone();
        async move {
            let mut allow_retry = allow_retry;
            let mut token = self.session.token();
            loop {
                let err = match self.send(path, &config, token.as_deref()).await {
                    Ok(body) => return Ok(body),
                    Err(e) if e.is_unauthorized() => e,
                    Err(e) => return Err(e),
                };

                if !allow_retry {
                    debug!(%method, path, "still unauthorized after renewal");
                    self.expire();
                    return Err(ApiError::SessionExpired);
                }

                debug!(%method, path, status = ?err.status(), "unauthorized; renewing token");
                match self.renewal.renew().await {
                    Ok(renewed) => {
                        self.session.set_token(Some(renewed.clone()));
                        token = Some(renewed);
                        allow_retry = false;
                    }
                    Err(e) => {
                        warn!(%method, path, error = %e, "token renewal failed; ending session");
                        self.expire();
                        return Err(ApiError::SessionExpired);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Transport call plus envelope check: `success: false` on a 2xx is
    /// surfaced as an HTTP error with the actual status.
    async fn send(
        &self,
        path: &str,
        config: &RequestConfig,
        token: Option<&str>,
    ) -> Result<Value, ApiError> {
        let resp = self.transport.call(path, config, token).await?;
        if resp.body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = error_message(&resp.body).unwrap_or_else(|| "request failed".into());
            return Err(ApiError::Http {
                status: resp.status,
                body: Some(resp.body),
                message,
            });
        }
        Ok(resp.body)
    }

    /// Hard logout. Only the caller that actually cleared a session notifies
    /// the backend and publishes `Expired`.
    fn expire(&self) {
        if !self.session.clear() {
            return;
        }
        global_metrics().increment_counter(names::SESSION_EXPIRED_TOTAL, &[]);
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.call(LOGOUT_PATH, &RequestConfig::post(), None).await {
                debug!(error = %e, "logout notification failed");
            }
        });
        self.session.publish(SessionEvent::Expired);
    }

    // -- Typed helpers ------------------------------------------------------

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        decode(self.request(path, RequestConfig::get()).await?)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        decode(self.request(path, RequestConfig::post().json(body)?).await?)
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        decode(self.request(path, RequestConfig::put().json(body)?).await?)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        decode(self.request(path, RequestConfig::delete()).await?)
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))
}
