//! Credential flows: sign-in, sign-up, logout.

use std::sync::Arc;

use hf_api_types::{AccessTokenPayload, Envelope, Identity, SignInRequest, SignUpRequest};
use hf_core::session::{SessionEvent, SessionStore};
use tracing::{info, warn};

use crate::bootstrap::IDENTITY_PATH;
use crate::error::ApiError;
use crate::pipeline::{RequestPipeline, LOGOUT_PATH};
use crate::transport::{RequestConfig, Transport};

pub const SIGN_IN_PATH: &str = "/auth/sign-in";
pub const SIGN_UP_PATH: &str = "/auth/sign-up";
pub const LOGOUT_ALL_PATH: &str = "/auth/logout-all";

#[derive(Clone)]
pub struct AuthClient {
    transport: Transport,
    pipeline: RequestPipeline,
    session: Arc<SessionStore>,
}

impl AuthClient {
    pub fn new(transport: Transport, pipeline: RequestPipeline, session: Arc<SessionStore>) -> Self {
        Self {
            transport,
            pipeline,
            session,
        }
    }

    /// Exchange credentials for an access token (the refresh cookie lands in
    /// the transport's jar), then load the identity.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        let body = SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.exchange(SIGN_IN_PATH, RequestConfig::post().json(&body)?)
            .await?;
        let user = self.fetch_identity().await?;
        info!(user_id = %user.id, "signed in");
        Ok(user)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<Identity, ApiError> {
        let body = SignUpRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        };
        self.exchange(SIGN_UP_PATH, RequestConfig::post().json(&body)?)
            .await?;
        let user = self.fetch_identity().await?;
        info!(user_id = %user.id, "signed up");
        Ok(user)
    }

    /// Credential exchange bypasses the pipeline: a 401 here means bad
    /// credentials, not an expired token.
    async fn exchange(&self, path: &str, config: RequestConfig) -> Result<(), ApiError> {
        let resp = self.transport.call(path, &config, None).await?;
        let envelope: Envelope<AccessTokenPayload> =
            serde_json::from_value(resp.body).map_err(|e| ApiError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(ApiError::Http {
                status: resp.status,
                body: None,
                message: envelope
                    .failure_message()
                    .unwrap_or("authentication failed")
                    .to_string(),
            });
        }
        let token = envelope
            .data
            .map(|d| d.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Decode("missing access_token".into()))?;
        self.session.set_token(Some(token));
        Ok(())
    }

    /// `GET /users/me` through the pipeline; replaces the stored identity.
    pub async fn fetch_identity(&self) -> Result<Identity, ApiError> {
        let envelope: Envelope<Identity> = self.pipeline.get(IDENTITY_PATH).await?;
        let user = envelope
            .data
            .ok_or_else(|| ApiError::Decode("missing identity".into()))?;
        self.session.set_identity(Some(user.clone()));
        Ok(user)
    }

    /// End this session. The backend call is best effort; local state is
    /// always cleared.
    pub async fn logout(&self) {
        self.end_session(LOGOUT_PATH).await;
    }

    /// End every session of this user on every device.
    pub async fn logout_all(&self) {
        self.end_session(LOGOUT_ALL_PATH).await;
    }

    async fn end_session(&self, path: &str) {
        let token = self.session.token();
        if let Err(e) = self
            .transport
            .call(path, &RequestConfig::post(), token.as_deref())
            .await
        {
            warn!(path, error = %e, "logout request failed; clearing local session anyway");
        }
        self.session.clear();
        self.session.publish(SessionEvent::LoggedOut);
        info!(path, "logged out");
    }
}
