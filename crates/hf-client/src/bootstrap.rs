//! Once-per-process session bootstrap: silent renewal, then identity, then
//! the ready latch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hf_api_types::{Envelope, Identity};
use hf_core::session::SessionStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::renewal::RenewalCoordinator;
use crate::transport::{RequestConfig, Transport};

pub const IDENTITY_PATH: &str = "/users/me";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Authenticated(Identity),
    Anonymous,
    /// The owner cancelled before the sequence resolved; nothing was written.
    Cancelled,
    /// A previous call already ran the sequence.
    AlreadyStarted,
}

/// Runs the bootstrap sequence at most once per `started` flag.
///
/// Every bootstrapper handed out by one `ClientContext` shares the same
/// flag, so the sequence runs once per context no matter how many
/// bootstrappers are created.
pub struct Bootstrapper {
    transport: Transport,
    session: Arc<SessionStore>,
    renewal: Arc<RenewalCoordinator>,
    started: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Bootstrapper {
    pub fn new(
        transport: Transport,
        session: Arc<SessionStore>,
        renewal: Arc<RenewalCoordinator>,
        started: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            session,
            renewal,
            started,
            cancel: CancellationToken::new(),
        }
    }

    /// Token the owner cancels when it goes away.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> BootstrapOutcome {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("bootstrap already started");
            return BootstrapOutcome::AlreadyStarted;
        }

        let resolved = self.resolve().await;

        if self.cancel.is_cancelled() {
            info!("bootstrap cancelled; discarding result");
            return BootstrapOutcome::Cancelled;
        }

        let outcome = match resolved {
            Some((token, user)) => {
                self.session.set_token(Some(token));
                self.session.set_identity(Some(user.clone()));
                BootstrapOutcome::Authenticated(user)
            }
            None => {
                self.session.clear();
                BootstrapOutcome::Anonymous
            }
        };
        self.session.mark_ready();
        outcome
    }

    async fn resolve(&self) -> Option<(String, Identity)> {
        let token = match self.renewal.renew().await {
            Ok(token) => token,
            Err(e) => {
                debug!(error = %e, "no session to restore");
                return None;
            }
        };

        let resp = match self
            .transport
            .call(IDENTITY_PATH, &RequestConfig::get(), Some(&token))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                debug!(error = %e, "identity fetch failed");
                return None;
            }
        };

        match serde_json::from_value::<Envelope<Identity>>(resp.body) {
            Ok(Envelope {
                success: true,
                data: Some(user),
                ..
            }) => Some((token, user)),
            Ok(env) => {
                debug!(message = ?env.failure_message(), "identity response rejected");
                None
            }
            Err(e) => {
                debug!(error = %e, "identity response malformed");
                None
            }
        }
    }
}
