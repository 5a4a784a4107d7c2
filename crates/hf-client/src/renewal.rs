//! Single-flight access token renewal.
//!
//! Any number of callers can discover an expired token at the same moment;
//! they all end up awaiting one shared refresh. The shared slot is emptied
//! by the refresh task itself before the outcome reaches any waiter, so the
//! next expiry after a settled renewal always starts a fresh one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use hf_api_types::{AccessTokenPayload, Envelope};
use hf_telemetry::metrics::record_renewal;
use tracing::{debug, info, warn};

use crate::error::{ApiError, RenewalError};
use crate::transport::{RequestConfig, Transport};

pub const REFRESH_PATH: &str = "/auth/refresh";

/// Produces a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync + 'static {
    async fn refresh(&self) -> Result<String, RenewalError>;
}

/// `POST /auth/refresh` authenticated by the refresh cookie alone.
pub struct HttpTokenRefresher {
    transport: Transport,
}

impl HttpTokenRefresher {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self) -> Result<String, RenewalError> {
        let resp = self
            .transport
            .call(REFRESH_PATH, &RequestConfig::post(), None)
            .await
            .map_err(|e| match e {
                ApiError::Http {
                    status, message, ..
                } => RenewalError::Rejected { status, message },
                other => RenewalError::Transport(other.to_string()),
            })?;

        let envelope: Envelope<AccessTokenPayload> = serde_json::from_value(resp.body)
            .map_err(|e| RenewalError::InvalidResponse(e.to_string()))?;
        if !envelope.success {
            return Err(RenewalError::Rejected {
                status: resp.status,
                message: envelope
                    .failure_message()
                    .unwrap_or("refresh rejected")
                    .to_string(),
            });
        }
        envelope
            .data
            .map(|d| d.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RenewalError::InvalidResponse("missing access_token".into()))
    }
}

type SharedRenewal = Shared<BoxFuture<'static, Result<String, RenewalError>>>;
type Slot = Arc<Mutex<Option<SharedRenewal>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<SharedRenewal>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Empties the slot when the refresh task ends, panics included.
struct ClearOnDrop(Slot);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        lock(&self.0).take();
    }
}

/// Collapses concurrent renewals into one in-flight refresh.
pub struct RenewalCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    inflight: Slot,
    started: AtomicU64,
}

impl RenewalCoordinator {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher,
            inflight: Arc::new(Mutex::new(None)),
            started: AtomicU64::new(0),
        }
    }

    /// Join the in-flight renewal, or start one if none is running.
    pub async fn renew(&self) -> Result<String, RenewalError> {
        let shared = {
            let mut slot = lock(&self.inflight);
            match slot.as_ref() {
                Some(pending) => {
                    debug!("joining in-flight token renewal");
                    pending.clone()
                }
                None => {
                    let pending = self.spawn_refresh();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        shared.await
    }

    /// The refresh runs on its own task so it settles even if every waiter
    /// is dropped mid-flight.
    fn spawn_refresh(&self) -> SharedRenewal {
        let attempt = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let refresher = Arc::clone(&self.refresher);
        let guard = ClearOnDrop(Arc::clone(&self.inflight));
        info!(attempt, "starting token renewal");

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = refresher.refresh().await;
            drop(guard);

            let elapsed = started.elapsed().as_secs_f64();
            match &result {
                Ok(_) => {
                    record_renewal("success", elapsed);
                    info!(attempt, "token renewed");
                }
                Err(e) => {
                    record_renewal("failure", elapsed);
                    warn!(attempt, error = %e, "token renewal failed");
                }
            }
            result
        });

        handle
            .map(|joined| joined.unwrap_or(Err(RenewalError::Aborted)))
            .boxed()
            .shared()
    }

    pub fn is_renewing(&self) -> bool {
        lock(&self.inflight).is_some()
    }

    /// How many refreshes have been started since construction.
    pub fn renewals_started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }
}
