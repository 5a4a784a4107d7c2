use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use hf_core::config::Config;
use hf_core::session::SessionStore;

use crate::auth::AuthClient;
use crate::bootstrap::Bootstrapper;
use crate::error::ApiError;
use crate::pipeline::RequestPipeline;
use crate::pipes::PipesClient;
use crate::renewal::{HttpTokenRefresher, RenewalCoordinator, TokenRefresher};
use crate::stream::LiveFeed;
use crate::transport::Transport;

/// Process-wide wiring: one transport (and cookie jar), one session store
/// and one renewal coordinator shared by every client handed out.
pub struct ClientContext {
    config: Config,
    transport: Transport,
    session: Arc<SessionStore>,
    renewal: Arc<RenewalCoordinator>,
    bootstrap_started: Arc<AtomicBool>,
}

impl ClientContext {
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let transport = Transport::new(&config.api)?;
        let refresher = Arc::new(HttpTokenRefresher::new(transport.clone()));
        Ok(Self::with_parts(config, transport, refresher))
    }

    /// Use a custom refresher instead of `POST /auth/refresh`.
    pub fn with_refresher(
        config: Config,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Result<Self, ApiError> {
        let transport = Transport::new(&config.api)?;
        Ok(Self::with_parts(config, transport, refresher))
    }

    fn with_parts(config: Config, transport: Transport, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            config,
            transport,
            session: Arc::new(SessionStore::new()),
            renewal: Arc::new(RenewalCoordinator::new(refresher)),
            bootstrap_started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn renewal(&self) -> &Arc<RenewalCoordinator> {
        &self.renewal
    }

    pub fn pipeline(&self) -> RequestPipeline {
        RequestPipeline::new(
            self.transport.clone(),
            Arc::clone(&self.session),
            Arc::clone(&self.renewal),
        )
    }

    /// Bootstrappers from one context share a single run-once guard.
    pub fn bootstrapper(&self) -> Bootstrapper {
        Bootstrapper::new(
            self.transport.clone(),
            Arc::clone(&self.session),
            Arc::clone(&self.renewal),
            Arc::clone(&self.bootstrap_started),
        )
    }

    pub fn auth(&self) -> AuthClient {
        AuthClient::new(self.transport.clone(), self.pipeline(), Arc::clone(&self.session))
    }

    pub fn pipes(&self) -> PipesClient {
        PipesClient::new(self.pipeline())
    }

    pub fn live_feed(&self) -> LiveFeed {
        LiveFeed::new(self.config.stream.clone())
    }
}
