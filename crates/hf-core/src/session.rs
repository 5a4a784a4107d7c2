//! In-memory session state.
//!
//! The access token and the signed-in identity live only in process memory.
//! Mutations are synchronous and visible to the very next [`SessionStore::token`]
//! call; readiness is a one-way latch published through a `watch` channel.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use hf_api_types::Identity;
use tokio::sync::watch;

use crate::event_bus::EventBus;

/// Where the process is in its session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// The first bootstrap attempt has not resolved yet.
    Bootstrapping,
    /// Bootstrap resolved at least once; never reverts.
    Ready,
}

/// Read model combining phase and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Bootstrapping,
    Authenticated(Identity),
    Anonymous,
}

/// Lifecycle notifications published on [`SessionStore::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Authenticated { user_id: String },
    LoggedOut,
    /// Renewal failed or a retried call was still rejected.
    Expired,
}

#[derive(Debug, Default)]
struct SessionState {
    access_token: Option<String>,
    user: Option<Identity>,
}

pub struct SessionStore {
    state: RwLock<SessionState>,
    phase: watch::Sender<SessionPhase>,
    events: EventBus<SessionEvent>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(SessionPhase::Bootstrapping);
        Self {
            state: RwLock::new(SessionState::default()),
            phase,
            events: EventBus::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        self.write().access_token = token.filter(|t| !t.is_empty());
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read().user.clone()
    }

    /// Replace the identity wholesale. Publishes `Authenticated` when a user
    /// is set.
    pub fn set_identity(&self, user: Option<Identity>) {
        let user_id = user.as_ref().map(|u| u.id.clone());
        self.write().user = user;
        if let Some(user_id) = user_id {
            tracing::debug!(user_id = %user_id, "session identity set");
            self.events.publish(SessionEvent::Authenticated { user_id });
        }
    }

    /// Drop token and identity together. Returns `true` if either was present.
    pub fn clear(&self) -> bool {
        let mut state = self.write();
        let had_session = state.access_token.is_some() || state.user.is_some();
        state.access_token = None;
        state.user = None;
        had_session
    }

    /// Flip the ready latch. Idempotent.
    pub fn mark_ready(&self) {
        let flipped = self.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Ready {
                false
            } else {
                *phase = SessionPhase::Ready;
                true
            }
        });
        if flipped {
            tracing::info!(authenticated = self.is_authenticated(), "session ready");
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.phase.borrow() == SessionPhase::Ready
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Resolve once the session is ready; returns immediately if it already is.
    pub async fn wait_ready(&self) {
        let mut rx = self.phase.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|p| *p == SessionPhase::Ready).await;
    }

    pub fn status(&self) -> SessionStatus {
        if !self.is_ready() {
            return SessionStatus::Bootstrapping;
        }
        let state = self.read();
        match (&state.access_token, &state.user) {
            (Some(_), Some(user)) => SessionStatus::Authenticated(user.clone()),
            _ => SessionStatus::Anonymous,
        }
    }

    /// Token present and identity present. Always derived, never stored.
    pub fn is_authenticated(&self) -> bool {
        let state = self.read();
        state.access_token.is_some() && state.user.is_some()
    }

    pub fn subscribe(&self) -> flume::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        self.events.publish(event);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("SessionStore")
            .field("has_token", &state.access_token.is_some())
            .field("user", &state.user.as_ref().map(|u| &u.id))
            .field("phase", &*self.phase.borrow())
            .finish()
    }
}
