//! Live delivery stream: one websocket per monitored pipe.
//!
//! Frames are at-most-once and best effort. Anything that does not parse
//! into a [`DeliveryEvent`] for the monitored pipe is dropped silently (logged
//! at debug, counted in metrics). There is no automatic reconnect; owners
//! watch [`StreamState`] and call [`LiveFeed::monitor`] again.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hf_api_types::DeliveryEvent;
use hf_core::config::StreamConfig;
use hf_telemetry::metrics::{global_metrics, names, record_stream_frame};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::event_buffer::EventBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Open,
}

/// Why a frame was not admitted to the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRejection {
    /// Not JSON, or required fields absent or of the wrong type.
    Malformed(String),
    MissingId,
    InvalidStatus,
    ForeignPipe(String),
}

impl FrameRejection {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::MissingId => "missing_id",
            Self::InvalidStatus => "invalid_status",
            Self::ForeignPipe(_) => "foreign_pipe",
        }
    }
}

/// Parse one text frame and check it belongs to `pipe_id`.
pub fn parse_frame(text: &str, pipe_id: &str) -> Result<DeliveryEvent, FrameRejection> {
    let event: DeliveryEvent =
        serde_json::from_str(text).map_err(|e| FrameRejection::Malformed(e.to_string()))?;
    if event.id.is_empty() {
        return Err(FrameRejection::MissingId);
    }
    if event.status_code == 0 {
        return Err(FrameRejection::InvalidStatus);
    }
    if event.pipe_id != pipe_id {
        return Err(FrameRejection::ForeignPipe(event.pipe_id));
    }
    Ok(event)
}

/// `{base}?pipe_id={pipe_id}&token={token}` with both values percent-encoded.
///
/// The backend mounts a single realtime endpoint; the pipe travels in the
/// query string next to the token.
pub fn stream_url(base: &str, pipe_id: &str, token: &str) -> Result<String, StreamError> {
    if !(base.starts_with("ws://") || base.starts_with("wss://")) {
        return Err(StreamError::InvalidUrl(base.to_string()));
    }
    if pipe_id.trim().is_empty() {
        return Err(StreamError::InvalidUrl("empty pipe id".into()));
    }
    if token.is_empty() {
        return Err(StreamError::MissingToken);
    }
    Ok(format!(
        "{}?pipe_id={}&token={}",
        base.trim_end_matches('/'),
        urlencoding::encode(pipe_id),
        urlencoding::encode(token)
    ))
}

type SharedBuffer = Arc<Mutex<EventBuffer>>;

fn lock(buffer: &SharedBuffer) -> MutexGuard<'_, EventBuffer> {
    buffer.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// One socket lifetime for one pipe, with its own buffer.
pub struct Subscription {
    pipe_id: String,
    token: String,
    state: watch::Receiver<StreamState>,
    buffer: SharedBuffer,
    updates: flume::Receiver<DeliveryEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), StreamError>>>,
}

impl Subscription {
    /// Spawn the socket task. Starts in `Connecting`.
    pub fn open(config: &StreamConfig, pipe_id: &str, token: &str) -> Result<Self, StreamError> {
        let url = stream_url(&config.url, pipe_id, token)?;
        let (state_tx, state) = watch::channel(StreamState::Connecting);
        let (updates_tx, updates) = flume::bounded(config.buffer_capacity.max(1));
        let buffer = Arc::new(Mutex::new(EventBuffer::new(config.buffer_capacity)));
        let cancel = CancellationToken::new();

        let socket = SocketTask {
            url,
            pipe_id: pipe_id.to_string(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            state: state_tx,
            buffer: Arc::clone(&buffer),
            updates: updates_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(socket.run());

        Ok(Self {
            pipe_id: pipe_id.to_string(),
            token: token.to_string(),
            state,
            buffer,
            updates,
            cancel,
            task: Some(task),
        })
    }

    pub fn pipe_id(&self) -> &str {
        &self.pipe_id
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Accepted events as they arrive, oldest first.
    ///
    /// Holds at most `buffer_capacity` undelivered events; newer events are
    /// dropped from this channel (never from the buffer) while it is full.
    pub fn updates(&self) -> flume::Receiver<DeliveryEvent> {
        self.updates.clone()
    }

    /// Buffered events, newest first.
    pub fn events(&self) -> Vec<DeliveryEvent> {
        lock(&self.buffer).snapshot()
    }

    pub fn event(&self, id: &str) -> Option<DeliveryEvent> {
        lock(&self.buffer).get(id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.buffer).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled() && self.state() != StreamState::Disconnected
    }

    fn matches(&self, pipe_id: &str, token: &str) -> bool {
        self.pipe_id == pipe_id && self.token == token
    }

    /// Stop the socket. Safe to call any number of times.
    pub fn close(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!(pipe_id = %self.pipe_id, "closing stream subscription");
            self.cancel.cancel();
        }
    }

    /// Wait for the socket task to finish and report how it ended. Returns
    /// `Ok(())` on later calls.
    pub async fn closed(&mut self) -> Result<(), StreamError> {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(Ok(())),
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pipe_id", &self.pipe_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct SocketTask {
    url: String,
    pipe_id: String,
    connect_timeout: Duration,
    state: watch::Sender<StreamState>,
    buffer: SharedBuffer,
    updates: flume::Sender<DeliveryEvent>,
    cancel: CancellationToken,
}

impl SocketTask {
    async fn run(self) -> Result<(), StreamError> {
        let result = self.connect_and_read().await;
        self.state.send_replace(StreamState::Disconnected);
        result
    }

    async fn connect_and_read(&self) -> Result<(), StreamError> {
        let connect = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.url.as_str()),
        );
        let ws = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            res = connect => match res {
                Ok(Ok((ws, _))) => ws,
                Ok(Err(e)) => {
                    warn!(pipe_id = %self.pipe_id, error = %e, "stream connect failed");
                    return Err(StreamError::Connect(e.to_string()));
                }
                Err(_) => {
                    warn!(pipe_id = %self.pipe_id, timeout = ?self.connect_timeout, "stream connect timed out");
                    return Err(StreamError::Timeout(self.connect_timeout));
                }
            },
        };

        self.state.send_replace(StreamState::Open);
        global_metrics().add_gauge(names::STREAM_OPEN_SOCKETS, 1);
        info!(pipe_id = %self.pipe_id, "stream open");

        let (mut sink, mut source) = ws.split();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                msg = source.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(pipe_id = %self.pipe_id, "stream closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(pipe_id = %self.pipe_id, error = %e, "stream read error");
                        break;
                    }
                },
            }
        }

        global_metrics().add_gauge(names::STREAM_OPEN_SOCKETS, -1);
        info!(pipe_id = %self.pipe_id, "stream disconnected");
        Ok(())
    }

    fn handle_text(&self, text: &str) {
        match parse_frame(text, &self.pipe_id) {
            Ok(event) => {
                record_stream_frame("accepted");
                let evicted = lock(&self.buffer).push(event.clone());
                if let Some(old) = evicted {
                    debug!(pipe_id = %self.pipe_id, evicted = %old.id, "buffer full; evicted oldest event");
                }
                if let Err(flume::TrySendError::Full(event)) = self.updates.try_send(event) {
                    debug!(pipe_id = %self.pipe_id, event_id = %event.id, "update channel full; not notifying");
                }
            }
            Err(rejection) => {
                record_stream_frame(rejection.as_label());
                debug!(pipe_id = %self.pipe_id, reason = ?rejection, "frame dropped");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LiveFeed
// ---------------------------------------------------------------------------

/// Owns the current subscription and the focused event.
///
/// The focused event is a copy, so it survives buffer turnover and
/// switching to another pipe.
pub struct LiveFeed {
    config: StreamConfig,
    current: Option<Subscription>,
    focused: Option<DeliveryEvent>,
}

impl LiveFeed {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            current: None,
            focused: None,
        }
    }

    /// Ensure a live subscription for `pipe_id` with `token`. Returns `true`
    /// if a fresh subscription was started, `false` if the current one was
    /// kept.
    pub fn monitor(&mut self, pipe_id: &str, token: &str) -> Result<bool, StreamError> {
        let keep = self
            .current
            .as_ref()
            .is_some_and(|s| s.matches(pipe_id, token) && s.is_alive());
        if keep {
            return Ok(false);
        }

        if let Some(mut old) = self.current.take() {
            old.close();
        }
        self.current = Some(Subscription::open(&self.config, pipe_id, token)?);
        info!(pipe_id, "monitoring pipe");
        Ok(true)
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.current.as_ref()
    }

    pub fn subscription_mut(&mut self) -> Option<&mut Subscription> {
        self.current.as_mut()
    }

    pub fn state(&self) -> StreamState {
        self.current
            .as_ref()
            .map(Subscription::state)
            .unwrap_or(StreamState::Disconnected)
    }

    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.current
            .as_ref()
            .map(Subscription::events)
            .unwrap_or_default()
    }

    /// Copy the event with `id` out of the current buffer into focus.
    pub fn focus(&mut self, id: &str) -> bool {
        match self.current.as_ref().and_then(|s| s.event(id)) {
            Some(event) => {
                self.focused = Some(event);
                true
            }
            None => false,
        }
    }

    pub fn focused(&self) -> Option<&DeliveryEvent> {
        self.focused.as_ref()
    }

    pub fn clear_focus(&mut self) {
        self.focused = None;
    }

    /// Close the current subscription, if any. Idempotent.
    pub fn close(&mut self) {
        if let Some(sub) = self.current.as_mut() {
            sub.close();
        }
    }
}
