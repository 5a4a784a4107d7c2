//! In-process mock of the hookfilter backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use hf_client::ClientContext;
use hf_core::config::Config;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Accept,
    Reject,
    /// Accept only when the refresh cookie from sign-in is presented.
    RequireCookie,
}

pub struct Backend {
    /// Token `/users/me` and friends accept.
    pub valid_token: Mutex<String>,
    /// Token handed out by refresh and sign-in.
    pub issued_token: Mutex<String>,
    pub refresh_mode: Mutex<RefreshMode>,
    pub refresh_delay: Mutex<Duration>,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub logout_all_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub always_401_calls: AtomicUsize,
    pub pipes: Mutex<Vec<Value>>,
    pub frames: Mutex<Vec<Message>>,
    pub ws_connections: AtomicUsize,
}

impl Backend {
    fn new() -> Self {
        Self {
            valid_token: Mutex::new("fresh".into()),
            issued_token: Mutex::new("fresh".into()),
            refresh_mode: Mutex::new(RefreshMode::Accept),
            refresh_delay: Mutex::new(Duration::from_millis(100)),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            logout_all_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            always_401_calls: AtomicUsize::new(0),
            pipes: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
            ws_connections: AtomicUsize::new(0),
        }
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        *self.refresh_mode.lock().unwrap() = mode;
    }

    pub fn set_frames(&self, frames: Vec<Message>) {
        *self.frames.lock().unwrap() = frames;
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }
}

pub fn identity_json() -> Value {
    json!({
        "id": "u-1",
        "email": "dev@example.com",
        "username": "dev",
        "avatar_url": null,
        "created_at": "2025-01-01T00:00:00Z"
    })
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "error": "unauthorized"})),
    )
        .into_response()
}

fn ok(data: Value) -> Response {
    Json(json!({
        "success": true,
        "data": data,
        "metadata": {"requrest_id": "req-1", "pagination": null}
    }))
    .into_response()
}

async fn refresh(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *b.refresh_delay.lock().unwrap();
    tokio::time::sleep(delay).await;

    let has_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("refresh_token=r1"));
    let mode = *b.refresh_mode.lock().unwrap();
    let accepted = match mode {
        RefreshMode::Accept => true,
        RefreshMode::Reject => false,
        RefreshMode::RequireCookie => has_cookie,
    };
    if !accepted {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "error": "invalid refresh token"})),
        )
            .into_response();
    }
    let token = b.issued_token.lock().unwrap().clone();
    ok(json!({"access_token": token}))
}

async fn sign_in(State(b): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    if body["email"] != "dev@example.com" || body["password"] != "hunter2" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "error": "invalid credentials"})),
        )
            .into_response();
    }
    let token = b.issued_token.lock().unwrap().clone();
    let mut resp = ok(json!({"access_token": token}));
    resp.headers_mut().insert(
        header::SET_COOKIE,
        "refresh_token=r1; Path=/; HttpOnly".parse().unwrap(),
    );
    resp
}

async fn logout(State(b): State<Arc<Backend>>) -> Response {
    b.logout_calls.fetch_add(1, Ordering::SeqCst);
    ok(json!(null))
}

async fn logout_all(State(b): State<Arc<Backend>>) -> Response {
    b.logout_all_calls.fetch_add(1, Ordering::SeqCst);
    ok(json!(null))
}

async fn me(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.me_calls.fetch_add(1, Ordering::SeqCst);
    if !b.authorized(&headers) {
        return unauthorized();
    }
    ok(identity_json())
}

async fn list_pipes(
    State(b): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    let page: u32 = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit: u32 = q.get("limit").and_then(|p| p.parse().ok()).unwrap_or(10);
    let pipes = b.pipes.lock().unwrap().clone();
    let total = pipes.len() as u32;
    let total_page = total.div_ceil(limit.max(1));
    let items: Vec<Value> = pipes
        .into_iter()
        .skip(((page.max(1) - 1) * limit) as usize)
        .take(limit as usize)
        .collect();
    Json(json!({
        "success": true,
        "data": items,
        "metadata": {
            "request_id": "req-2",
            "pagination": {"page": page, "page_size": limit, "total_page": total_page, "total_data": total}
        }
    }))
    .into_response()
}

async fn create_pipe(
    State(b): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    let mut pipes = b.pipes.lock().unwrap();
    let pipe = json!({
        "id": format!("p-{}", pipes.len() + 1),
        "name": body["name"],
        "slug": body["slug"],
        "target_url": body["target_url"],
        "jq_filter": body.get("jq_filter").cloned().unwrap_or(Value::Null),
        "created_at": "2025-02-01T00:00:00Z"
    });
    pipes.push(pipe.clone());
    ok(pipe)
}

async fn delete_pipe(
    State(b): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    b.pipes.lock().unwrap().retain(|p| p["id"] != id.as_str());
    StatusCode::NO_CONTENT.into_response()
}

async fn always_401(State(b): State<Arc<Backend>>) -> Response {
    b.always_401_calls.fetch_add(1, Ordering::SeqCst);
    unauthorized()
}

async fn soft_fail() -> Response {
    Json(json!({"success": false, "error": "quota exceeded"})).into_response()
}

async fn teapot() -> Response {
    StatusCode::IM_A_TEAPOT.into_response()
}

async fn conflict() -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({"success": false, "message": "slug already taken"})),
    )
        .into_response()
}

async fn echo_headers(headers: HeaderMap) -> Response {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    ok(json!({
        "authorization": get("authorization"),
        "request_id": get("x-request-id"),
        "content_type": get("content-type"),
    }))
}

async fn echo_body(headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    ok(json!({"content_type": content_type, "len": body.len()}))
}

async fn not_json() -> Response {
    (StatusCode::OK, "plain text").into_response()
}

async fn stream(
    State(b): State<Arc<Backend>>,
    Query(q): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if !matches!(q.get("pipe_id"), Some(p) if !p.is_empty()) {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let expected = b.valid_token.lock().unwrap().clone();
    if q.get("token") != Some(&expected) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| serve_frames(socket, b))
}

async fn serve_frames(mut socket: WebSocket, b: Arc<Backend>) {
    b.ws_connections.fetch_add(1, Ordering::SeqCst);
    let frames = b.frames.lock().unwrap().clone();
    for frame in frames {
        if socket.send(frame).await.is_err() {
            return;
        }
    }
    // Hold the socket until the client goes away.
    while let Some(Ok(msg)) = socket.recv().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}

pub struct TestServer {
    pub backend: Arc<Backend>,
    pub api_url: String,
    pub ws_url: String,
}

impl TestServer {
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.api.base_url = self.api_url.clone();
        cfg.api.request_timeout_secs = 5;
        cfg.stream.url = self.ws_url.clone();
        cfg.stream.connect_timeout_secs = 2;
        cfg
    }

    pub fn context(&self) -> ClientContext {
        ClientContext::new(self.config()).expect("client context")
    }
}

/// Spin up the mock backend on a random port.
pub async fn start_test_server() -> TestServer {
    let backend = Arc::new(Backend::new());

    let api = Router::new()
        .route("/auth/refresh", post(refresh))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
        .route("/users/me", get(me))
        .route("/pipes", get(list_pipes).post(create_pipe))
        .route("/pipes/{id}", delete(delete_pipe))
        .route("/always-401", get(always_401))
        .route("/soft-fail", get(soft_fail))
        .route("/teapot", get(teapot))
        .route("/conflict", get(conflict))
        .route("/echo-headers", get(echo_headers))
        .route("/echo-body", post(echo_body))
        .route("/not-json", get(not_json));

    let router = Router::new()
        .nest("/api/v1", api)
        .route("/ws", get(stream))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to ephemeral port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        backend,
        api_url: format!("http://{addr}/api/v1"),
        ws_url: format!("ws://{addr}/ws"),
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
