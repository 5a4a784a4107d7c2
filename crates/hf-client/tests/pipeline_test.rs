mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{eventually, start_test_server, RefreshMode};
use hf_client::transport::RequestConfig;
use hf_client::ApiError;
use hf_core::session::SessionEvent;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Renewal + retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_unauthorized_calls_share_one_refresh() {
    let server = start_test_server().await;
    let ctx = server.context();
    ctx.session().set_token(Some("stale".into()));
    let pipeline = ctx.pipeline();

    let calls = (0..10).map(|_| {
        let pipeline = pipeline.clone();
        async move { pipeline.get::<Value>("/users/me").await }
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        let body = result.expect("call succeeds after renewal");
        assert_eq!(body["data"]["id"], "u-1");
    }
    assert_eq!(server.backend.refreshes(), 1);
    assert_eq!(ctx.renewal().renewals_started(), 1);
    assert_eq!(ctx.session().token().as_deref(), Some("fresh"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retry_keeps_renewed_token_when_session_expires_concurrently() {
    let server = start_test_server().await;
    let ctx = server.context();
    ctx.session().set_token(Some("stale".into()));
    let pipeline = ctx.pipeline();

    // One caller's retry ends the session while the others are retrying.
    let mut doomed = Vec::new();
    let mut healthy = Vec::new();
    for i in 0..16 {
        let pipeline = pipeline.clone();
        if i % 4 == 0 {
            doomed.push(tokio::spawn(async move {
                pipeline.get::<Value>("/always-401").await
            }));
        } else {
            healthy.push(tokio::spawn(async move {
                pipeline.get::<Value>("/users/me").await
            }));
        }
    }

    for handle in healthy {
        let body = handle.await.unwrap().expect("retry carries the renewed token");
        assert_eq!(body["data"]["id"], "u-1");
    }
    for handle in doomed {
        assert!(matches!(handle.await.unwrap(), Err(ApiError::SessionExpired)));
    }
    assert!(eventually(|| server.backend.logouts() >= 1).await);
}

#[tokio::test]
async fn valid_token_needs_no_refresh() {
    let server = start_test_server().await;
    let ctx = server.context();
    ctx.session().set_token(Some("fresh".into()));

    let body: Value = ctx.pipeline().get("/users/me").await.unwrap();
    assert_eq!(body["data"]["username"], "dev");
    assert_eq!(server.backend.refreshes(), 0);
}

#[tokio::test]
async fn retry_happens_at_most_once() {
    let server = start_test_server().await;
    let ctx = server.context();
    ctx.session().set_token(Some("stale".into()));
    let events = ctx.session().subscribe();

    let err = ctx
        .pipeline()
        .get::<Value>("/always-401")
        .await
        .expect_err("still unauthorized after renewal");

    assert!(matches!(err, ApiError::SessionExpired));
    assert_eq!(server.backend.always_401_calls.load(Ordering::SeqCst), 2);
    assert_eq!(server.backend.refreshes(), 1);
    assert!(ctx.session().token().is_none());
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);
    assert!(eventually(|| server.backend.logouts() == 1).await);
}

#[tokio::test]
async fn disallowed_retry_expires_immediately() {
    let server = start_test_server().await;
    let ctx = server.context();
    ctx.session().set_token(Some("stale".into()));

    let err = ctx
        .pipeline()
        .request_with("/users/me", RequestConfig::get(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::SessionExpired));
    assert_eq!(server.backend.refreshes(), 0);
}

#[tokio::test]
async fn renewal_failure_logs_out_once() {
    let server = start_test_server().await;
    server.backend.set_refresh_mode(RefreshMode::Reject);
    let ctx = server.context();
    ctx.session().set_token(Some("stale".into()));
    let events = ctx.session().subscribe();
    let pipeline = ctx.pipeline();

    let calls = (0..5).map(|_| {
        let pipeline = pipeline.clone();
        async move { pipeline.get::<Value>("/users/me").await }
    });
    for result in futures::future::join_all(calls).await {
        assert!(matches!(result, Err(ApiError::SessionExpired)));
    }

    assert!(!ctx.session().is_authenticated());
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);
    assert!(events.try_recv().is_err());

    assert!(eventually(|| server.backend.logouts() >= 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.backend.logouts(), 1);
}

#[tokio::test]
async fn failed_renewal_does_not_block_the_next_one() {
    let server = start_test_server().await;
    server.backend.set_refresh_mode(RefreshMode::Reject);
    let ctx = server.context();
    ctx.session().set_token(Some("stale".into()));

    let first = ctx.pipeline().get::<Value>("/users/me").await;
    assert!(matches!(first, Err(ApiError::SessionExpired)));
    assert!(!ctx.renewal().is_renewing());

    server.backend.set_refresh_mode(RefreshMode::Accept);
    ctx.session().set_token(Some("stale".into()));
    let second: Value = ctx.pipeline().get("/users/me").await.unwrap();

    assert_eq!(second["data"]["id"], "u-1");
    assert_eq!(server.backend.refreshes(), 2);
}

// ---------------------------------------------------------------------------
// Envelope + transport normalization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn envelope_failure_on_200_is_an_error_and_not_retried() {
    let server = start_test_server().await;
    let ctx = server.context();
    ctx.session().set_token(Some("fresh".into()));

    let err = ctx.pipeline().get::<Value>("/soft-fail").await.unwrap_err();
    match err {
        ApiError::Http {
            status, message, ..
        } => {
            assert_eq!(status, 200);
            assert_eq!(message, "quota exceeded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(server.backend.refreshes(), 0);
    assert!(ctx.session().token().is_some());
}

#[tokio::test]
async fn error_message_falls_back_to_reason_phrase() {
    let server = start_test_server().await;
    let ctx = server.context();
    let pipeline = ctx.pipeline();

    let err = pipeline.get::<Value>("/teapot").await.unwrap_err();
    assert_eq!(err.status(), Some(418));
    assert!(err.to_string().contains("I'm a teapot"));

    let err = pipeline.get::<Value>("/conflict").await.unwrap_err();
    match err {
        ApiError::Http {
            status,
            body,
            message,
        } => {
            assert_eq!(status, 409);
            assert_eq!(message, "slug already taken");
            assert_eq!(body.unwrap()["success"], false);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn no_content_becomes_empty_object() {
    let server = start_test_server().await;
    let ctx = server.context();
    ctx.session().set_token(Some("fresh".into()));

    let body: Value = ctx.pipeline().delete("/pipes/p-404").await.unwrap();
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn non_json_success_body_is_decode_error() {
    let server = start_test_server().await;
    let ctx = server.context();

    let err = ctx.pipeline().get::<Value>("/not-json").await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn bearer_only_when_token_present() {
    let server = start_test_server().await;
    let ctx = server.context();
    let pipeline = ctx.pipeline();

    let anon: Value = pipeline.get("/echo-headers").await.unwrap();
    assert!(anon["data"]["authorization"].is_null());
    let request_id = anon["data"]["request_id"].as_str().unwrap();
    assert_eq!(request_id.len(), 32);

    ctx.session().set_token(Some("fresh".into()));
    let authed: Value = pipeline.get("/echo-headers").await.unwrap();
    assert_eq!(authed["data"]["authorization"], "Bearer fresh");
    assert_ne!(authed["data"]["request_id"], anon["data"]["request_id"]);
}

#[tokio::test]
async fn raw_body_is_not_json_encoded() {
    let server = start_test_server().await;
    let ctx = server.context();

    let config = RequestConfig::post().raw(vec![0u8, 1, 2, 3], Some("application/octet-stream"));
    let body = ctx.pipeline().request("/echo-body", config).await.unwrap();
    assert_eq!(body["data"]["content_type"], "application/octet-stream");
    assert_eq!(body["data"]["len"], 4);

    let config = RequestConfig::post().json(&json!({"k": "v"})).unwrap();
    let body = ctx.pipeline().request("/echo-body", config).await.unwrap();
    assert_eq!(body["data"]["content_type"], "application/json");
}

#[tokio::test]
async fn unreachable_backend_is_network_error() {
    let server = start_test_server().await;
    let mut cfg = server.config();
    cfg.api.base_url = "http://127.0.0.1:9/api/v1".into();
    let ctx = hf_client::ClientContext::new(cfg).unwrap();

    let err = ctx.pipeline().get::<Value>("/users/me").await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_) | ApiError::Timeout));
}
