use hf_client::ClientContext;

/// Run the `logout` subcommand. Local state is cleared even when the backend
/// cannot be reached.
pub async fn run(ctx: &ClientContext, all: bool) -> anyhow::Result<()> {
    let auth = ctx.auth();
    if all {
        auth.logout_all().await;
        println!("signed out of all sessions");
    } else {
        auth.logout().await;
        println!("signed out");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::super::ensure_session;
    use super::super::test_support::*;
    use super::*;
    use axum::routing::post;
    use axum::Router;

    #[tokio::test]
    async fn logout_all_hits_backend_and_clears_session() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let extra = Router::new().route(
            "/auth/logout-all",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    axum::Json(serde_json::json!({"success": true}))
                }
            }),
        );
        let addr = start_backend(extra).await;
        let ctx = context(&addr);
        ensure_session(&ctx, Some(&credentials())).await.unwrap();

        run(&ctx, true).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!ctx.session().is_authenticated());
    }

    #[tokio::test]
    async fn logout_succeeds_when_endpoint_is_missing() {
        let addr = start_backend(Router::new()).await;
        let ctx = context(&addr);
        ensure_session(&ctx, Some(&credentials())).await.unwrap();

        assert!(run(&ctx, false).await.is_ok());
        assert!(ctx.session().token().is_none());
    }
}
