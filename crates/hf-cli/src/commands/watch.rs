use std::time::Duration;

use hf_api_types::DeliveryEvent;
use hf_client::stream::StreamState;
use hf_client::ClientContext;
use tracing::{debug, warn};

pub struct WatchOptions {
    pub pipe_id: String,
    /// Stop after this many events.
    pub max_events: Option<usize>,
    pub json: bool,
}

/// Run the `watch` subcommand: stream deliveries for one pipe until ctrl-c.
///
/// When the socket drops, the token is renewed and the pipe re-monitored
/// after `stream.resubscribe_delay_ms`.
pub async fn run(ctx: &ClientContext, opts: WatchOptions) -> anyhow::Result<()> {
    let mut feed = ctx.live_feed();
    let delay = Duration::from_millis(ctx.config().stream.resubscribe_delay_ms);
    let mut seen = 0usize;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let token = ctx
            .session()
            .token()
            .ok_or_else(|| anyhow::anyhow!("Not signed in; cannot open the live stream."))?;
        if feed.monitor(&opts.pipe_id, &token)? {
            eprintln!("watching pipe {} (ctrl-c to stop)", opts.pipe_id);
        }
        let Some(sub) = feed.subscription() else {
            anyhow::bail!("stream subscription missing");
        };
        let updates = sub.updates();
        let mut state = sub.watch_state();

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    feed.close();
                    return Ok(());
                }
                event = updates.recv_async() => match event {
                    Ok(event) => {
                        println!("{}", render_event(&event, opts.json));
                        seen += 1;
                        if opts.max_events.is_some_and(|max| seen >= max) {
                            feed.close();
                            return Ok(());
                        }
                    }
                    Err(_) => break,
                },
                _ = state.wait_for(|s| *s == StreamState::Disconnected) => break,
            }
        }

        warn!(pipe_id = %opts.pipe_id, delay_ms = delay.as_millis() as u64, "stream disconnected; resubscribing");
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
        match ctx.renewal().renew().await {
            Ok(token) => ctx.session().set_token(Some(token)),
            Err(e) => debug!(error = %e, "renewal before resubscribe failed; reusing token"),
        }
    }
}

fn render_event(event: &DeliveryEvent, json: bool) -> String {
    if json {
        return serde_json::to_string(event).unwrap_or_default();
    }
    format!(
        "{}  {}  {}  {}",
        event.received_at.format("%H:%M:%S"),
        event.status_code,
        event.id,
        event.payload
    )
}
