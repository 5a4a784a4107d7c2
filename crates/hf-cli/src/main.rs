mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hf_api_types::CreatePipeRequest;
use hf_client::ClientContext;
use hf_core::config::Config;
use hf_telemetry::metrics::global_metrics;

use commands::Credentials;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// hookfilter CLI -- manage webhook pipes and watch deliveries live.
#[derive(Parser)]
#[command(name = "hf", version, about)]
struct Cli {
    /// Config file (defaults to ~/.hookfilter/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the API base URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Dump Prometheus metrics to stderr on exit.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the signed-in user.
    Whoami,

    /// Manage pipes.
    Pipes {
        #[command(subcommand)]
        action: PipeAction,
    },

    /// Stream deliveries for a pipe in real time.
    Watch {
        /// Pipe ID to monitor.
        pipe_id: String,
        /// Exit after this many events.
        #[arg(long)]
        max_events: Option<usize>,
    },

    /// Sign out.
    Logout {
        /// Revoke every session of this user, not just this one.
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum PipeAction {
    /// List pipes.
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Create a pipe.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        slug: String,
        /// Where matching deliveries are forwarded.
        #[arg(long)]
        target_url: String,
        /// Optional jq filter applied before forwarding.
        #[arg(long)]
        jq_filter: Option<String>,
    },
    /// Delete a pipe.
    Delete { id: String },
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut cfg = Config::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            cfg.apply_env_overrides();
            cfg
        }
        None => Config::load().context("failed to load config")?,
    };
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    hf_telemetry::logging::init(
        "hf",
        &config.general.log_level,
        cli.json_logs || config.general.json_logs,
    );

    let ctx = ClientContext::new(config).context("failed to build HTTP client")?;
    let result = dispatch(&ctx, &cli).await;

    if cli.metrics {
        eprint!("{}", global_metrics().export_prometheus());
    }
    result
}

async fn dispatch(ctx: &ClientContext, cli: &Cli) -> anyhow::Result<()> {
    let credentials = Credentials::from_env();
    let session = commands::ensure_session(ctx, credentials.as_ref()).await;

    if let Commands::Logout { all } = &cli.command {
        if let Err(e) = &session {
            tracing::debug!(error = %e, "no active session; clearing local state only");
        }
        return commands::logout::run(ctx, *all).await;
    }
    session?;

    match &cli.command {
        Commands::Whoami => commands::whoami::run(ctx, cli.json).await,
        Commands::Pipes { action } => match action {
            PipeAction::List { page, limit } => {
                commands::pipes::list(ctx, *page, *limit, cli.json).await
            }
            PipeAction::Create {
                name,
                slug,
                target_url,
                jq_filter,
            } => {
                let request = CreatePipeRequest {
                    name: name.clone(),
                    slug: slug.clone(),
                    target_url: target_url.clone(),
                    jq_filter: jq_filter.clone(),
                };
                commands::pipes::create(ctx, request).await
            }
            PipeAction::Delete { id } => commands::pipes::delete(ctx, id).await,
        },
        Commands::Watch {
            pipe_id,
            max_events,
        } => {
            let opts = commands::watch::WatchOptions {
                pipe_id: pipe_id.clone(),
                max_events: *max_events,
                json: cli.json,
            };
            commands::watch::run(ctx, opts).await
        }
        Commands::Logout { .. } => Ok(()),
    }
}
