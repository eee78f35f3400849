//! longhaul-server - HTTP API for long-running analysis sessions
//!
//! Reads `.env` from the working directory, then configuration from
//! `$XDG_CONFIG_HOME/longhaul/config.toml` (or `--config`). The Anthropic API
//! key must be available before the server binds.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use longhaul_core::api::{self, AppState};
use longhaul_core::{AnthropicClient, Config, InteractionLog, IterationProcessor, SessionStore};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "longhaul-server")]
#[command(about = "Serve the long-running analysis API")]
#[command(version)]
struct Args {
    /// Address to listen on (overrides server.bind)
    #[arg(short, long)]
    bind: Option<String>,

    /// Config file (default: $XDG_CONFIG_HOME/longhaul/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for session documents (overrides server.sessions_dir)
    #[arg(long)]
    sessions_dir: Option<PathBuf>,

    /// Seconds to wait before each model call (overrides server.pacing_secs)
    #[arg(long)]
    pacing_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(dir) = args.sessions_dir {
        config.server.sessions_dir = dir;
    }
    if let Some(secs) = args.pacing_secs {
        config.server.pacing_secs = secs;
    }

    let _log_guard =
        longhaul_core::logging::init(&config.logging).context("failed to initialize logging")?;

    // No key, no server.
    let client = AnthropicClient::from_config(&config.llm)
        .context("failed to initialize Anthropic client")?;
    tracing::info!(model = %client.model(), "Anthropic client ready");

    let store = SessionStore::open(&config.server.sessions_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create sessions directory {}",
                config.server.sessions_dir.display()
            )
        })?;
    let interactions = InteractionLog::new(&config.server.interactions_dir);
    tokio::fs::create_dir_all(interactions.dir())
        .await
        .context("failed to create interactions directory")?;

    let processor = IterationProcessor::new(
        store,
        Arc::new(client),
        interactions,
        config.server.pacing(),
    );

    let addr = config.server.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(
        sessions_dir = %config.server.sessions_dir.display(),
        pacing_secs = config.server.pacing_secs,
        log_file = %longhaul_core::logging::log_file_path().display(),
        "longhaul-server starting up"
    );

    api::serve(listener, AppState::new(processor))
        .await
        .context("server error")?;

    Ok(())
}
