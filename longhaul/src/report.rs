//! longhaul-report - render a session document as a static HTML page
//!
//! ```text
//! longhaul-report analysis_sessions/20241101_192023.json
//! longhaul-report --session-id 20241101_192023 -o tides.html
//! longhaul-report --list
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use longhaul_core::report::{self, DEFAULT_REPORT_NAME};
use longhaul_core::{Config, SessionStore};

#[derive(Parser)]
#[command(name = "longhaul-report")]
#[command(about = "Render an analysis session as HTML")]
#[command(version)]
struct Args {
    /// Session JSON file to render
    #[arg(conflicts_with_all = ["session_id", "list"])]
    session_file: Option<PathBuf>,

    /// Render a stored session by id instead of by path
    #[arg(short, long)]
    session_id: Option<String>,

    /// List stored session ids and exit
    #[arg(short, long)]
    list: bool,

    /// Output HTML file
    #[arg(short, long, default_value = DEFAULT_REPORT_NAME)]
    output: PathBuf,

    /// Config file (default: $XDG_CONFIG_HOME/longhaul/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for session documents (overrides server.sessions_dir)
    #[arg(long)]
    sessions_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;
    if let Some(dir) = args.sessions_dir {
        config.server.sessions_dir = dir;
    }

    let _log_guard =
        longhaul_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let store = SessionStore::new(&config.server.sessions_dir);

    if args.list {
        let ids = store.list().await.context("failed to list sessions")?;
        if ids.is_empty() {
            println!("No sessions in {}", store.dir().display());
        }
        for id in ids {
            println!("{}", id);
        }
        return Ok(());
    }

    let json_path = match (args.session_file, args.session_id) {
        (Some(path), _) => path,
        (None, Some(id)) => {
            // Validates the id and surfaces "not found" before touching the output.
            store
                .read(&id)
                .await
                .with_context(|| format!("failed to load session {}", id))?;
            store.path_for(&id)
        }
        (None, None) => bail!("pass a session JSON file, --session-id, or --list"),
    };

    let session = report::write_report(&json_path, &args.output)
        .with_context(|| format!("failed to render {}", json_path.display()))?;

    println!(
        "Report for session {} ({} iterations, {} analyses) generated at: {}",
        session.session_id,
        session.iterations.len(),
        session.analysis_count(),
        args.output.display()
    );
    Ok(())
}
