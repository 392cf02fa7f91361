//! # Repository mirror CLI (`mirror`)
//!
//! Keeps a stored mirror of repository file trees in sync with push and
//! repository webhooks.
//!
//! ## Usage
//!
//! ```bash
//! mirror --config ./config/mirror.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mirror init` | Create the SQLite database and schema |
//! | `mirror serve` | Accept webhooks and process them on the job queue |
//! | `mirror replay --event push body.json` | Process a saved webhook body in the foreground |
//! | `mirror files <repository-id>` | List the file records of a repository |
//! | `mirror commits <repository-id>` | List the ingested commits of a repository |
//!
//! Log verbosity follows `RUST_LOG` (default `repo_mirror=info,tower_http=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use repo_mirror::app::App;
use repo_mirror::queue::{JobQueue, JobSink};
use repo_mirror::server::{build_router, run_server, AppState};
use repo_mirror::{config, inspect, migrate, replay};

/// Repository mirror: webhook-driven file tree synchronization.
#[derive(Parser)]
#[command(name = "mirror", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mirror.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the webhook server and the job worker.
    ///
    /// On ctrl-c the server stops accepting deliveries and the worker
    /// finishes the jobs already queued before the process exits.
    Serve,

    /// Classify a saved webhook body and process it synchronously.
    Replay {
        /// Webhook event name, as sent in `X-GitHub-Event`.
        #[arg(long)]
        event: String,

        /// File containing the JSON body.
        file: PathBuf,
    },

    /// List file records for a repository.
    Files {
        repository_id: String,
    },

    /// List ingested commits for a repository, oldest first.
    Commits {
        repository_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("repo_mirror=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => serve(&cfg).await?,
        Commands::Replay { event, file } => {
            replay::run_replay(&cfg, &event, &file).await?;
        }
        Commands::Files { repository_id } => {
            inspect::list_files(&cfg, &repository_id).await?;
        }
        Commands::Commits { repository_id } => {
            inspect::list_commits(&cfg, &repository_id).await?;
        }
    }

    Ok(())
}

async fn serve(cfg: &config::Config) -> anyhow::Result<()> {
    let app = App::from_config(cfg).await?;
    let (queue, worker) = JobQueue::start(app.dispatcher.clone(), &cfg.queue);
    let queue: Arc<dyn JobSink> = Arc::new(queue);

    let router = build_router(AppState {
        queue: queue.clone(),
    });
    run_server(&cfg.server.bind, router).await?;

    // The router and its senders are gone once serve returns
    let pending = queue.stats().pending;
    drop(queue);
    info!(pending, "draining job queue");
    worker.join().await?;
    info!("stopped");
    Ok(())
}
