//! # Notes Harness CLI (`nh`)
//!
//! The `nh` binary keeps a hosted semantic index in step with a local note
//! corpus. It provides commands for database initialization, incremental
//! sync, search, and inspecting what has been synchronized.
//!
//! ## Usage
//!
//! ```bash
//! nh --config ./config/nh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nh init` | Create the SQLite database and run schema migrations |
//! | `nh sync` | Push new, changed and deleted notes to the remote index |
//! | `nh status` | Tracked notes by state, recent failures |
//! | `nh search "<query>"` | Semantic search with links back to the notes |
//! | `nh resolve <id>` | Print the external locator for one note |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database and create a vector store
//! nh init --create-vector-store
//!
//! # Preview a sync without touching the remote index
//! nh sync --dry-run
//!
//! # Sync, with JSON progress on stderr and a JSON report on stdout
//! nh sync --progress json --json
//!
//! # Search
//! nh search "passport renewal"
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `notes_harness=warn`).

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notes_harness::remote::{OpenAIVectorStore, RemoteSession};
use notes_harness::resolve::resolver_from_config;
use notes_harness::{config, db, ingest, migrate, progress::ProgressMode, search, stats};

/// Notes Harness CLI: incremental sync of a note corpus into a hosted
/// semantic index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/nh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "nh",
    about = "Notes Harness: incremental sync of personal notes into a hosted semantic index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nh.toml")]
    config: PathBuf,

    /// Progress on stderr: `off`, `human` or `json`.
    /// Defaults to `human` when stderr is a terminal, otherwise `off`.
    #[arg(long, global = true)]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and its tables. Idempotent.
    Init {
        /// Also create a remote vector store and remember its id.
        #[arg(long)]
        create_vector_store: bool,

        /// Name for a newly created vector store.
        #[arg(long, default_value = "Apple Notes")]
        name: String,
    },

    /// Reconcile the remote index with the current note corpus.
    ///
    /// Extracts every note, diffs it against the fingerprint store, and
    /// applies only the changes. Ctrl-C stops issuing new batches; notes
    /// already in flight finish and are recorded.
    Sync {
        /// Plan only. Print what would change without calling the remote index.
        #[arg(long)]
        dry_run: bool,

        /// Proceed even when the snapshot would delete most tracked notes.
        #[arg(long)]
        allow_mass_delete: bool,

        /// Only consider the first N notes. Deletions are skipped.
        #[arg(long)]
        limit: Option<usize>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show tracked notes by sync state and list recent failures.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search the remote index.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Resolve a note identifier to a link that opens it.
    Resolve {
        /// Local note identifier (e.g. `x-coredata://…/ICNote/p123`).
        local_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notes_harness=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let progress_mode = match cli.progress.as_deref() {
        None => ProgressMode::default_for_tty(),
        Some(s) => match ProgressMode::parse(s) {
            Some(mode) => mode,
            None => bail!("Unknown progress mode: '{}'. Use off, human, or json.", s),
        },
    };

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init {
            create_vector_store,
            name,
        } => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            if create_vector_store {
                init_vector_store(&cfg, &name).await?;
            }
        }
        Commands::Sync {
            dry_run,
            allow_mass_delete,
            limit,
            json,
        } => {
            ingest::run_sync(&cfg, dry_run, allow_mass_delete, limit, json, progress_mode).await?;
        }
        Commands::Status { json } => {
            stats::run_status(&cfg, json).await?;
        }
        Commands::Search { query, limit, json } => {
            search::run_search(&cfg, &query, limit, json).await?;
        }
        Commands::Resolve { local_id } => {
            let resolver = resolver_from_config(&cfg);
            match resolver.resolve(&local_id).await {
                Some(locator) => println!("{}", locator.url),
                None if !cfg.locator.enabled => {
                    println!("unavailable (set locator.enabled = true to resolve links)")
                }
                None => println!("unavailable"),
            }
        }
    }

    Ok(())
}

/// Create a vector store unless one is already configured or recorded.
async fn init_vector_store(cfg: &config::Config, name: &str) -> Result<()> {
    let pool = db::connect(cfg).await?;
    if let Some(existing) = ingest::configured_vector_store(cfg, &pool).await? {
        println!("Vector store already configured: {}", existing);
        pool.close().await;
        return Ok(());
    }

    let session = RemoteSession::from_config(&cfg.remote)?;
    let id = OpenAIVectorStore::create_vector_store(&session, name).await?;
    migrate::set_setting(&pool, ingest::VECTOR_STORE_SETTING, &id).await?;
    println!("Created vector store: {}", id);
    pool.close().await;
    Ok(())
}
