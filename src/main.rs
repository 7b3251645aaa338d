//! # memidx
//!
//! Command-line interface for the memory indexer.
//!
//! ## Usage
//!
//! ```bash
//! memidx --config ./config/memidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `memidx init` | Create the SQLite database and schema |
//! | `memidx index [paths]` | Index files, or scan `[corpus]` when no paths are given |
//! | `memidx search "<query>"` | Lexical, vector, or hybrid search |
//! | `memidx recent` | Chunks indexed in the last N days |
//! | `memidx get <id>` | One chunk by id |
//! | `memidx show <path>` | A tracked file and its chunks |
//! | `memidx files` | All tracked files |
//! | `memidx remove <path>` | Drop a file from the index |
//! | `memidx stats` | Index summary |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use memory_indexer::search::SearchOptions;
use memory_indexer::{config, get, ingest, logging, migrate, search, stats};
use memory_indexer_core::models::DocumentClass;
use memory_indexer_core::search::SearchMode;

/// Local semantic memory indexer.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/memidx.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "memidx", about = "Index markdown notes and search them", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/memidx.toml")]
    config: PathBuf,

    /// Enable debug logging on stderr (overridden by MEMIDX_LOG / RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index files.
    ///
    /// With no paths, scans `[corpus].root` using its include/exclude globs.
    /// Directories given explicitly are walked the same way.
    Index {
        /// Files or directories to index.
        paths: Vec<PathBuf>,

        /// Re-index even when the content digest is unchanged.
        #[arg(long)]
        force: bool,

        /// Remove tracked files under the corpus root that no longer exist.
        #[arg(long)]
        prune: bool,
    },

    /// Search indexed chunks.
    Search {
        /// The search query string.
        query: String,

        /// Search mode: `lexical`, `vector`, or `hybrid`.
        #[arg(long, default_value = "hybrid")]
        mode: SearchMode,

        /// Maximum number of results (defaults to `retrieval.default_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Keep only results of this class (soul, memory, user, daily, topic, other).
        #[arg(long)]
        class: Option<DocumentClass>,

        /// Override `retrieval.lexical_weight`.
        #[arg(long)]
        lexical_weight: Option<f64>,

        /// Override `retrieval.vector_weight`.
        #[arg(long)]
        vector_weight: Option<f64>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List chunks indexed within the last N days, newest first.
    Recent {
        #[arg(long, default_value_t = 2)]
        days: u32,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print one chunk by id.
    Get {
        id: String,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a tracked file and its chunks.
    Show { path: String },

    /// List tracked files.
    Files,

    /// Remove a file's chunks from the index.
    Remove { path: String },

    /// Show index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index {
            paths,
            force,
            prune,
        } => {
            ingest::run_index(&cfg, paths, force, prune).await?;
        }
        Commands::Search {
            query,
            mode,
            top_k,
            class,
            lexical_weight,
            vector_weight,
            json,
        } => {
            let opts = SearchOptions {
                mode,
                top_k,
                class,
                lexical_weight,
                vector_weight,
            };
            search::run_search(&cfg, &query, &opts, json).await?;
        }
        Commands::Recent { days, json } => {
            search::run_recent(&cfg, days, json).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Show { path } => {
            get::run_show(&cfg, &path).await?;
        }
        Commands::Files => {
            get::run_files(&cfg).await?;
        }
        Commands::Remove { path } => {
            ingest::run_remove(&cfg, &path).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
