//! # ragsync CLI
//!
//! The `ragsync` binary drives the pipeline: collect resources into the
//! catalog, synchronize the vector index with it, query it, and serve all
//! of that over HTTP with a background sync loop.
//!
//! ## Usage
//!
//! ```bash
//! ragsync --config ./config/ragsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragsync init` | Create the data directory, catalogs, and index schema |
//! | `ragsync collect` | Scan the filesystem collector and persist resources |
//! | `ragsync catalog` | List catalogued hashes |
//! | `ragsync remove <hash>` | Remove a resource from the catalog |
//! | `ragsync sync` | Run one synchronization pass |
//! | `ragsync search "<query>"` | Top-k retrieval |
//! | `ragsync stats` | Catalog vs. index counts |
//! | `ragsync serve` | HTTP API plus polling synchronizer |
//!
//! ## Examples
//!
//! ```bash
//! ragsync collect --root ./course-notes
//! ragsync sync
//! ragsync search "magnetic field of coils" --k 3 --hybrid
//! ragsync serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ragsync::{catalog_cmd, config, logging, retrieve, server, stats, sync_cmd};

/// ragsync: hash-keyed resource catalog, vector index synchronizer, and
/// hybrid retriever.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ragsync",
    about = "Keep a vector index in sync with a hash-keyed resource catalog and query it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, empty catalogs, and the index schema.
    ///
    /// Idempotent.
    Init,

    /// Scan the filesystem collector and persist every resource found.
    ///
    /// Resources already catalogued under the same hash are rewritten in
    /// place; nothing is indexed until the next sync.
    Collect {
        /// Scan this directory instead of `[collectors.filesystem].root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// List catalogued hashes and their content files.
    Catalog,

    /// Remove a resource from the catalog. Its chunks leave the index on
    /// the next sync.
    Remove {
        /// Resource hash.
        hash: String,
    },

    /// Run one synchronization pass between the catalog and the index.
    Sync {
        /// Show what would be added and removed without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Run configured collectors before the pass.
        #[arg(long)]
        collect: bool,
    },

    /// Retrieve the top-k chunks for a query.
    Search {
        /// The query text.
        query: String,

        /// Number of results (defaults to `[retrieval].k`).
        #[arg(long)]
        k: Option<usize>,

        /// Rank with BM25 + semantic scores, overriding `[retrieval].hybrid`.
        #[arg(long, conflicts_with = "semantic")]
        hybrid: bool,

        /// Rank by semantic similarity only, overriding `[retrieval].hybrid`.
        #[arg(long)]
        semantic: bool,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show catalog and index counts.
    Stats,

    /// Start the HTTP server and the polling synchronizer.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            catalog_cmd::run_init(&cfg).await?;
        }
        Commands::Collect { root } => {
            catalog_cmd::run_collect(&cfg, root).await?;
        }
        Commands::Catalog => {
            catalog_cmd::run_list(&cfg).await?;
        }
        Commands::Remove { hash } => {
            catalog_cmd::run_remove(&cfg, &hash).await?;
        }
        Commands::Sync { dry_run, collect } => {
            sync_cmd::run_sync(&cfg, dry_run, collect).await?;
        }
        Commands::Search {
            query,
            k,
            hybrid,
            semantic,
            json,
        } => {
            let mode = retrieve::mode_override(hybrid, semantic);
            retrieve::run_search(&cfg, &query, k, mode, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
