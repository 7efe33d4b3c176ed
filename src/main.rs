//! # RAG Concierge CLI (`concierge`)
//!
//! ## Usage
//!
//! ```bash
//! concierge --config ./config/concierge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `concierge index` | Build the knowledge index from `[knowledge].docs_root` |
//! | `concierge search "<query>"` | Show the passages retrieval returns for a query |
//! | `concierge serve` | Start the chat HTTP API |
//!
//! Logs go to stderr; set `RUST_LOG` to change the level (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_concierge::{config, ingest, search, server};

/// RAG Concierge: knowledge-base answers plus lead capture over HTTP.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults; environment variables such
/// as `OLLAMA_HOST` and `SMTP_SERVER` override either.
#[derive(Parser)]
#[command(name = "concierge", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/concierge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat HTTP server on `[server].bind`.
    Serve,

    /// Build the knowledge index.
    ///
    /// Reads every matching file under `[knowledge].docs_root`, chunks and
    /// embeds it, and replaces the index at `[knowledge].db_path`.
    Index {
        /// Override the batch size from config (number of texts per embedding call).
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Search the knowledge index.
    Search {
        /// The search query string.
        query: String,

        /// Number of passages to return (defaults to `[knowledge].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Index { batch_size } => {
            ingest::run_index(&cfg, batch_size).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
    }

    Ok(())
}
