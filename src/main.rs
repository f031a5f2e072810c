//! # Corpus QA CLI (`cqa`)
//!
//! The `cqa` binary drives the engine: database initialization, a corpus
//! overview, and the HTTP server the chat UI talks to.
//!
//! ## Usage
//!
//! ```bash
//! cqa --config ./config/cqa.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cqa init` | Create the SQLite database and run schema migrations |
//! | `cqa stats <tenant>` | Print a tenant's corpus overview |
//! | `cqa serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use corpus_qa::config;
use corpus_qa::embedding::HttpEmbeddingClient;
use corpus_qa::engine::Engine;
use corpus_qa::llm::HttpChatClient;
use corpus_qa::server;
use corpus_qa::stats;
use corpus_qa::store::sqlite::SqliteStore;

/// Corpus QA — retrieval-augmented question answering over private PDF
/// corpora.
#[derive(Parser)]
#[command(
    name = "cqa",
    about = "Corpus QA — grounded question answering over private PDF corpora",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, turns). Idempotent.
    Init,

    /// Print a tenant's corpus overview.
    Stats {
        /// Tenant whose corpus to summarize.
        tenant: String,
    },

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// document and chat endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::connect(&cfg.db.path).await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Stats { tenant } => {
            let store = Arc::new(SqliteStore::connect(&cfg.db.path).await?);
            let embedder = Arc::new(HttpEmbeddingClient::new(&cfg.embedding)?);
            let chat = Arc::new(HttpChatClient::new(&cfg.llm)?);
            let engine = Engine::new(cfg.clone(), store, embedder, chat).await?;
            let corpus = engine.corpus_stats(&tenant).await?;
            print!("{}", stats::render_stats(&tenant, &corpus));
        }
        Commands::Serve => {
            let store = Arc::new(SqliteStore::connect(&cfg.db.path).await?);
            let embedder = Arc::new(HttpEmbeddingClient::new(&cfg.embedding)?);
            let chat = Arc::new(HttpChatClient::new(&cfg.llm)?);
            let bind = cfg.server.bind.clone();
            let engine = Arc::new(Engine::new(cfg, store, embedder, chat).await?);
            server::run_server(engine, &bind).await?;
        }
    }

    Ok(())
}
