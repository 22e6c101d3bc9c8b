mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mnemograph::config::MnemographConfig;

#[derive(Parser)]
#[command(
    name = "mnemograph",
    version,
    about = "Hybrid vector-graph memory store for AI agents"
)]
struct Cli {
    /// Config file (defaults to ~/.mnemograph/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the config file and MNEMOGRAPH_DB
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio unless --http or server.transport = "http")
    Serve {
        /// Serve Streamable HTTP at server.host:server.port instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Store a memory. Reads stdin when TEXT is omitted
    Remember {
        text: Option<String>,
        #[arg(long)]
        importance: Option<f64>,
        /// episodic or semantic
        #[arg(long)]
        tier: Option<String>,
    },
    /// Retrieve memories relevant to a query
    Recall {
        query: String,
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// Soft-delete a memory
    Forget { id: String },
    /// Create a typed edge between two memories
    Relate {
        source_id: String,
        target_id: String,
        #[arg(long, default_value = "relates_to")]
        relation: String,
        #[arg(long)]
        weight: Option<f64>,
    },
    /// Re-run auto-linking for an existing memory
    Link { id: String },
    /// Run one reflection cycle: prune, deduplicate, promote, clean orphans
    Reflect {
        #[arg(long)]
        prune_days: Option<u64>,
        #[arg(long)]
        similarity_threshold: Option<f64>,
    },
    /// List memories chronologically, optionally for one entity
    Timeline {
        #[arg(long)]
        entity: Option<String>,
        /// RFC 3339 timestamp or YYYY-MM-DD
        #[arg(long)]
        since: Option<String>,
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// Show store statistics
    Stats,
    /// Import a text file as chunked memories ("-" for stdin)
    Import {
        file: PathBuf,
        #[arg(long)]
        tier: Option<String>,
        /// Treat the input as a JSON document produced by `export`
        #[arg(long)]
        from_export: bool,
    },
    /// Export live memories and edges as JSON
    Export {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Permanently delete memories forgotten more than N days ago
    Purge {
        #[arg(long, default_value_t = 30)]
        older_than_days: u64,
        #[arg(long)]
        confirm: bool,
    },
    /// Run database diagnostics
    Doctor,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to the configured cache directory
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MnemographConfig::load_from(path)?,
        None => MnemographConfig::load()?,
    };
    if let Some(db) = &cli.db {
        config.storage.db_path = db.to_string_lossy().into_owned();
    }

    // Log to stderr so stdout stays clean for MCP JSON-RPC and command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http } => {
            if http || config.server.transport == "http" {
                mnemograph::server::serve_http(config).await?;
            } else {
                mnemograph::server::serve_stdio(config).await?;
            }
        }
        Command::Remember { text, importance, tier } => {
            let text = match text {
                Some(text) => text,
                None => cli::read_input(std::path::Path::new("-"))?,
            };
            cli::memory::remember(&config, text, importance, tier).await?;
        }
        Command::Recall { query, limit } => cli::memory::recall(&config, query, limit).await?,
        Command::Forget { id } => cli::memory::forget(&config, id).await?,
        Command::Relate { source_id, target_id, relation, weight } => {
            cli::memory::relate(&config, source_id, target_id, relation, weight).await?;
        }
        Command::Link { id } => cli::memory::link(&config, id).await?,
        Command::Reflect { prune_days, similarity_threshold } => {
            cli::maintenance::reflect(&config, prune_days, similarity_threshold).await?;
        }
        Command::Timeline { entity, since, limit } => {
            cli::memory::timeline(&config, entity, since, limit).await?;
        }
        Command::Stats => cli::stats::stats(&config).await?,
        Command::Import { file, tier, from_export } => {
            cli::import::import(&config, &file, tier, from_export).await?;
        }
        Command::Export { output } => cli::export::export(&config, output.as_deref()).await?,
        Command::Purge { older_than_days, confirm } => {
            cli::maintenance::purge(&config, older_than_days, confirm).await?;
        }
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
    }

    Ok(())
}
