//! # parro CLI
//!
//! Operational entry point for the parish information backend. The
//! binary covers database setup, document ingestion into the vector
//! index, retrieval checks, push notifications, and the app API server.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `parro init` | Create the SQLite catalog and run schema migrations |
//! | `parro sources` | Show external subsystem configuration status |
//! | `parro sync filesystem` | Ingest parish documents (md/txt/pdf) |
//! | `parro search "<query>"` | Semantic search over indexed documents |
//! | `parro get <id>` | Print a cataloged document and its chunks |
//! | `parro embed pending` | Push missing or stale embeddings |
//! | `parro embed rebuild` | Clear and re-push every embedding |
//! | `parro index stats` | Catalog and remote index statistics |
//! | `parro index clear` | Delete every vector from the remote index |
//! | `parro notify send` | Send a push notification to all devices |
//! | `parro serve` | Start the app HTTP API |
//!
//! All commands accept `--config` (default `./config/parro.toml`).

mod cache;
mod calendar;
mod chat;
mod chunk;
mod config;
mod connector_fs;
mod daily;
mod db;
mod embed_cmd;
mod embedding;
mod extract;
mod get;
mod index;
mod ingest;
mod mail;
mod metadata;
mod migrate;
mod models;
mod notify;
mod ratelimit;
mod resources;
mod retrieval;
mod server;
mod sources;
mod stats;
mod supabase;
mod tz;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// parro — parish information backend: document ingestion, RAG
/// retrieval, and the app HTTP API.
#[derive(Parser)]
#[command(
    name = "parro",
    about = "Parish information backend — ingestion, retrieval, and the app API",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/parro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local catalog schema. Idempotent.
    Init,

    /// Show configuration status of every external subsystem.
    Sources,

    /// Ingest documents from a connector into the catalog and index.
    Sync {
        /// Connector name (currently `filesystem`).
        connector: String,

        /// Ignore checkpoint — reingest all items from scratch.
        #[arg(long)]
        full: bool,

        /// Show item and chunk counts without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Only process items modified on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Only process items modified on or before this date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,

        /// Maximum number of items to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Semantic search over the parish document index.
    Search {
        /// The search query string.
        query: String,

        /// Pastoral category filter (e.g. `sacramentos`, `jovenes`).
        #[arg(long)]
        categoria: Option<String>,

        /// Candidates fetched per query variant.
        #[arg(long)]
        top_k: Option<usize>,

        /// Similarity threshold override (e.g. 0.40).
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Print a cataloged document and its chunks.
    Get {
        /// Document UUID.
        id: String,
    },

    /// Manage embedding vectors in the remote index.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Inspect or clear the remote vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Push notifications.
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },

    /// Start the app HTTP API server.
    Serve,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed and push chunks that are missing or stale.
    Pending {
        /// Maximum number of chunks to process in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without embedding anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear the index and re-push every chunk. Use after changing the
    /// embedding model or chunking settings.
    Rebuild {
        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Catalog and remote index statistics.
    Stats,

    /// Delete every vector from the remote index.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum NotifyAction {
    /// Send a push notification to every registered device.
    Send {
        #[arg(long)]
        title: String,

        #[arg(long)]
        body: String,

        /// Target URL opened when the notification is tapped.
        #[arg(long)]
        url: Option<String>,
    },
}

fn init_tracing(verbose_default: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbose_default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Serve) {
        init_tracing("parro=info,tower_http=info");
    } else {
        init_tracing("warn");
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Catalog initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Sync {
            connector,
            full,
            dry_run,
            since,
            until,
            limit,
        } => {
            ingest::run_sync(&cfg, &connector, full, dry_run, since, until, limit).await?;
        }
        Commands::Search {
            query,
            categoria,
            top_k,
            threshold,
        } => {
            retrieval::run_search(&cfg, &query, categoria, top_k, threshold).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size).await?;
            }
        },
        Commands::Index { action } => match action {
            IndexAction::Stats => {
                stats::run_stats(&cfg).await?;
            }
            IndexAction::Clear { yes } => {
                if !yes {
                    anyhow::bail!("index clear deletes every vector; re-run with --yes to confirm");
                }
                let vector_index = index::create_index(&cfg.index)?;
                let before = vector_index.stats().await?;
                vector_index.clear().await?;
                println!("index clear");
                println!("  vectors before: {}", before.total_vectors);
                println!("  delete request accepted (counts settle asynchronously)");
            }
        },
        Commands::Notify { action } => match action {
            NotifyAction::Send { title, body, url } => {
                let supabase = supabase::SupabaseClient::from_env()
                    .ok_or_else(|| anyhow::anyhow!("SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY not set"))?;
                let fcm = Arc::new(notify::FcmClient::from_env()?);

                let tokens = supabase.push_tokens().await?;
                if tokens.is_empty() {
                    println!("notify send");
                    println!("  no devices registered");
                    return Ok(());
                }

                let total = tokens.len();
                let payload = notify::NotificationPayload {
                    title,
                    body,
                    icon: None,
                    url,
                    badge: None,
                };
                let summary = notify::send_to_all(fcm, tokens, payload).await;

                println!("notify send");
                println!("  devices:    {}", total);
                println!("  successful: {}", summary.successful);
                println!("  failed:     {}", summary.failed);
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
