//! drivedex CLI entry point

use clap::{Parser, Subcommand};
use drivedex::{
    config::Config,
    embed::create_embedder,
    error::Result,
    ingest::IngestCoordinator,
    retrieve::{ContextResult, Retriever},
    store::QdrantStore,
    sync::IndexSync,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "drivedex")]
#[command(version, about = "Sync cloud drive documents into a vector index", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the configured drive scope and index changed documents
    Ingest {
        /// Run a single pass even when config says loop
        #[arg(long)]
        once: bool,
    },

    /// Retrieve context for a query
    Query {
        /// The search query
        query: String,

        /// Maximum number of hits to consider
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show collection status
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = Arc::new(Config::load(cli.config.as_deref())?);
    config.validate()?;

    let store = Arc::new(QdrantStore::connect(&config)?);
    let embedder: Arc<dyn drivedex::embed::Embedder> =
        Arc::from(create_embedder(&config.embedding)?);

    match cli.command {
        Commands::Ingest { once } => {
            config.validate_scope()?;
            store.ensure_collection().await?;

            let cancel = CancellationToken::new();
            spawn_shutdown_listener(cancel.clone());

            let sync = Arc::new(IndexSync::new(store.clone(), embedder.clone(), &config));
            let coordinator =
                IngestCoordinator::new(config.clone(), store.clone(), sync, cancel.clone());

            if once || config.ingest.mode == "once" {
                let report = coordinator.run_once().await?;
                if cli.json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "processed": report.processed,
                            "indexed": report.indexed,
                            "chunks": report.chunks,
                            "skipped_unchanged": report.skipped_unchanged,
                            "skipped_empty": report.skipped_empty,
                            "skipped_unsupported": report.skipped_unsupported,
                            "skipped_stopped": report.skipped_stopped,
                            "failed": report.failed,
                            "elapsed_secs": report.elapsed_secs,
                        })
                    );
                }
            } else {
                coordinator.run_loop().await?;
            }
        }

        Commands::Query { query, top_k } => {
            let retriever = Retriever::new(store, embedder, config.query.clone());
            let result = retriever.retrieve(&query, top_k).await?;

            match result {
                ContextResult::Empty => {
                    if cli.json {
                        println!("{}", serde_json::json!({ "hits": [], "context": null }));
                    } else {
                        println!("No relevant context found.");
                    }
                }
                ContextResult::Context {
                    text,
                    hits,
                    context_chars,
                } => {
                    if cli.json {
                        let hits: Vec<_> = hits
                            .iter()
                            .map(|h| {
                                serde_json::json!({
                                    "score": h.score,
                                    "source": h.source,
                                    "file_name": h.file_name,
                                    "text": h.text,
                                })
                            })
                            .collect();
                        println!(
                            "{}",
                            serde_json::json!({
                                "hits": hits,
                                "context": text,
                                "context_chars": context_chars,
                            })
                        );
                    } else {
                        println!("{}", text);
                    }
                }
            }
        }

        Commands::Status => {
            let stats = store.get_stats().await?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "collection": stats.collection,
                        "points": stats.points_count,
                        "status": stats.status,
                        "embedding_model": embedder.model_name(),
                        "dimension": embedder.dimension(),
                    })
                );
            } else {
                println!("Collection: {}", stats.collection);
                println!("Points:     {}", stats.points_count);
                println!("Status:     {}", stats.status);
                println!(
                    "Embedding:  {} ({} dims)",
                    embedder.model_name(),
                    embedder.dimension()
                );
            }
        }
    }

    Ok(())
}

/// First Ctrl-C requests a graceful stop; the second exits immediately.
fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing in-flight files");
            cancel.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second interrupt, exiting now");
            std::process::exit(130);
        }
    });
}
