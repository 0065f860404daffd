//! # Recall CLI (`recall`)
//!
//! The `recall` binary is the primary interface for the service. It provides
//! commands for database initialization, document ingest, querying, and
//! starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database and schema |
//! | `recall add <file>` | Chunk, embed, and store a document |
//! | `recall query "<q>"` | Full RAG query: retrieval plus generated answer |
//! | `recall search "<q>"` | Pure retrieval, no answer generation |
//! | `recall collections …` | Create, list, inspect, and delete collections |
//! | `recall documents …` | List and delete documents |
//! | `recall serve` | Start the HTTP API server |

mod chunker;
mod config;
mod embedding;
mod engine;
mod error;
mod llm;
mod models;
mod rerank;
mod server;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::embedding::{shared_http_client, EmbeddingClient, HttpEmbeddingBackend};
use crate::engine::RagEngine;
use crate::llm::HttpChatBackend;
use crate::models::{AddDocumentRequest, QueryRequest};
use crate::store::VectorStore;

/// Recall — a local-first retrieval-augmented generation service.
#[derive(Parser)]
#[command(
    name = "recall",
    about = "Recall — a local-first retrieval-augmented generation service",
    version,
    long_about = "Recall ingests documents, segments them with an adaptive chunker, embeds \
    the chunks via an OpenAI-compatible endpoint, stores them in SQLite + sqlite-vec, and \
    answers natural-language queries with retrieval, re-ranking, and optional answer generation."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the relational tables. The
    /// vector table is created lazily on first ingest, once the embedding
    /// dimension is known. Idempotent.
    Init,

    /// Chunk, embed, and store a document.
    Add {
        /// Path to the text file to ingest.
        file: PathBuf,

        /// Target collection (created if missing).
        #[arg(long, short = 'c')]
        collection: String,

        /// Human label for the document. Defaults to the file name.
        #[arg(long)]
        source: Option<String>,

        /// Free-form document type tag (e.g. resume, article).
        #[arg(long, default_value = "")]
        doc_type: String,
    },

    /// Full RAG query: retrieve relevant chunks and generate an answer.
    Query {
        /// The natural-language question.
        query: String,

        /// Collection to search.
        #[arg(long, short = 'c')]
        collection: String,

        /// Number of chunks to retrieve. Defaults to the configured top-k.
        #[arg(long)]
        top_k: Option<usize>,

        /// Apply the heuristic re-ranking stack.
        #[arg(long)]
        rerank: bool,

        /// Include parent chunks of each hit at a score discount.
        #[arg(long)]
        parents: bool,

        /// Expand the query with dictionary synonyms before embedding.
        #[arg(long)]
        expand: bool,

        /// Drop chunks below this similarity (0 disables).
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,
    },

    /// Pure retrieval: relevant chunks and context, no answer generation.
    Search {
        /// The search query.
        query: String,

        /// Collection to search.
        #[arg(long, short = 'c')]
        collection: String,

        /// Number of chunks to retrieve. Defaults to the configured top-k.
        #[arg(long)]
        top_k: Option<usize>,

        /// Drop chunks below this similarity (0 disables).
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,
    },

    /// Manage collections.
    Collections {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Manage documents.
    Documents {
        #[command(subcommand)]
        action: DocumentAction,
    },

    /// Start the HTTP API server.
    Serve,
}

#[derive(Subcommand)]
enum CollectionAction {
    /// Create a collection. Idempotent.
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List collections with document and chunk counts.
    List,
    /// Show statistics for a collection.
    Stats { name: String },
    /// Delete a collection and everything it owns.
    Delete { name: String },
    /// Delete every document in a collection, keeping the collection.
    Clear { name: String },
}

#[derive(Subcommand)]
enum DocumentAction {
    /// List documents in a collection.
    List {
        #[arg(long, short = 'c')]
        collection: String,
    },
    /// Delete a document, its chunks, and their vectors.
    Delete { id: String },
}

async fn build_engine(cfg: &config::Config) -> Result<Arc<RagEngine>> {
    let store = Arc::new(VectorStore::open(&cfg.db.path).await?);
    let client = shared_http_client(&cfg.services)?;
    let embedder = EmbeddingClient::with_max_retries(
        Box::new(HttpEmbeddingBackend::new(client.clone(), &cfg.services)),
        cfg.services.max_retries,
    );
    let chat = Box::new(HttpChatBackend::new(client, &cfg.services));
    Ok(Arc::new(RagEngine::new(
        store,
        embedder,
        chat,
        cfg.retrieval.default_top_k,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            VectorStore::open(&cfg.db.path).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }

        Commands::Add {
            file,
            collection,
            source,
            doc_type,
        } => {
            let engine = build_engine(&cfg).await?;
            engine.store().create_collection(&collection, "").await?;

            let source = source.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            });

            let req = AddDocumentRequest {
                collection_name: collection.clone(),
                file_path: Some(file.to_string_lossy().to_string()),
                content: None,
                source,
                doc_type,
                chunking_config: None,
            };
            let doc = engine.add_document(&req).await?;

            println!("add {}", doc.source);
            println!("  document id: {}", doc.id);
            println!("  chunks: {}", doc.chunks.len());
            if let Some(strategy) = doc.metadata.get("chunking_strategy").and_then(|v| v.as_str()) {
                println!("  strategy: {strategy}");
            }
            println!("ok");
        }

        Commands::Query {
            query,
            collection,
            top_k,
            rerank,
            parents,
            expand,
            threshold,
        } => {
            let engine = build_engine(&cfg).await?;
            let req = QueryRequest {
                collection_name: collection,
                query,
                top_k,
                reranker_enabled: rerank,
                include_parents: parents,
                query_expansion: expand,
                semantic_threshold: threshold,
                metadata_filters: Default::default(),
            };
            let response = engine.query(&req).await?;

            println!("{}", response.answer);
            println!();
            for (i, (chunk, score)) in response
                .chunks
                .iter()
                .zip(response.similarity_scores.iter())
                .enumerate()
            {
                println!(
                    "{}. [{:.3}] {} ({})",
                    i + 1,
                    score,
                    chunk.section,
                    chunk.chunk_type
                );
            }
            println!();
            println!("processed in {:.3}s", response.processing_time);
        }

        Commands::Search {
            query,
            collection,
            top_k,
            threshold,
        } => {
            let engine = build_engine(&cfg).await?;
            let req = QueryRequest {
                collection_name: collection,
                query,
                top_k,
                semantic_threshold: threshold,
                ..Default::default()
            };
            let response = engine.retrieve(&req).await?;

            if response.chunks.is_empty() {
                println!("No results.");
            } else {
                for (i, (chunk, score)) in response
                    .chunks
                    .iter()
                    .zip(response.similarity_scores.iter())
                    .enumerate()
                {
                    println!("{}. [{:.3}] {} ({})", i + 1, score, chunk.section, chunk.chunk_type);
                    let excerpt: String = chunk.text.chars().take(160).collect();
                    println!("    {}", excerpt.replace('\n', " "));
                    println!("    id: {}", chunk.id);
                }
            }
            println!();
            println!("processed in {:.3}s", response.processing_time);
        }

        Commands::Collections { action } => {
            let store = VectorStore::open(&cfg.db.path).await?;
            match action {
                CollectionAction::Create { name, description } => {
                    store.create_collection(&name, &description).await?;
                    println!("collection '{name}' created");
                }
                CollectionAction::List => {
                    let collections = store.list_collections().await?;
                    if collections.is_empty() {
                        println!("No collections.");
                    }
                    for info in collections {
                        println!(
                            "{}  ({} documents, {} chunks)",
                            info.name, info.document_count, info.chunk_count
                        );
                        if !info.description.is_empty() {
                            println!("    {}", info.description);
                        }
                    }
                }
                CollectionAction::Stats { name } => {
                    let stats = store.collection_stats(&name).await?;
                    println!("collection {}", stats.name);
                    println!("  documents: {}", stats.document_count);
                    println!("  chunks: {}", stats.chunk_count);
                    for (kind, count) in &stats.chunk_types {
                        println!("    {kind}: {count}");
                    }
                }
                CollectionAction::Delete { name } => {
                    store.delete_collection(&name).await?;
                    println!("collection '{name}' deleted");
                }
                CollectionAction::Clear { name } => {
                    let deleted = store.delete_all_documents(&name).await?;
                    println!("deleted {deleted} documents from '{name}'");
                }
            }
        }

        Commands::Documents { action } => {
            let store = VectorStore::open(&cfg.db.path).await?;
            match action {
                DocumentAction::List { collection } => {
                    let documents = store.list_documents(&collection).await?;
                    if documents.is_empty() {
                        println!("No documents.");
                    }
                    for info in documents {
                        println!("{}  {} chunks", info.id, info.chunk_count);
                        println!("    source: {}", info.source);
                        if !info.doc_type.is_empty() {
                            println!("    type: {}", info.doc_type);
                        }
                    }
                }
                DocumentAction::Delete { id } => {
                    store.delete_document(&id).await?;
                    println!("document '{id}' deleted");
                }
            }
        }

        Commands::Serve => {
            let engine = build_engine(&cfg).await?;
            server::run_server(engine, &cfg.server.bind).await?;
        }
    }

    Ok(())
}
