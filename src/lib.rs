//! # Recall
//!
//! **A local-first retrieval-augmented generation service.**
//!
//! Recall ingests textual documents, segments them with an adaptive chunker,
//! embeds the chunks through an OpenAI-compatible embedding endpoint, stores
//! them in SQLite + sqlite-vec, and answers natural-language queries by
//! retrieving, filtering, and re-ranking the most relevant chunks —
//! optionally composing an answer via an external chat-completion model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────────┐
//! │ Documents │──▶│ Adaptive      │──▶│  SQLite +   │
//! │ (text)    │   │ Chunker+Embed │   │  sqlite-vec │
//! └──────────┘   └───────────────┘   └──────┬──────┘
//!                                           │
//!                           ┌───────────────┤
//!                           ▼               ▼
//!                      ┌─────────┐    ┌──────────┐
//!                      │   CLI   │    │   HTTP   │
//!                      │ (recall)│    │ (axum)   │
//!                      └─────────┘    └──────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. The **adaptive chunker** ([`chunker`]) classifies a document by size
//!    and structure, picks a segmentation strategy, and emits ordered chunks
//!    with optional parent/child hierarchy and keyword annotations.
//! 2. The **embedding client** ([`embedding`]) batches chunk texts against
//!    the external embedding endpoint, halving oversized batches and
//!    substituting placeholder vectors for texts the upstream cannot take.
//! 3. The **vector store** ([`store`]) persists collections, documents,
//!    chunks, and dimension-typed vectors, and serves filtered kNN plus
//!    parent-chain lookups.
//! 4. The **query engine** ([`engine`]) expands the query, retrieves,
//!    applies the similarity threshold, augments with parents, re-ranks
//!    ([`rerank`]), and delegates answer generation to the chat backend
//!    ([`llm`]).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: `Document`, `Chunk`, request/response shapes |
//! | [`error`] | The `RagError` taxonomy |
//! | [`chunker`] | Adaptive document analysis and segmentation |
//! | [`embedding`] | Embedding backend trait, HTTP client, adaptive batching |
//! | [`llm`] | Chat-completion backend trait and HTTP client |
//! | [`store`] | SQLite + sqlite-vec storage layer |
//! | [`rerank`] | Composable post-retrieval boost heuristics |
//! | [`engine`] | The retrieval-and-answer orchestrator |
//! | [`server`] | JSON HTTP API (Axum) with CORS |

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod llm;
pub mod models;
pub mod rerank;
pub mod server;
pub mod store;
