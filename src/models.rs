//! Core data models used throughout Recall.
//!
//! These types represent the documents, chunks, and query results that flow
//! through the ingestion and retrieval pipeline. The data lifecycle is:
//!
//! ```text
//! content → chunker::process() → Document + Chunk*
//!                                      ↓
//!                            embedding client → vectors
//!                                      ↓
//!                             VectorStore (SQLite + vec0)
//!                                      ↓
//!                             engine::query() → QueryResponse
//! ```
//!
//! # Type Relationships
//!
//! - A **[`Document`]** is an ingested text artifact owned by a collection.
//! - A **[`Chunk`]** is the smallest retrievable unit: text plus structural
//!   tags, optional parent/child hierarchy links, extracted keywords, and an
//!   embedding held separately from the row.
//! - **[`QueryRequest`]** / **[`QueryResponse`]** are the contract of the
//!   query engine; [`RetrievalResponse`] is the pure-retrieval variant used
//!   by external-LLM integrations.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Arbitrary key→value metadata attached to documents and chunks.
///
/// Persisted as a JSON column; filter coercion is limited to the keys the
/// store understands (`chunk_type`, `section`, `doc_type`).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// An ingested text document together with its chunks.
///
/// Documents are immutable after ingest; re-ingesting the same id replaces
/// the document and all of its chunks wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// UUID v4 primary key.
    pub id: String,
    /// Full original text.
    pub content: String,
    /// Optional human label (e.g. a filename).
    #[serde(default)]
    pub source: String,
    /// Free-form type tag used for strategy hints and filtering
    /// (e.g. `"resume"`, `"article"`).
    #[serde(default)]
    pub doc_type: String,
    /// Document-level metadata. The chunker records `chunking_strategy`,
    /// `document_length`, `document_category`, `structure_type`, and
    /// `chunk_count` here.
    #[serde(default)]
    pub metadata: Metadata,
    /// Ordered chunk list. Skipped in JSON responses that carry chunks
    /// separately.
    #[serde(skip)]
    pub chunks: Vec<Chunk>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// The smallest retrievable unit of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// UUID v4 primary key.
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// Chunk text, non-empty and trimmed.
    pub text: String,
    /// Dense embedding vector; populated by the embedding client between
    /// chunking and storage, never serialized in API responses.
    #[serde(skip)]
    pub embedding: Vec<f32>,

    /// Parent chunk id, when this chunk is part of a hierarchy. The parent
    /// relation forms a forest: at most one parent, no cycles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_chunk_id: Option<String>,
    /// Ids of finer-grained chunks derived from this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_chunk_ids: Vec<String>,

    /// Section tag derived from detected headings (e.g. `"EXPERIENCE"`).
    #[serde(default)]
    pub section: String,
    /// Finer structural tag under `section`.
    #[serde(default)]
    pub subsection: String,
    /// What kind of unit this chunk is.
    pub chunk_type: ChunkType,

    /// Best-effort character offset into the original content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_pos: Option<usize>,
    /// Best-effort end offset; `end_pos > start_pos` when both are set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_pos: Option<usize>,
    /// Sequential index within the document.
    pub chunk_index: usize,

    /// Extracted keywords, most frequent first, capped at ten.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Free-form chunk metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Retrieval confidence in `[0, 1]`; defaults to 0.
    #[serde(default)]
    pub confidence: f64,
}

impl Chunk {
    /// Creates a chunk with the given text and type, trimming the text and
    /// assigning a fresh UUID. Remaining fields start empty.
    pub fn new(document_id: &str, text: &str, chunk_type: ChunkType, chunk_index: usize) -> Self {
        Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            text: text.trim().to_string(),
            embedding: Vec::new(),
            parent_chunk_id: None,
            child_chunk_ids: Vec::new(),
            section: String::new(),
            subsection: String::new(),
            chunk_type,
            start_pos: None,
            end_pos: None,
            chunk_index,
            keywords: Vec::new(),
            metadata: Metadata::new(),
            confidence: 0.0,
        }
    }
}

/// Classification of a chunk by the structure it was carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// An entire very-small document kept as one chunk.
    Document,
    /// A detected section that fit within the size bounds.
    Section,
    /// Part of a section that had to be split by paragraphs.
    SectionPart,
    /// Greedily grouped paragraphs from a very small document.
    ParagraphGroup,
    /// Paragraph-aware greedy grouping of unstructured text.
    Semantic,
    /// An overlapping window of sentences.
    SentenceWindow,
    /// A sliding fixed-size window.
    FixedSize,
    /// A coarse chunk synthesized over a group of finer chunks.
    Parent,
    /// A fine chunk carved out of a parent.
    Child,
    /// A single job entry in a resume-shaped document.
    JobEntry,
    /// Chunks ingested through the pre-hierarchy compatibility path.
    Legacy,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Document => "document",
            ChunkType::Section => "section",
            ChunkType::SectionPart => "section_part",
            ChunkType::ParagraphGroup => "paragraph_group",
            ChunkType::Semantic => "semantic",
            ChunkType::SentenceWindow => "sentence_window",
            ChunkType::FixedSize => "fixed_size",
            ChunkType::Parent => "parent",
            ChunkType::Child => "child",
            ChunkType::JobEntry => "job_entry",
            ChunkType::Legacy => "legacy",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = std::convert::Infallible;

    /// Tags persisted before the current taxonomy parse as [`ChunkType::Legacy`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "document" => ChunkType::Document,
            "section" => ChunkType::Section,
            "section_part" => ChunkType::SectionPart,
            "paragraph_group" => ChunkType::ParagraphGroup,
            "semantic" => ChunkType::Semantic,
            "sentence_window" => ChunkType::SentenceWindow,
            "fixed_size" => ChunkType::FixedSize,
            "parent" => ChunkType::Parent,
            "child" => ChunkType::Child,
            "job_entry" => ChunkType::JobEntry,
            _ => ChunkType::Legacy,
        })
    }
}

/// Segmentation strategies the adaptive chunker can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    FixedSize,
    Semantic,
    Structural,
    SentenceWindow,
    ParentDocument,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::FixedSize => "fixed_size",
            ChunkingStrategy::Semantic => "semantic",
            ChunkingStrategy::Structural => "structural",
            ChunkingStrategy::SentenceWindow => "sentence_window",
            ChunkingStrategy::ParentDocument => "parent_document",
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-supplied chunking parameters.
///
/// All fields are optional; unset fields are filled in by the adaptive
/// resolution step based on the document's size class and structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ChunkingStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentence_window_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_chunk_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_chunk_size: Option<usize>,
    /// Keep paragraphs intact where the strategy allows. Defaults to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_paragraphs: Option<bool>,
    /// Annotate chunks with extracted keywords. Defaults to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_keywords: Option<bool>,
}

/// Request body for adding a document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddDocumentRequest {
    pub collection_name: String,
    /// Server-side file to read. Mutually exclusive with `content`.
    #[serde(default)]
    pub file_path: Option<String>,
    /// Direct content submission.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub doc_type: String,
    #[serde(default)]
    pub chunking_config: Option<ChunkingConfig>,
}

/// Request body for querying the RAG system.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub collection_name: String,
    pub query: String,
    /// Number of chunks to return after re-ranking. Defaults to the
    /// configured `default_top_k`.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Apply the heuristic re-ranking stack.
    #[serde(default)]
    pub reranker_enabled: bool,
    /// Append parent-chain chunks at a 0.9 score discount.
    #[serde(default)]
    pub include_parents: bool,
    /// Expand the query with dictionary synonyms before embedding.
    #[serde(default)]
    pub query_expansion: bool,
    /// Drop retrieved chunks whose similarity falls below this value.
    #[serde(default)]
    pub semantic_threshold: f64,
    /// Equality filters on `chunk_type`, `section`, or `doc_type`.
    /// Unknown keys are ignored.
    #[serde(default)]
    pub metadata_filters: HashMap<String, String>,
}

/// The query engine's answer.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retrieved_context: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<Chunk>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub similarity_scores: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranked_scores: Option<Vec<f64>>,
    /// Wall-clock processing time in seconds.
    pub processing_time: f64,
    /// Whether metadata filters were applied to the search.
    pub metadata_used: bool,
}

/// Result of the pure-retrieval variant: everything an external LLM
/// integration needs, with no answer generation.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub query: String,
    pub collection_name: String,
    pub chunks_found: usize,
    pub chunks: Vec<Chunk>,
    pub similarity_scores: Vec<f64>,
    /// Pre-joined context string in `[Context i - Section]` block format.
    pub context: String,
    pub processing_time: f64,
}

/// Summary row returned by `list_collections`.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub document_count: i64,
    pub chunk_count: i64,
}

/// Summary row returned by `list_documents`.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub id: String,
    pub source: String,
    pub doc_type: String,
    pub created_at: String,
    pub chunk_count: i64,
}

/// Aggregates returned by `collection_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub document_count: i64,
    pub chunk_count: i64,
    /// Chunk count per chunk type tag.
    pub chunk_types: HashMap<String, i64>,
    /// Document count per doc_type tag.
    pub document_types: HashMap<String, i64>,
}
