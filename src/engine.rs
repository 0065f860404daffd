//! Query engine: the retrieval-and-answer pipeline.
//!
//! One [`RagEngine`] is constructed at startup around the shared store and
//! the two external backends, then passed into request handlers. The full
//! pipeline per query:
//!
//! ```text
//! query → (expansion) → embed → kNN (2×top_k) → threshold filter
//!       → (parent augmentation) → (re-rank) → truncate → context
//!       → chat completion → QueryResponse
//! ```
//!
//! [`retrieve`](RagEngine::retrieve) is the pure-retrieval variant used by
//! external-LLM integrations: same search and threshold path, but no query
//! expansion, no parent augmentation, no re-ranking, and no answer
//! generation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Instant;

use tracing::{debug, warn};

use crate::chunker;
use crate::embedding::EmbeddingClient;
use crate::error::RagError;
use crate::llm::{ChatBackend, ChatMessage};
use crate::models::{
    AddDocumentRequest, Chunk, Document, QueryRequest, QueryResponse, RetrievalResponse,
};
use crate::rerank;
use crate::store::VectorStore;

/// Synonyms appended during query expansion; at most two per matched token.
static EXPANSIONS: LazyLock<HashMap<&'static str, &'static [&'static str]>> =
    LazyLock::new(|| {
        let entries: &[(&str, &[&str])] = &[
            ("experience", &["work", "job", "employment", "career", "role", "position", "background"]),
            ("skills", &["abilities", "competencies", "expertise", "knowledge", "proficiency", "technologies"]),
            ("education", &["degree", "university", "college", "learning", "academic", "study", "qualification"]),
            ("project", &["initiative", "work", "development", "implementation", "assignment", "task"]),
            ("manage", &["lead", "supervise", "oversee", "direct", "coordinate", "administer"]),
            ("develop", &["create", "build", "design", "implement", "construct", "establish", "code"]),
            ("lead", &["manage", "direct", "supervise", "coordinate", "oversee", "team lead", "leadership"]),
            ("team", &["group", "squad", "unit", "crew", "staff"]),
            ("position", &["role", "job", "employment", "work", "career", "title"]),
            ("role", &["position", "job", "employment", "work", "responsibility"]),
            ("senior", &["experienced", "advanced", "lead", "principal", "expert"]),
            ("manager", &["lead", "supervisor", "director", "head", "team lead"]),
            ("engineer", &["developer", "programmer", "architect", "technical", "software"]),
            ("developer", &["engineer", "programmer", "coder", "software", "technical"]),
            ("technical", &["technology", "programming", "software", "engineering", "development"]),
            ("programming", &["coding", "development", "software", "technical", "engineering"]),
            ("responsibility", &["duty", "task", "role", "function", "accountability"]),
            ("achievement", &["accomplishment", "success", "result", "outcome", "milestone"]),
        ];
        entries.iter().copied().collect()
    });

/// Answer when retrieval comes back empty.
const NO_RESULTS_ANSWER: &str = "I couldn't find any relevant information for your query.";
/// Answer when the similarity threshold filters everything out.
const BELOW_THRESHOLD_ANSWER: &str = "No chunks met the semantic similarity threshold.";

/// The retrieval orchestrator.
pub struct RagEngine {
    store: Arc<VectorStore>,
    embedder: EmbeddingClient,
    chat: Box<dyn ChatBackend>,
    default_top_k: usize,
}

impl RagEngine {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: EmbeddingClient,
        chat: Box<dyn ChatBackend>,
        default_top_k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            chat,
            default_top_k: default_top_k.max(1),
        }
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Ingests a document: chunk → embed → store rows → store vectors.
    ///
    /// Returns the processed document (chunks included) for reporting.
    pub async fn add_document(
        &self,
        req: &AddDocumentRequest,
    ) -> Result<Document, RagError> {
        if req.collection_name.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "collection_name is required".to_string(),
            ));
        }

        let content = match (&req.file_path, &req.content) {
            (Some(path), _) if !path.is_empty() => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| RagError::InvalidInput(format!("failed to read file {path}: {e}")))?,
            (_, Some(content)) if !content.is_empty() => content.clone(),
            _ => {
                return Err(RagError::InvalidInput(
                    "either file_path or content must be provided".to_string(),
                ))
            }
        };

        let mut doc = chunker::process_document(
            &content,
            &req.source,
            &req.doc_type,
            req.chunking_config.as_ref(),
        )?;

        debug!(
            document = %doc.id,
            chunks = doc.chunks.len(),
            "generating embeddings"
        );

        let texts: Vec<String> = doc.chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        for (chunk, vector) in doc.chunks.iter_mut().zip(vectors) {
            chunk.embedding = vector;
        }

        self.store.add_document(&req.collection_name, &doc).await?;
        self.store.add_embeddings(&doc.chunks).await?;

        Ok(doc)
    }

    /// Runs the full retrieval-and-answer pipeline.
    pub async fn query(&self, req: &QueryRequest) -> Result<QueryResponse, RagError> {
        let started = Instant::now();
        validate_query(req)?;
        let top_k = req.top_k.unwrap_or(self.default_top_k).max(1);
        let metadata_used = !req.metadata_filters.is_empty();

        let query = if req.query_expansion {
            let expanded = expand_query(&req.query);
            if expanded != req.query {
                debug!(original = %req.query, expanded = %expanded, "query expanded");
            }
            expanded
        } else {
            req.query.clone()
        };

        let query_vector = self.embedder.embed_query(&query).await?;

        let results = self
            .store
            .query_similar(
                &req.collection_name,
                &query_vector,
                top_k * 2,
                &req.metadata_filters,
            )
            .await?;

        let (mut chunks, mut scores): (Vec<Chunk>, Vec<f64>) = results.into_iter().unzip();

        if chunks.is_empty() {
            return Ok(empty_response(NO_RESULTS_ANSWER, started, metadata_used));
        }

        if req.semantic_threshold > 0.0 {
            let kept: Vec<(Chunk, f64)> = chunks
                .into_iter()
                .zip(scores)
                .filter(|(_, score)| *score >= req.semantic_threshold)
                .collect();
            (chunks, scores) = kept.into_iter().unzip();

            if chunks.is_empty() {
                return Ok(empty_response(BELOW_THRESHOLD_ANSWER, started, metadata_used));
            }
        }

        if req.include_parents {
            (chunks, scores) = self.include_parent_chunks(chunks, scores).await;
        }

        let mut reranked_scores = None;
        if req.reranker_enabled && chunks.len() > 1 {
            let (sorted, originals, boosted) = rerank::rerank(&query, chunks, scores);
            chunks = sorted;
            scores = originals;
            reranked_scores = Some(boosted);
        }

        chunks.truncate(top_k);
        scores.truncate(top_k);
        if let Some(ref mut boosted) = reranked_scores {
            boosted.truncate(top_k);
        }

        let context = prepare_context(&chunks);
        let answer = self.generate_answer(&req.query, &context).await?;

        Ok(QueryResponse {
            answer,
            retrieved_context: chunks.iter().map(|c| c.text.clone()).collect(),
            chunks,
            similarity_scores: scores,
            reranked_scores,
            processing_time: started.elapsed().as_secs_f64(),
            metadata_used,
        })
    }

    /// Pure-retrieval variant: search, threshold, truncate, and return the
    /// pre-joined context. Query expansion stays off regardless of the
    /// request flag, and no parent augmentation or re-ranking runs.
    pub async fn retrieve(&self, req: &QueryRequest) -> Result<RetrievalResponse, RagError> {
        let started = Instant::now();
        validate_query(req)?;
        let top_k = req.top_k.unwrap_or(self.default_top_k).max(1);

        let query_vector = self.embedder.embed_query(&req.query).await?;

        let results = self
            .store
            .query_similar(
                &req.collection_name,
                &query_vector,
                top_k * 2,
                &req.metadata_filters,
            )
            .await?;

        let (mut chunks, mut scores): (Vec<Chunk>, Vec<f64>) = results.into_iter().unzip();

        if req.semantic_threshold > 0.0 {
            let kept: Vec<(Chunk, f64)> = chunks
                .into_iter()
                .zip(scores)
                .filter(|(_, score)| *score >= req.semantic_threshold)
                .collect();
            (chunks, scores) = kept.into_iter().unzip();
        }

        chunks.truncate(top_k);
        scores.truncate(top_k);

        Ok(RetrievalResponse {
            query: req.query.clone(),
            collection_name: req.collection_name.clone(),
            chunks_found: chunks.len(),
            context: prepare_context(&chunks),
            chunks,
            similarity_scores: scores,
            processing_time: started.elapsed().as_secs_f64(),
        })
    }

    /// Appends each hit's transitive parents right after it, at a 0.9 score
    /// discount, skipping anything already present. Parent lookups that
    /// fail are skipped rather than failing the query.
    async fn include_parent_chunks(
        &self,
        chunks: Vec<Chunk>,
        scores: Vec<f64>,
    ) -> (Vec<Chunk>, Vec<f64>) {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out_chunks = Vec::with_capacity(chunks.len());
        let mut out_scores = Vec::with_capacity(scores.len());

        for (chunk, score) in chunks.into_iter().zip(scores) {
            let parent_id = chunk.parent_chunk_id.clone();

            if seen.insert(chunk.id.clone()) {
                out_chunks.push(chunk);
                out_scores.push(score);
            }

            if let Some(parent_id) = parent_id {
                match self.store.get_chunk_with_parents(&parent_id).await {
                    Ok(parents) => {
                        for parent in parents {
                            if seen.insert(parent.id.clone()) {
                                out_chunks.push(parent);
                                out_scores.push(score * 0.9);
                            }
                        }
                    }
                    Err(err) => {
                        warn!(parent = %parent_id, error = %err, "parent chain lookup failed");
                    }
                }
            }
        }

        (out_chunks, out_scores)
    }

    async fn generate_answer(&self, query: &str, context: &str) -> Result<String, RagError> {
        let prompt = format!(
            "You are a helpful AI assistant. Based on the provided context, answer the \
             user's question accurately and comprehensively. If the context doesn't contain \
             enough information to answer the question, say so clearly.\n\n\
             Context:\n{context}\n\nQuestion: {query}\n\nAnswer:"
        );
        self.chat.complete(&[ChatMessage::user(prompt)]).await
    }
}

fn validate_query(req: &QueryRequest) -> Result<(), RagError> {
    if req.collection_name.trim().is_empty() {
        return Err(RagError::InvalidInput(
            "collection_name is required".to_string(),
        ));
    }
    if req.query.trim().is_empty() {
        return Err(RagError::InvalidInput("query is required".to_string()));
    }
    Ok(())
}

fn empty_response(answer: &str, started: Instant, metadata_used: bool) -> QueryResponse {
    QueryResponse {
        answer: answer.to_string(),
        retrieved_context: Vec::new(),
        chunks: Vec::new(),
        similarity_scores: Vec::new(),
        reranked_scores: None,
        processing_time: started.elapsed().as_secs_f64(),
        metadata_used,
    }
}

/// Appends up to two dictionary synonyms per query token. The original
/// query always leads; with no additions, the query passes through as-is.
pub fn expand_query(query: &str) -> String {
    let lowered = query.to_lowercase();
    let mut terms: Vec<String> = vec![query.to_string()];

    for word in lowered.split_whitespace() {
        if let Some(synonyms) = EXPANSIONS.get(word) {
            for synonym in synonyms.iter().take(2) {
                if !terms.iter().any(|t| t == synonym) {
                    terms.push((*synonym).to_string());
                }
            }
        }
    }

    if terms.len() > 1 {
        terms.join(" ")
    } else {
        query.to_string()
    }
}

/// Formats retained chunks as numbered context blocks:
/// `[Context i - Section - Subsection]` followed by the text.
pub fn prepare_context(chunks: &[Chunk]) -> String {
    let mut parts = Vec::with_capacity(chunks.len());

    for (i, chunk) in chunks.iter().enumerate() {
        let mut header = format!("[Context {}", i + 1);
        if !chunk.section.is_empty() {
            header.push_str(&format!(" - {}", chunk.section));
        }
        if !chunk.subsection.is_empty() {
            header.push_str(&format!(" - {}", chunk.subsection));
        }
        header.push(']');
        parts.push(format!("{header}\n{}", chunk.text));
    }

    parts.join("\n\n")
}
