//! Embedding client: adaptive batching over an OpenAI-compatible endpoint.
//!
//! The raw wire call is one trait method ([`EmbeddingBackend::embed`]) so
//! that tests can substitute a stub; everything interesting — batch
//! planning, retries, recursive halving of oversized batches, placeholder
//! vectors for single texts the upstream cannot swallow — lives in
//! [`EmbeddingClient`] and is exercised against that seam.
//!
//! # Batching
//!
//! Batches are bounded by 64 texts and ~8000 estimated tokens (one token per
//! four characters). When the upstream rejects a batch as oversized, the
//! batch is halved recursively down to single texts. A single text that
//! still fails yields a zero vector at the model's nominal dimension so the
//! surrounding ingest can continue; the condition is logged, not surfaced.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ServicesConfig;
use crate::error::RagError;

const MAX_BATCH_TEXTS: usize = 64;
const MAX_TOKENS_PER_BATCH: usize = 8000;
const CHARS_PER_TOKEN: usize = 4;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Error-body substrings that mark a batch as too large for the upstream.
const OVERSIZED_INDICATORS: &[&str] = &[
    "too large",
    "input is too large",
    "increase the physical batch size",
    "context length exceeded",
    "maximum context length",
    "token limit",
    "input size",
];

/// One raw call to the embedding endpoint.
///
/// Implementations embed every text in a single request and return vectors
/// in input order. Batch sizing and failure recovery are the caller's job.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Model identifier, used for nominal-dimension lookup.
    fn model_name(&self) -> &str;
}

/// Nominal vector dimension for known embedding models.
///
/// Advisory only: the store discovers the real dimension from the first
/// inserted vector. This table exists so placeholder vectors for oversized
/// texts have a plausible length.
pub fn nominal_dimension(model: &str) -> usize {
    match model {
        "nomic-embed-text-v1.5" => 768,
        "mxbai-embed-large" | "mxbai-embed-large:large" => 1024,
        "text-embedding-ada-002" | "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        other => {
            debug!(model = other, "unknown embedding model, assuming 1024 dimensions");
            1024
        }
    }
}

fn is_oversized_error(err: &RagError) -> bool {
    let message = err.to_string().to_lowercase();
    OVERSIZED_INDICATORS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Batching, retrying front end over an [`EmbeddingBackend`].
pub struct EmbeddingClient {
    backend: Box<dyn EmbeddingBackend>,
    max_retries: u32,
}

impl EmbeddingClient {
    pub fn new(backend: Box<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(backend: Box<dyn EmbeddingBackend>, max_retries: u32) -> Self {
        Self {
            backend,
            max_retries: max_retries.max(1),
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Embeds `texts`, returning exactly one vector per input in input order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches = plan_batches(texts);
        debug!(texts = texts.len(), batches = batches.len(), "embedding in adaptive batches");

        let mut results: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];

        for batch in batches {
            // halving worklist: (absolute offset, slice)
            let mut pending: Vec<(usize, &[String])> = vec![(batch.start, &texts[batch])];

            while let Some((offset, slice)) = pending.pop() {
                match self.call_with_retry(slice).await {
                    Ok(vectors) => {
                        for (i, vector) in vectors.into_iter().enumerate() {
                            results[offset + i] = vector;
                        }
                    }
                    Err(err) if is_oversized_error(&err) => {
                        if slice.len() == 1 {
                            warn!(
                                chars = slice[0].len(),
                                "single text exceeds the upstream token budget, storing placeholder vector"
                            );
                            results[offset] =
                                vec![0.0; nominal_dimension(self.backend.model_name())];
                        } else {
                            let mid = slice.len() / 2;
                            pending.push((offset + mid, &slice[mid..]));
                            pending.push((offset, &slice[..mid]));
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        for (i, vector) in results.iter().enumerate() {
            if vector.is_empty() {
                return Err(RagError::UpstreamUnavailable(format!(
                    "embedding for text at index {i} was not populated"
                )));
            }
        }

        Ok(results)
    }

    /// Embeds a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let input = vec![text.to_string()];
        let mut vectors = self.embed_texts(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::UpstreamUnavailable("empty embedding response".to_string()))
    }

    /// One slice, retried with linear back-off. Oversized errors are
    /// propagated immediately so the halving worklist can react.
    async fn call_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut last_err = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
            }

            match self.backend.embed(texts).await {
                Ok(vectors) => {
                    if vectors.len() != texts.len() {
                        return Err(RagError::UpstreamUnavailable(format!(
                            "embedding count mismatch: sent {} texts, got {} vectors",
                            texts.len(),
                            vectors.len()
                        )));
                    }
                    return Ok(vectors);
                }
                Err(err) if is_oversized_error(&err) => return Err(err),
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::UpstreamUnavailable("embedding failed".to_string())))
    }
}

/// Splits the input into contiguous batches bounded by text count and
/// estimated token budget. A text that alone exceeds the budget travels in
/// its own batch (the halving path deals with the fallout).
fn plan_batches(texts: &[String]) -> Vec<std::ops::Range<usize>> {
    let mut batches = Vec::new();
    let mut i = 0;

    while i < texts.len() {
        let mut size = 0;
        let mut chars = 0;

        while i + size < texts.len() && size < MAX_BATCH_TEXTS {
            let text_chars = texts[i + size].len();

            if (chars + text_chars) / CHARS_PER_TOKEN > MAX_TOKENS_PER_BATCH && size > 0 {
                break;
            }
            if text_chars / CHARS_PER_TOKEN > MAX_TOKENS_PER_BATCH {
                if size == 0 {
                    size = 1;
                }
                break;
            }

            chars += text_chars;
            size += 1;
        }

        if size == 0 {
            size = 1;
        }
        batches.push(i..i + size);
        i += size;
    }

    batches
}

// ============ HTTP backend ============

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

/// Embedding backend over `POST {base_url}/embeddings`.
pub struct HttpEmbeddingBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpEmbeddingBackend {
    /// Builds a backend sharing the given connection pool.
    pub fn new(client: reqwest::Client, services: &ServicesConfig) -> Self {
        Self {
            client,
            base_url: services.llamacpp_base_url.trim_end_matches('/').to_string(),
            model: services.embedding_model.clone(),
        }
    }
}

/// Shared HTTP connection pool for the embedding and chat backends.
pub fn shared_http_client(services: &ServicesConfig) -> Result<reqwest::Client, RagError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(services.timeout_secs))
        .build()
        .map_err(|e| RagError::UpstreamUnavailable(e.to_string()))
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::UpstreamUnavailable(format!(
                "embedding API returned {status}: {body_text}"
            )));
        }

        let parsed: EmbeddingApiResponse = response
            .json()
            .await
            .map_err(|e| RagError::UpstreamUnavailable(format!("invalid embedding response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(RagError::UpstreamUnavailable(format!(
                "embedding count mismatch: sent {} texts, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // responses may arrive out of order; reassemble by index
        let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        for item in parsed.data {
            if item.index >= vectors.len() {
                return Err(RagError::UpstreamUnavailable(format!(
                    "embedding index {} out of bounds",
                    item.index
                )));
            }
            vectors[item.index] = item.embedding;
        }

        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic stub: vector = [len, first byte] unless the batch is
    /// larger than `max_batch`, in which case it reports an oversize error.
    struct StubBackend {
        max_batch: usize,
    }

    impl StubBackend {
        fn new(max_batch: usize) -> Self {
            Self { max_batch }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for StubBackend {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            if texts.len() > self.max_batch {
                return Err(RagError::UpstreamUnavailable(
                    "input is too large to process".to_string(),
                ));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, *t.as_bytes().first().unwrap_or(&0) as f32])
                .collect())
        }

        fn model_name(&self) -> &str {
            "stub-model"
        }
    }

    /// Always fails with an oversize error, even for single texts.
    struct AlwaysOversized;

    #[async_trait]
    impl EmbeddingBackend for AlwaysOversized {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Err(RagError::UpstreamUnavailable(
                "context length exceeded".to_string(),
            ))
        }

        fn model_name(&self) -> &str {
            "nomic-embed-text-v1.5"
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text number {i}")).collect()
    }

    #[tokio::test]
    async fn test_vectors_returned_in_input_order() {
        let client = EmbeddingClient::new(Box::new(StubBackend::new(64)));
        let inputs = vec!["a".to_string(), "bbb".to_string(), "cc".to_string()];
        let vectors = client.embed_texts(&inputs).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0][0], 1.0);
        assert_eq!(vectors[1][0], 3.0);
        assert_eq!(vectors[2][0], 2.0);
    }

    #[tokio::test]
    async fn test_oversized_batch_halves_until_it_fits() {
        let stub = StubBackend::new(2);
        let client = EmbeddingClient::new(Box::new(stub));
        let inputs = texts(5);
        let vectors = client.embed_texts(&inputs).await.unwrap();

        // five vectors, in the right slots, despite the halving
        assert_eq!(vectors.len(), 5);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], inputs[i].len() as f32, "slot {i} holds its own vector");
        }
    }

    #[tokio::test]
    async fn test_single_oversized_text_becomes_placeholder() {
        let client = EmbeddingClient::new(Box::new(AlwaysOversized));
        let inputs = texts(3);
        let vectors = client.embed_texts(&inputs).await.unwrap();

        assert_eq!(vectors.len(), 3);
        for v in &vectors {
            assert_eq!(v.len(), 768, "placeholder uses the model's nominal dimension");
            assert!(v.iter().all(|x| *x == 0.0));
        }
    }

    #[tokio::test]
    async fn test_empty_input_is_empty_output() {
        let client = EmbeddingClient::new(Box::new(StubBackend::new(64)));
        assert!(client.embed_texts(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embed_query_returns_one_vector() {
        let client = EmbeddingClient::new(Box::new(StubBackend::new(64)));
        let vector = client.embed_query("hello").await.unwrap();
        assert_eq!(vector[0], 5.0);
    }

    #[test]
    fn test_plan_batches_respects_text_cap() {
        let inputs = texts(150);
        let batches = plan_batches(&inputs);
        assert!(batches.iter().all(|b| b.len() <= MAX_BATCH_TEXTS));
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 150);
    }

    #[test]
    fn test_plan_batches_respects_token_budget() {
        let inputs: Vec<String> = (0..10).map(|_| "x".repeat(10_000)).collect();
        let batches = plan_batches(&inputs);
        // 10k chars ≈ 2.5k tokens, so at most three texts fit in 8k tokens
        assert!(batches.iter().all(|b| b.len() <= 3));
    }

    #[test]
    fn test_huge_single_text_travels_alone() {
        let inputs = vec!["x".repeat(100_000), "small".to_string()];
        let batches = plan_batches(&inputs);
        assert_eq!(batches[0].len(), 1);
    }

    #[test]
    fn test_oversized_detection_matches_known_phrases() {
        for phrase in OVERSIZED_INDICATORS {
            let err = RagError::UpstreamUnavailable(format!("server said: {phrase}!"));
            assert!(is_oversized_error(&err));
        }
        let other = RagError::UpstreamUnavailable("connection refused".to_string());
        assert!(!is_oversized_error(&other));
    }

    #[test]
    fn test_nominal_dimensions() {
        assert_eq!(nominal_dimension("nomic-embed-text-v1.5"), 768);
        assert_eq!(nominal_dimension("mxbai-embed-large"), 1024);
        assert_eq!(nominal_dimension("text-embedding-3-large"), 3072);
        assert_eq!(nominal_dimension("never-heard-of-it"), 1024);
    }
}
