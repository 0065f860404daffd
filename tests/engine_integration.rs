//! Full-pipeline tests: ingest → embed (stub) → store → query.
//!
//! The embedding stub maps text to a normalized letter histogram, so
//! identical texts embed identically and the kNN path behaves like a real
//! (if crude) semantic index. The chat stub returns a canned answer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use recall::embedding::{EmbeddingBackend, EmbeddingClient};
use recall::engine::RagEngine;
use recall::error::RagError;
use recall::llm::{ChatBackend, ChatMessage};
use recall::models::{
    AddDocumentRequest, Chunk, ChunkType, Document, Metadata, QueryRequest,
};
use recall::store::VectorStore;

/// Normalized letter-frequency embedding: deterministic and non-degenerate.
fn histogram_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 26];
    for b in text.to_lowercase().bytes() {
        if b.is_ascii_lowercase() {
            v[(b - b'a') as usize] += 1.0;
        }
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

struct StubEmbedder;

#[async_trait]
impl EmbeddingBackend for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|t| histogram_embedding(t)).collect())
    }

    fn model_name(&self) -> &str {
        "stub-histogram"
    }
}

struct StubChat;

#[async_trait]
impl ChatBackend for StubChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RagError> {
        assert_eq!(messages.len(), 1);
        assert!(messages[0].content.contains("Question:"));
        Ok("stub answer".to_string())
    }
}

async fn engine_with_store() -> (TempDir, Arc<RagEngine>) {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(
        VectorStore::open(tmp.path().join("recall.sqlite"))
            .await
            .unwrap(),
    );
    let engine = Arc::new(RagEngine::new(
        store,
        EmbeddingClient::new(Box::new(StubEmbedder)),
        Box::new(StubChat),
        5,
    ));
    (tmp, engine)
}

fn query(collection: &str, text: &str) -> QueryRequest {
    QueryRequest {
        collection_name: collection.to_string(),
        query: text.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn ingested_chunk_is_retrievable_by_its_own_text() {
    let (_tmp, engine) = engine_with_store().await;
    engine.store().create_collection("notes", "").await.unwrap();

    let req = AddDocumentRequest {
        collection_name: "notes".to_string(),
        content: Some(
            "The quick brown fox jumps over the lazy dog near the riverbank.\n\n\
             Completely different material about compiler optimization passes.\n\n\
             A third paragraph describing sourdough bread and hydration ratios."
                .to_string(),
        ),
        source: "mixed.txt".to_string(),
        ..Default::default()
    };
    let doc = engine.add_document(&req).await.unwrap();
    assert!(!doc.chunks.is_empty());

    let target = &doc.chunks[0];
    let response = engine.query(&query("notes", &target.text)).await.unwrap();

    assert_eq!(response.answer, "stub answer");
    assert!(
        response.chunks.iter().any(|c| c.id == target.id),
        "the chunk whose text we queried appears in the top-k"
    );
    // scores arrive in non-increasing order
    for pair in response.similarity_scores.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
}

#[tokio::test]
async fn query_on_empty_collection_is_success_not_error() {
    let (_tmp, engine) = engine_with_store().await;
    engine.store().create_collection("empty", "").await.unwrap();

    let response = engine.query(&query("empty", "anything at all")).await.unwrap();
    assert!(response.chunks.is_empty());
    assert!(response.answer.contains("couldn't find any relevant information"));
}

#[tokio::test]
async fn threshold_filters_everything_out_gracefully() {
    let (_tmp, engine) = engine_with_store().await;
    engine.store().create_collection("notes", "").await.unwrap();

    let req = AddDocumentRequest {
        collection_name: "notes".to_string(),
        content: Some("zebra xylophone quartz vexing jumbo flock".to_string()),
        ..Default::default()
    };
    engine.add_document(&req).await.unwrap();

    let mut q = query("notes", "iiiiiiiii");
    q.semantic_threshold = 0.999;
    let response = engine.query(&q).await.unwrap();

    assert!(response.chunks.is_empty());
    assert!(response.answer.contains("threshold"));
}

#[tokio::test]
async fn parent_inclusion_appends_discounted_parent() {
    let (_tmp, engine) = engine_with_store().await;
    let store = engine.store().clone();
    store.create_collection("notes", "").await.unwrap();

    // one parent, one child that carries the only embedding
    let mut parent = Chunk::new("doc-1", "broad parent context paragraph", ChunkType::Parent, 0);
    parent.section = "section_1".to_string();
    let mut child = Chunk::new("doc-1", "narrow child detail sentence", ChunkType::Child, 1);
    child.section = "section_1".to_string();
    child.parent_chunk_id = Some(parent.id.clone());
    child.embedding = histogram_embedding(&child.text);

    let doc = Document {
        id: "doc-1".to_string(),
        content: format!("{}\n\n{}", parent.text, child.text),
        source: "hier.txt".to_string(),
        doc_type: String::new(),
        metadata: Metadata::new(),
        chunks: vec![parent.clone(), child.clone()],
        created_at: chrono::Utc::now(),
    };
    store.add_document("notes", &doc).await.unwrap();
    store.add_embeddings(&doc.chunks).await.unwrap();

    let mut q = query("notes", "narrow child detail sentence");
    q.include_parents = true;
    let response = engine.query(&q).await.unwrap();

    assert_eq!(response.chunks.len(), 2);
    assert_eq!(response.chunks[0].id, child.id);
    assert_eq!(response.chunks[1].id, parent.id, "parent placed after the hit");

    let child_score = response.similarity_scores[0];
    let parent_score = response.similarity_scores[1];
    assert!(
        (parent_score - child_score * 0.9).abs() < 1e-9,
        "parent scored at a 0.9 discount: {parent_score} vs {child_score}"
    );
}

#[tokio::test]
async fn reranker_produces_bounded_total_order() {
    let (_tmp, engine) = engine_with_store().await;
    engine.store().create_collection("notes", "").await.unwrap();

    let req = AddDocumentRequest {
        collection_name: "notes".to_string(),
        content: Some(
            "EXPERIENCE\nLed engineering teams through three platform migrations, \
             owning delivery and hiring for a group of twelve engineers across two \
             sites. Ran the weekly operational review, drove the on-call rotation \
             redesign, and kept attrition under five percent through two \
             reorganizations while shipping the billing rewrite on schedule.\n\n\
             EDUCATION\nStudied mathematics with a minor in statistics, then picked \
             up software engineering through an intensive graduate conversion \
             program. Later completed a part-time certificate in organizational \
             leadership, including coursework on negotiation, coaching, and the \
             economics of platform teams.\n\n\
             SKILLS\nDistributed systems, batch processing, stream processing, \
             capacity planning, vendor negotiation and incident command. Equally \
             at home writing a postmortem, pricing a capacity plan, or walking a \
             new manager through their first performance cycle without drama."
                .to_string(),
        ),
        doc_type: "resume".to_string(),
        ..Default::default()
    };
    engine.add_document(&req).await.unwrap();

    let mut q = query("notes", "leadership experience running a team");
    q.reranker_enabled = true;
    let response = engine.query(&q).await.unwrap();

    let reranked = response.reranked_scores.expect("re-rank scores present");
    assert_eq!(reranked.len(), response.chunks.len());
    for score in &reranked {
        assert!((0.0..=1.0).contains(score));
    }
    for pair in reranked.windows(2) {
        assert!(pair[0] >= pair[1], "re-ranked order is non-increasing");
    }
}

#[tokio::test]
async fn retrieval_variant_returns_context_without_answer() {
    let (_tmp, engine) = engine_with_store().await;
    engine.store().create_collection("notes", "").await.unwrap();

    let req = AddDocumentRequest {
        collection_name: "notes".to_string(),
        content: Some(
            "A paragraph about alpine hiking routes and weather windows.\n\n\
             A paragraph about tide tables and coastal kayaking safety."
                .to_string(),
        ),
        ..Default::default()
    };
    engine.add_document(&req).await.unwrap();

    let response = engine
        .retrieve(&query("notes", "alpine hiking weather"))
        .await
        .unwrap();

    assert!(response.chunks_found > 0);
    assert_eq!(response.chunks.len(), response.similarity_scores.len());
    assert!(response.context.contains("[Context 1"));
}

#[tokio::test]
async fn metadata_filters_flow_through_to_the_store() {
    let (_tmp, engine) = engine_with_store().await;
    let store = engine.store().clone();
    store.create_collection("notes", "").await.unwrap();

    let mut section = Chunk::new("doc-1", "section about sailing knots", ChunkType::Section, 0);
    section.embedding = histogram_embedding(&section.text);
    let mut window = Chunk::new(
        "doc-1",
        "window about sailing knots too",
        ChunkType::SentenceWindow,
        1,
    );
    window.embedding = histogram_embedding(&window.text);

    let doc = Document {
        id: "doc-1".to_string(),
        content: "sailing".to_string(),
        source: String::new(),
        doc_type: String::new(),
        metadata: Metadata::new(),
        chunks: vec![section.clone(), window],
        created_at: chrono::Utc::now(),
    };
    store.add_document("notes", &doc).await.unwrap();
    store.add_embeddings(&doc.chunks).await.unwrap();

    let mut q = query("notes", "sailing knots");
    q.metadata_filters = HashMap::from([("chunk_type".to_string(), "section".to_string())]);
    let response = engine.query(&q).await.unwrap();

    assert!(response.metadata_used);
    assert_eq!(response.chunks.len(), 1);
    assert_eq!(response.chunks[0].id, section.id);
}

#[tokio::test]
async fn blank_query_is_invalid_input() {
    let (_tmp, engine) = engine_with_store().await;
    let err = engine.query(&query("notes", "   ")).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
}
