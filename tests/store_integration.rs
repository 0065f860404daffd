//! Vector store behavior against a real on-disk database.

use std::collections::HashMap;

use tempfile::TempDir;

use recall::error::RagError;
use recall::models::{Chunk, ChunkType, Document, Metadata};
use recall::store::VectorStore;

async fn open_store() -> (TempDir, VectorStore) {
    let tmp = TempDir::new().unwrap();
    let store = VectorStore::open(tmp.path().join("recall.sqlite"))
        .await
        .unwrap();
    (tmp, store)
}

fn doc_with_chunks(chunks: Vec<Chunk>) -> Document {
    let id = chunks
        .first()
        .map(|c| c.document_id.clone())
        .unwrap_or_else(|| "doc-empty".to_string());
    Document {
        id,
        content: chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>().join("\n\n"),
        source: "test.txt".to_string(),
        doc_type: "note".to_string(),
        metadata: Metadata::new(),
        chunks,
        created_at: chrono::Utc::now(),
    }
}

/// Unit vector pointing mostly along the first axis, bending further away
/// as `angle_step` grows. Cosine similarity against `[1, 0, 0, 0]` decreases
/// monotonically with the step.
fn vector_at(angle_step: usize) -> Vec<f32> {
    let theta = angle_step as f32 * 0.1;
    vec![theta.cos(), theta.sin(), 0.0, 0.0]
}

#[tokio::test]
async fn create_collection_is_idempotent() {
    let (_tmp, store) = open_store().await;

    store.create_collection("notes", "first description").await.unwrap();
    store.create_collection("notes", "second description").await.unwrap();

    let collections = store.list_collections().await.unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].description, "first description");
}

#[tokio::test]
async fn add_document_requires_known_collection() {
    let (_tmp, store) = open_store().await;

    let chunk = Chunk::new("doc-1", "some text", ChunkType::Semantic, 0);
    let doc = doc_with_chunks(vec![chunk]);

    let err = store.add_document("missing", &doc).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
}

#[tokio::test]
async fn insert_list_delete_round_trip() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "").await.unwrap();

    let chunks = vec![
        Chunk::new("doc-1", "alpha text body", ChunkType::Semantic, 0),
        Chunk::new("doc-1", "beta text body", ChunkType::Semantic, 1),
    ];
    let doc = doc_with_chunks(chunks);
    store.add_document("notes", &doc).await.unwrap();

    let documents = store.list_documents("notes").await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].id, "doc-1");
    assert_eq!(documents[0].chunk_count, 2);

    store.delete_document("doc-1").await.unwrap();
    let documents = store.list_documents("notes").await.unwrap();
    assert!(documents.is_empty());

    // a second delete reports NotFound instead of corrupting state
    let err = store.delete_document("doc-1").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}

#[tokio::test]
async fn knn_with_chunk_type_filter() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "").await.unwrap();

    // ten chunks, types alternating section / section_part, similarity
    // decreasing with the index
    let mut chunks = Vec::new();
    for i in 0..10 {
        let chunk_type = if i % 2 == 0 {
            ChunkType::Section
        } else {
            ChunkType::SectionPart
        };
        let mut chunk = Chunk::new("doc-1", &format!("chunk number {i}"), chunk_type, i);
        chunk.embedding = vector_at(i);
        chunks.push(chunk);
    }
    let doc = doc_with_chunks(chunks);
    store.add_document("notes", &doc).await.unwrap();
    store.add_embeddings(&doc.chunks).await.unwrap();

    let mut filters = HashMap::new();
    filters.insert("chunk_type".to_string(), "section".to_string());

    let results = store
        .query_similar("notes", &vector_at(0), 10, &filters)
        .await
        .unwrap();

    assert_eq!(results.len(), 5, "exactly the five section chunks");
    for (chunk, _) in &results {
        assert_eq!(chunk.chunk_type, ChunkType::Section);
    }
    // ordered by decreasing similarity
    for pair in results.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
    assert_eq!(results[0].0.text, "chunk number 0");
}

#[tokio::test]
async fn knn_unknown_filter_keys_are_ignored() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "").await.unwrap();

    let mut chunk = Chunk::new("doc-1", "only chunk", ChunkType::Semantic, 0);
    chunk.embedding = vector_at(0);
    let doc = doc_with_chunks(vec![chunk]);
    store.add_document("notes", &doc).await.unwrap();
    store.add_embeddings(&doc.chunks).await.unwrap();

    let mut filters = HashMap::new();
    filters.insert("flavor".to_string(), "strawberry".to_string());

    let results = store
        .query_similar("notes", &vector_at(0), 5, &filters)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn query_before_any_embeddings_returns_empty() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "").await.unwrap();

    let results = store
        .query_similar("notes", &vector_at(0), 5, &HashMap::new())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn intra_batch_dimension_mismatch_rejects_batch() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "").await.unwrap();

    let mut a = Chunk::new("doc-1", "first", ChunkType::Semantic, 0);
    a.embedding = vec![0.0; 8];
    let mut b = Chunk::new("doc-1", "second", ChunkType::Semantic, 1);
    b.embedding = vec![0.0; 16];

    let err = store.add_embeddings(&[a, b]).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::DimensionMismatch { got: 16, expected: 8 }
    ));
}

#[tokio::test]
async fn dimension_change_drops_and_recreates_the_vector_table() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "").await.unwrap();

    // first ingest locks the table at 768
    let mut old = Chunk::new("doc-old", "old model chunk", ChunkType::Semantic, 0);
    old.embedding = vec![0.5; 768];
    let old_doc = doc_with_chunks(vec![old]);
    store.add_document("notes", &old_doc).await.unwrap();
    store.add_embeddings(&old_doc.chunks).await.unwrap();

    // a 1024-dim batch recreates the table at the new dimension
    let mut new = Chunk::new("doc-new", "new model chunk", ChunkType::Semantic, 0);
    new.embedding = vec![0.5; 1024];
    let new_doc = doc_with_chunks(vec![new]);
    store.add_document("notes", &new_doc).await.unwrap();
    store.add_embeddings(&new_doc.chunks).await.unwrap();

    // only the re-ingested vectors are searchable now
    let results = store
        .query_similar("notes", &vec![0.5; 1024], 10, &HashMap::new())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0.document_id, "doc-new");
}

#[tokio::test]
async fn parent_chain_is_returned_root_first() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "").await.unwrap();

    let mut root = Chunk::new("doc-1", "root section text", ChunkType::Parent, 0);
    root.section = "section_1".to_string();
    let mut middle = Chunk::new("doc-1", "middle parent text", ChunkType::Parent, 1);
    middle.parent_chunk_id = Some(root.id.clone());
    let mut leaf = Chunk::new("doc-1", "leaf child text", ChunkType::Child, 2);
    leaf.parent_chunk_id = Some(middle.id.clone());

    let doc = doc_with_chunks(vec![root.clone(), middle.clone(), leaf.clone()]);
    store.add_document("notes", &doc).await.unwrap();

    let chain = store.get_chunk_with_parents(&leaf.id).await.unwrap();
    assert_eq!(chain.len(), 3);
    assert_eq!(chain[0].id, root.id);
    assert_eq!(chain[1].id, middle.id);
    assert_eq!(chain[2].id, leaf.id);

    let err = store.get_chunk_with_parents("no-such-chunk").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}

#[tokio::test]
async fn delete_collection_cascades() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "").await.unwrap();

    let mut chunk = Chunk::new("doc-1", "body text", ChunkType::Semantic, 0);
    chunk.embedding = vector_at(0);
    let doc = doc_with_chunks(vec![chunk]);
    store.add_document("notes", &doc).await.unwrap();
    store.add_embeddings(&doc.chunks).await.unwrap();

    store.delete_collection("notes").await.unwrap();
    assert!(store.list_collections().await.unwrap().is_empty());

    let err = store.delete_collection("notes").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}

#[tokio::test]
async fn delete_all_documents_keeps_the_collection() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "keeper").await.unwrap();

    for doc_index in 0..3 {
        let chunk = Chunk::new(
            &format!("doc-{doc_index}"),
            "some body text",
            ChunkType::Semantic,
            0,
        );
        let doc = doc_with_chunks(vec![chunk]);
        store.add_document("notes", &doc).await.unwrap();
    }

    let deleted = store.delete_all_documents("notes").await.unwrap();
    assert_eq!(deleted, 3);

    let collections = store.list_collections().await.unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].document_count, 0);

    // nothing left to delete
    let err = store.delete_all_documents("notes").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}

#[tokio::test]
async fn reingest_replaces_document_wholesale() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "").await.unwrap();

    let first = doc_with_chunks(vec![
        Chunk::new("doc-1", "version one chunk a", ChunkType::Semantic, 0),
        Chunk::new("doc-1", "version one chunk b", ChunkType::Semantic, 1),
        Chunk::new("doc-1", "version one chunk c", ChunkType::Semantic, 2),
    ]);
    store.add_document("notes", &first).await.unwrap();

    let second = doc_with_chunks(vec![Chunk::new(
        "doc-1",
        "version two only chunk",
        ChunkType::Semantic,
        0,
    )]);
    store.add_document("notes", &second).await.unwrap();

    let documents = store.list_documents("notes").await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].chunk_count, 1);
}

#[tokio::test]
async fn collection_stats_aggregate_types() {
    let (_tmp, store) = open_store().await;
    store.create_collection("notes", "described").await.unwrap();

    let mut section = Chunk::new("doc-1", "section body", ChunkType::Section, 0);
    section.section = "INTRO".to_string();
    let part = Chunk::new("doc-1", "part body", ChunkType::SectionPart, 1);
    let doc = doc_with_chunks(vec![section, part]);
    store.add_document("notes", &doc).await.unwrap();

    let stats = store.collection_stats("notes").await.unwrap();
    assert_eq!(stats.document_count, 1);
    assert_eq!(stats.chunk_count, 2);
    assert_eq!(stats.chunk_types.get("section"), Some(&1));
    assert_eq!(stats.chunk_types.get("section_part"), Some(&1));
    assert_eq!(stats.document_types.get("note"), Some(&1));

    let err = store.collection_stats("absent").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}
