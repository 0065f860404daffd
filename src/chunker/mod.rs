//! Adaptive document chunker.
//!
//! Given document content, the chunker classifies it by size and structural
//! shape, resolves a segmentation configuration, runs the selected strategy,
//! and post-processes the result into few-but-meaningful chunks with optional
//! parent/child hierarchy and keyword annotations.
//!
//! The whole pipeline is deterministic: identical `(content, resolved
//! config)` pairs produce identical chunk counts, order, and text. Only the
//! chunk ids differ between runs.
//!
//! # Pipeline
//!
//! | Step | Module |
//! |------|--------|
//! | Characterize size and structure | [`analysis`] |
//! | Resolve strategy and size bounds | [`resolve_config`] |
//! | Segment | [`strategies`] |
//! | Merge fragments, synthesize section parents | [`strategies::post_process`] |
//! | Keyword annotation | [`keywords`] |

pub mod analysis;
pub mod keywords;
pub mod strategies;

use chrono::Utc;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::RagError;
use crate::models::{ChunkingConfig, ChunkingStrategy, Document, Metadata};
use analysis::{optimal_chunk_count, DocumentCategory, DocumentProfile, StructureType};

/// Minimum chars for a meaningful chunk; fragments below half of this are
/// merged forward during post-processing.
pub const MIN_MEANINGFUL_CHUNK_SIZE: usize = 200;
/// Hard ceiling on chunk size when the document does not dictate one.
pub const MAX_CHUNK_SIZE: usize = 1500;
/// Window size used by the fixed-size strategy on mid-size documents.
pub const PREFERRED_CHUNK_SIZE: usize = 800;

/// Fully resolved chunking parameters: every field concrete.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub strategy: ChunkingStrategy,
    pub fixed_size: usize,
    pub overlap: usize,
    pub sentence_window_size: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub preserve_paragraphs: bool,
    pub extract_keywords: bool,
}

/// Processes document content into a [`Document`] with ordered chunks.
///
/// Fails with [`RagError::InvalidInput`] when the content is blank;
/// otherwise always succeeds.
pub fn process_document(
    content: &str,
    source: &str,
    doc_type: &str,
    user_config: Option<&ChunkingConfig>,
) -> Result<Document, RagError> {
    if content.trim().is_empty() {
        return Err(RagError::InvalidInput(
            "document content is empty".to_string(),
        ));
    }

    let profile = analysis::analyze(content);
    let cfg = resolve_config(&profile, user_config);

    debug!(
        length = profile.length,
        category = profile.category.as_str(),
        structure = profile.structure.as_str(),
        strategy = cfg.strategy.as_str(),
        "document analyzed"
    );

    let doc_id = Uuid::new_v4().to_string();

    let chunks = match cfg.strategy {
        ChunkingStrategy::FixedSize => strategies::fixed_size_chunks(content, &doc_id, &cfg),
        ChunkingStrategy::Structural => {
            strategies::structural_chunks(content, &doc_id, &cfg, &profile)
        }
        ChunkingStrategy::Semantic => strategies::semantic_chunks(content, &doc_id, &cfg),
        ChunkingStrategy::SentenceWindow => {
            strategies::sentence_window_chunks(content, &doc_id, &cfg)
        }
        ChunkingStrategy::ParentDocument => {
            strategies::parent_document_chunks(content, &doc_id, &cfg)
        }
    };

    let mut chunks = strategies::post_process(chunks, &profile);

    // the merge/synthesis sweep can leave gaps and duplicates behind;
    // reassign indices over the final order so they stay unique
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i;
    }

    let mut metadata = Metadata::new();
    metadata.insert(
        "chunking_strategy".to_string(),
        json!(cfg.strategy.as_str()),
    );
    metadata.insert("document_length".to_string(), json!(profile.length));
    metadata.insert(
        "document_category".to_string(),
        json!(profile.category.as_str()),
    );
    metadata.insert(
        "structure_type".to_string(),
        json!(profile.structure.as_str()),
    );
    metadata.insert("complexity".to_string(), json!(profile.complexity));
    metadata.insert("chunk_count".to_string(), json!(chunks.len()));

    debug!(chunks = chunks.len(), strategy = cfg.strategy.as_str(), "document processed");

    Ok(Document {
        id: doc_id,
        content: content.to_string(),
        source: source.to_string(),
        doc_type: doc_type.to_string(),
        metadata,
        chunks,
        created_at: Utc::now(),
    })
}

/// Resolves the effective configuration for a document.
///
/// User-supplied fields always win; unset fields are filled from the
/// adaptive strategy table and finally from the size-scaled defaults.
pub fn resolve_config(profile: &DocumentProfile, user: Option<&ChunkingConfig>) -> ResolvedConfig {
    let user = user.cloned().unwrap_or_default();
    let optimal = optimal_chunk_count(profile.length).max(1);

    let mut strategy = None;
    let mut min = None;
    let mut max = None;
    let mut fixed = None;
    let mut overlap = None;
    let mut window = None;

    match profile.category {
        DocumentCategory::VerySmall => {
            if profile.length < 600 {
                strategy = Some(ChunkingStrategy::FixedSize);
                fixed = Some(profile.length);
                overlap = Some(0);
                min = Some(profile.length);
            } else {
                strategy = Some(ChunkingStrategy::Structural);
                min = Some(profile.length.div_ceil(3).max(250));
                max = Some(profile.length.div_ceil(2));
            }
        }
        DocumentCategory::Small => {
            let target = (profile.length / optimal).max(400);
            if profile.has_structure {
                strategy = Some(ChunkingStrategy::Structural);
                min = Some(target);
                max = Some(target + 300);
            } else {
                strategy = Some(ChunkingStrategy::SentenceWindow);
                window = Some(4);
                // windows hold only a few sentences; a length-scaled floor
                // would skip every window except the final one
                min = Some(MIN_MEANINGFUL_CHUNK_SIZE);
            }
        }
        DocumentCategory::Medium => {
            strategy = Some(if profile.structure == StructureType::Hierarchical {
                ChunkingStrategy::ParentDocument
            } else if profile.has_structure {
                ChunkingStrategy::Structural
            } else {
                ChunkingStrategy::Semantic
            });
        }
        DocumentCategory::Large | DocumentCategory::VeryLarge => {
            strategy = Some(ChunkingStrategy::ParentDocument);
            max = Some(1200);
            min = Some(400);
        }
    }

    let strategy = user
        .strategy
        .or(strategy)
        .unwrap_or(ChunkingStrategy::Structural);
    let min = user.min_chunk_size.or(min).unwrap_or_else(|| {
        if profile.length < 2000 {
            (profile.length / 4).max(MIN_MEANINGFUL_CHUNK_SIZE)
        } else {
            MIN_MEANINGFUL_CHUNK_SIZE
        }
    });
    let max = user.max_chunk_size.or(max).unwrap_or_else(|| {
        if profile.length < 3000 {
            (profile.length / 2).max(1)
        } else {
            MAX_CHUNK_SIZE
        }
    });
    let fixed = user.fixed_size.or(fixed).unwrap_or_else(|| {
        if profile.length < 2000 {
            (profile.length / optimal).max(1)
        } else {
            PREFERRED_CHUNK_SIZE
        }
    });
    let overlap = user.overlap.or(overlap).unwrap_or_else(|| {
        if profile.length < 1500 {
            fixed / 10
        } else {
            fixed * 15 / 100
        }
    });
    let window = user.sentence_window_size.or(window).unwrap_or(3);

    ResolvedConfig {
        strategy,
        fixed_size: fixed,
        overlap,
        sentence_window_size: window,
        min_chunk_size: min,
        max_chunk_size: max,
        preserve_paragraphs: user.preserve_paragraphs.unwrap_or(true),
        extract_keywords: user.extract_keywords.unwrap_or(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkType;

    #[test]
    fn test_empty_content_rejected() {
        let err = process_document("   \n  ", "note.txt", "note", None).unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[test]
    fn test_very_small_document_single_chunk() {
        let doc = process_document("Hello world. This is a short note.", "note.txt", "note", None)
            .unwrap();
        assert_eq!(doc.chunks.len(), 1);
        assert_eq!(doc.chunks[0].chunk_type, ChunkType::Document);
        assert_eq!(doc.chunks[0].section, "complete");
        assert_eq!(doc.metadata["chunk_count"], serde_json::json!(1));
    }

    #[test]
    fn test_user_strategy_wins() {
        let user = ChunkingConfig {
            strategy: Some(ChunkingStrategy::Semantic),
            ..Default::default()
        };
        let content = "first paragraph with a decent amount of text\n\n".repeat(30);
        let doc = process_document(&content, "x", "", Some(&user)).unwrap();
        assert_eq!(
            doc.metadata["chunking_strategy"],
            serde_json::json!("semantic")
        );
    }

    #[test]
    fn test_chunk_indices_unique_and_sequential() {
        let content = "## Heading one\ntext goes here\n\n".repeat(700); // large doc
        let doc = process_document(&content, "x", "", None).unwrap();
        for (i, chunk) in doc.chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }

    #[test]
    fn test_deterministic_output() {
        let content = "EXPERIENCE\nshipped a storage engine in rust\n\nEDUCATION\nstudied systems programming at a state school\n\nSKILLS\nrust, sql, distributed systems\n";
        let a = process_document(content, "r", "resume", None).unwrap();
        let b = process_document(content, "r", "resume", None).unwrap();
        assert_eq!(a.chunks.len(), b.chunks.len());
        for (x, y) in a.chunks.iter().zip(b.chunks.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.section, y.section);
            assert_eq!(x.chunk_type, y.chunk_type);
        }
    }

    #[test]
    fn test_resolution_very_small_above_600() {
        let profile = analysis::analyze(&"word ".repeat(160)); // 800 chars
        let cfg = resolve_config(&profile, None);
        assert_eq!(cfg.strategy, ChunkingStrategy::Structural);
        assert_eq!(cfg.min_chunk_size, 800_usize.div_ceil(3).max(250));
        assert_eq!(cfg.max_chunk_size, 400);
    }

    #[test]
    fn test_resolution_large_doc() {
        let profile = analysis::analyze(&"word ".repeat(4200)); // 21000 chars
        let cfg = resolve_config(&profile, None);
        assert_eq!(cfg.strategy, ChunkingStrategy::ParentDocument);
        assert_eq!(cfg.max_chunk_size, 1200);
        assert_eq!(cfg.min_chunk_size, 400);
        assert_eq!(cfg.overlap, PREFERRED_CHUNK_SIZE * 15 / 100);
    }

    #[test]
    fn test_resolution_defaults_flags_true() {
        let profile = analysis::analyze("hello there");
        let cfg = resolve_config(&profile, None);
        assert!(cfg.preserve_paragraphs);
        assert!(cfg.extract_keywords);
    }
}
