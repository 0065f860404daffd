//! Post-retrieval re-ranking heuristics.
//!
//! Each boost is a small pure function of `(query, chunk, score)`; the
//! composite [`rerank_score`] multiplies them onto the original similarity
//! and caps the result at 1.0. Keeping the factors separate lets tests pin
//! each multiplier down independently and lets an operator strip one out
//! without touching the rest.

use crate::models::{Chunk, ChunkType, Metadata};

/// Terms that mark a query as asking about positions or roles.
const POSITION_KEYWORDS: &[&str] = &[
    "position",
    "role",
    "job",
    "title",
    "lead",
    "manager",
    "director",
    "senior",
    "junior",
    "principal",
    "team lead",
    "leadership",
];

/// Section substrings that mark a chunk as work-experience material.
const EXPERIENCE_TERMS: &[&str] = &["experience", "employment", "career", "work", "professional"];

/// True when the (lowercased) query asks about a position or role.
pub fn is_position_query(query: &str) -> bool {
    POSITION_KEYWORDS.iter().any(|kw| query.contains(kw))
}

fn is_experience_related(chunk: &Chunk) -> bool {
    if chunk.chunk_type == ChunkType::JobEntry {
        return true;
    }
    let section = chunk.section.to_lowercase();
    EXPERIENCE_TERMS.iter().any(|term| section.contains(term))
}

/// Some chunk shapes carry more answer-ready context than others.
pub fn chunk_type_boost(chunk_type: ChunkType) -> f64 {
    match chunk_type {
        ChunkType::Section | ChunkType::ParagraphGroup => 1.2,
        ChunkType::JobEntry => 1.4,
        ChunkType::SectionPart => 1.1,
        ChunkType::Parent => 1.3,
        _ => 1.0,
    }
}

/// Strong boost when a position-shaped query lands on experience material.
pub fn position_alignment_boost(query: &str, chunk: &Chunk) -> f64 {
    if is_position_query(query) && is_experience_related(chunk) {
        1.5
    } else {
        1.0
    }
}

/// Per-topic alignment between query terms and the chunk's section tag.
/// The experience/skill/education factors stack when several apply.
pub fn section_alignment_boost(query: &str, section: &str) -> f64 {
    if section.is_empty() {
        return 1.0;
    }
    let section = section.to_lowercase();
    let mut boost = 1.0;

    if is_position_query(query) && section.contains("experience") {
        boost *= 1.4;
    }
    if query.contains("skill") && section.contains("skill") {
        boost *= 1.4;
    }
    if query.contains("education") && section.contains("education") {
        boost *= 1.4;
    }
    boost
}

/// `1 + 0.15` per keyword↔query-token match, substring in either direction.
pub fn keyword_overlap_boost(query: &str, keywords: &[String]) -> f64 {
    let query_words: Vec<&str> = query.split_whitespace().collect();
    let mut matches = 0usize;

    for keyword in keywords {
        let keyword = keyword.to_lowercase();
        for word in &query_words {
            if keyword.contains(word) || word.contains(keyword.as_str()) {
                matches += 1;
            }
        }
    }

    1.0 + 0.15 * matches as f64
}

/// Chunks carrying a `position` metadata entry get a boost on position
/// queries.
pub fn metadata_position_boost(query: &str, metadata: &Metadata) -> f64 {
    let has_position = metadata
        .get("position")
        .and_then(|v| v.as_str())
        .is_some_and(|s| !s.is_empty());

    if has_position && is_position_query(query) {
        1.3
    } else {
        1.0
    }
}

/// Moderate-length chunks answer best; very long ones dilute the context.
pub fn length_boost(text_len: usize) -> f64 {
    if (100..=1000).contains(&text_len) {
        1.1
    } else if text_len > 2000 {
        0.9
    } else {
        1.0
    }
}

/// `1 + 0.2 × confidence`.
pub fn confidence_boost(confidence: f64) -> f64 {
    1.0 + confidence * 0.2
}

/// Composes every boost onto the original similarity, capped at 1.0.
pub fn rerank_score(query: &str, chunk: &Chunk, original_score: f64) -> f64 {
    let query = query.to_lowercase();

    let score = original_score
        * chunk_type_boost(chunk.chunk_type)
        * position_alignment_boost(&query, chunk)
        * section_alignment_boost(&query, &chunk.section)
        * keyword_overlap_boost(&query, &chunk.keywords)
        * metadata_position_boost(&query, &chunk.metadata)
        * length_boost(chunk.text.len())
        * confidence_boost(chunk.confidence);

    score.min(1.0)
}

/// Re-scores and sorts chunks by descending boosted score.
///
/// Returns the chunks, their original similarities, and their boosted
/// scores, all in the new order. The sort is stable, so equal boosted
/// scores keep their original similarity order and the result is a total
/// order.
pub fn rerank(
    query: &str,
    chunks: Vec<Chunk>,
    scores: Vec<f64>,
) -> (Vec<Chunk>, Vec<f64>, Vec<f64>) {
    let mut scored: Vec<(Chunk, f64, f64)> = chunks
        .into_iter()
        .zip(scores)
        .map(|(chunk, original)| {
            let boosted = rerank_score(query, &chunk, original);
            (chunk, original, boosted)
        })
        .collect();

    scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut chunks = Vec::with_capacity(scored.len());
    let mut originals = Vec::with_capacity(scored.len());
    let mut boosted = Vec::with_capacity(scored.len());
    for (chunk, original, score) in scored {
        chunks.push(chunk);
        originals.push(original);
        boosted.push(score);
    }
    (chunks, originals, boosted)
}
