//! Segmentation strategies.
//!
//! Each strategy takes the document content and the resolved configuration
//! and emits an ordered chunk list. Positions are best-effort byte offsets:
//! absolute for fixed-size and parent chunks, section-relative for section
//! parts, absent for sentence windows.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::analysis::{DocumentCategory, DocumentProfile};
use super::keywords::extract_keywords;
use super::{ResolvedConfig, MIN_MEANINGFUL_CHUNK_SIZE};
use crate::models::{Chunk, ChunkType};

/// A detected document section: heading plus the lines under it (the heading
/// line included).
#[derive(Debug, Clone)]
struct DocumentSection {
    title: String,
    content: String,
}

static SECTION_HEADING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^([A-Z][A-Z\s]{2,}):?\s*$").unwrap(),
        Regex::new(
            r"(?i)^(EXPERIENCE|EDUCATION|SKILLS|SUMMARY|OBJECTIVE|PROJECTS|ACHIEVEMENTS|AWARDS|CERTIFICATIONS|LANGUAGES|REFERENCES|CONTACT|ABOUT)\b.*$",
        )
        .unwrap(),
        Regex::new(r"^#+\s+(.+)$").unwrap(),
        Regex::new(r"^(\d+\.\s+.+)$").unwrap(),
        Regex::new(r"^([IVX]+\.\s+.+)$").unwrap(),
    ]
});

static SENTENCE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+\s+").unwrap());

fn annotate(chunk: &mut Chunk, cfg: &ResolvedConfig) {
    if cfg.extract_keywords {
        chunk.keywords = extract_keywords(&chunk.text);
    }
}

/// Largest char-boundary index not greater than `i`.
fn floor_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Sliding fixed-size windows with overlap.
///
/// When the window edge lands mid-word, the cut retreats up to 50 bytes to
/// the last whitespace. Content that fits in a single window is kept as one
/// `document` chunk covering the whole text.
pub fn fixed_size_chunks(content: &str, document_id: &str, cfg: &ResolvedConfig) -> Vec<Chunk> {
    if content.len() <= cfg.fixed_size {
        let mut chunk = Chunk::new(document_id, content, ChunkType::Document, 0);
        chunk.section = "complete".to_string();
        chunk.start_pos = Some(0);
        chunk.end_pos = Some(content.len());
        annotate(&mut chunk, cfg);
        return vec![chunk];
    }

    let bytes = content.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < content.len() {
        let mut end = (start + cfg.fixed_size).min(content.len());

        if end < content.len() && !bytes[end].is_ascii_whitespace() {
            let floor = (start + cfg.fixed_size).saturating_sub(50).max(start + 1);
            let mut i = end;
            while i > floor {
                if bytes[i].is_ascii_whitespace() {
                    end = i;
                    break;
                }
                i -= 1;
            }
        }

        let end = floor_boundary(content, end);
        let from = floor_boundary(content, start);
        let text = content[from..end].trim();
        if !text.is_empty() {
            let mut chunk = Chunk::new(document_id, text, ChunkType::FixedSize, index);
            chunk.section = "document".to_string();
            chunk.start_pos = Some(from);
            chunk.end_pos = Some(end);
            annotate(&mut chunk, cfg);
            chunks.push(chunk);
            index += 1;
        }

        if end >= content.len() {
            break;
        }
        // step back by the overlap, but always make forward progress
        let next = end.saturating_sub(cfg.overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Section-aware structural chunking.
///
/// Very small documents take the minimal path; documents where no section
/// heading is recognized fall back to sentence windows.
pub fn structural_chunks(
    content: &str,
    document_id: &str,
    cfg: &ResolvedConfig,
    profile: &DocumentProfile,
) -> Vec<Chunk> {
    if profile.category == DocumentCategory::VerySmall {
        return minimal_chunks(content, document_id, cfg);
    }

    let mut chunks = Vec::new();
    let mut index = 0usize;
    for section in detect_sections(content) {
        section_chunks(&section, document_id, cfg, &mut index, &mut chunks);
    }

    if chunks.is_empty() {
        return sentence_window_chunks(content, document_id, cfg);
    }
    chunks
}

fn detect_sections(content: &str) -> Vec<DocumentSection> {
    let lines: Vec<&str> = content.lines().collect();
    let mut sections = Vec::new();
    let mut current_title = "document".to_string();
    let mut current_start = 0usize;

    for (i, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let heading = SECTION_HEADING_PATTERNS
            .iter()
            .find_map(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        if let Some(title) = heading {
            if current_start < i {
                let body = lines[current_start..i].join("\n");
                if !body.trim().is_empty() {
                    sections.push(DocumentSection {
                        title: current_title.clone(),
                        content: body,
                    });
                }
            }
            current_title = title;
            current_start = i;
        }
    }

    if current_start < lines.len() {
        let body = lines[current_start..].join("\n");
        if !body.trim().is_empty() {
            sections.push(DocumentSection {
                title: current_title,
                content: body,
            });
        }
    }

    if sections.is_empty() {
        sections.push(DocumentSection {
            title: "document".to_string(),
            content: content.to_string(),
        });
    }
    sections
}

fn section_chunks(
    section: &DocumentSection,
    document_id: &str,
    cfg: &ResolvedConfig,
    index: &mut usize,
    out: &mut Vec<Chunk>,
) {
    let content = section.content.trim();
    if content.is_empty() {
        return;
    }

    // small enough sections stay whole
    if content.len() <= cfg.max_chunk_size {
        let mut chunk = Chunk::new(document_id, content, ChunkType::Section, *index);
        chunk.section = section.title.clone();
        chunk.start_pos = Some(0);
        chunk.end_pos = Some(content.len());
        annotate(&mut chunk, cfg);
        out.push(chunk);
        *index += 1;
        return;
    }

    if !cfg.preserve_paragraphs {
        // caller opted out of paragraph alignment: plain windows, retagged
        let windows = fixed_size_chunks(content, document_id, cfg);
        for mut chunk in windows {
            chunk.chunk_type = ChunkType::SectionPart;
            chunk.section = section.title.clone();
            chunk.chunk_index = *index;
            out.push(chunk);
            *index += 1;
        }
        return;
    }

    // greedy paragraph accumulation up to the size bounds
    let paragraphs: Vec<&str> = content.split("\n\n").collect();
    let mut current = String::new();
    let mut start_pos = 0usize;

    for (i, para) in paragraphs.iter().enumerate() {
        let mut test = current.clone();
        if !test.is_empty() {
            test.push_str("\n\n");
        }
        test.push_str(para);

        let is_last = i == paragraphs.len() - 1;
        if test.len() >= cfg.min_chunk_size && (test.len() >= cfg.max_chunk_size || is_last) {
            push_section_part(document_id, &section.title, cfg, &test, start_pos, index, out);
            start_pos += test.len() + 2;
            current.clear();
        } else {
            current = test;
        }
    }

    // a sub-minimum tail still becomes its own chunk rather than vanishing
    if !current.trim().is_empty() {
        let tail = current.clone();
        push_section_part(document_id, &section.title, cfg, &tail, start_pos, index, out);
    }
}

fn push_section_part(
    document_id: &str,
    title: &str,
    cfg: &ResolvedConfig,
    text: &str,
    start: usize,
    index: &mut usize,
    out: &mut Vec<Chunk>,
) {
    let mut chunk = Chunk::new(document_id, text.trim(), ChunkType::SectionPart, *index);
    chunk.section = title.to_string();
    chunk.start_pos = Some(start);
    chunk.end_pos = Some(start + text.len());
    annotate(&mut chunk, cfg);
    out.push(chunk);
    *index += 1;
}

/// Minimal chunking for very small documents: one chunk when the content
/// fits under `min_chunk_size`, otherwise greedy paragraph groups.
pub fn minimal_chunks(content: &str, document_id: &str, cfg: &ResolvedConfig) -> Vec<Chunk> {
    if content.len() <= cfg.min_chunk_size {
        let mut chunk = Chunk::new(document_id, content, ChunkType::Document, 0);
        chunk.section = "complete".to_string();
        chunk.start_pos = Some(0);
        chunk.end_pos = Some(content.len());
        annotate(&mut chunk, cfg);
        return vec![chunk];
    }

    let paragraphs: Vec<&str> = content.split("\n\n").collect();
    if paragraphs.len() < 2 {
        return sentence_window_chunks(content, document_id, cfg);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut index = 0usize;
    let mut start_pos = 0usize;

    for (i, para) in paragraphs.iter().enumerate() {
        let mut test = current.clone();
        if !test.is_empty() {
            test.push_str("\n\n");
        }
        test.push_str(para);

        if test.len() >= cfg.min_chunk_size || i == paragraphs.len() - 1 {
            let mut chunk = Chunk::new(document_id, test.trim(), ChunkType::ParagraphGroup, index);
            chunk.section = format!("section_{}", index + 1);
            chunk.start_pos = Some(start_pos);
            chunk.end_pos = Some(start_pos + test.len());
            annotate(&mut chunk, cfg);
            chunks.push(chunk);
            index += 1;
            start_pos += test.len() + 2;
            current.clear();
        } else {
            current = test;
        }
    }

    chunks
}

/// Paragraph-aware greedy grouping between the min/max size bounds.
pub fn semantic_chunks(content: &str, document_id: &str, cfg: &ResolvedConfig) -> Vec<Chunk> {
    let paragraphs: Vec<&str> = content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut index = 0usize;
    let mut start_pos = 0usize;

    for (i, para) in paragraphs.iter().enumerate() {
        let mut test = current.clone();
        if !test.is_empty() {
            test.push_str("\n\n");
        }
        test.push_str(para);

        let is_last = i == paragraphs.len() - 1;
        if test.len() >= cfg.min_chunk_size && (test.len() >= cfg.max_chunk_size || is_last) {
            push_semantic(document_id, cfg, &test, start_pos, &mut index, &mut chunks);
            start_pos += test.len() + 2;
            current.clear();
        } else {
            current = test;
        }
    }

    if !current.trim().is_empty() {
        let tail = current.clone();
        push_semantic(document_id, cfg, &tail, start_pos, &mut index, &mut chunks);
    }

    chunks
}

fn push_semantic(
    document_id: &str,
    cfg: &ResolvedConfig,
    text: &str,
    start: usize,
    index: &mut usize,
    chunks: &mut Vec<Chunk>,
) {
    let mut chunk = Chunk::new(document_id, text.trim(), ChunkType::Semantic, *index);
    chunk.section = "content".to_string();
    chunk.start_pos = Some(start);
    chunk.end_pos = Some(start + text.len());
    annotate(&mut chunk, cfg);
    chunks.push(chunk);
    *index += 1;
}

/// Overlapping windows of whole sentences, stepping by half a window.
///
/// Windows below `min_chunk_size` are skipped unless they are the final
/// window. Positions are not recorded: a window's text is re-joined from
/// split sentences and no longer maps onto the original byte stream.
pub fn sentence_window_chunks(content: &str, document_id: &str, cfg: &ResolvedConfig) -> Vec<Chunk> {
    let sentences: Vec<&str> = SENTENCE_SPLIT_RE.split(content).collect();
    let window = if cfg.sentence_window_size == 0 {
        3
    } else {
        cfg.sentence_window_size
    };
    let step = (window / 2).max(1);

    let mut chunks = Vec::new();
    let mut index = 0usize;
    let mut i = 0usize;

    while i < sentences.len() {
        let end = (i + window).min(sentences.len());
        let text = sentences[i..end].join(". ").trim().to_string();
        let is_final = end >= sentences.len();

        if (text.len() >= cfg.min_chunk_size || is_final) && !text.is_empty() {
            let mut chunk = Chunk::new(document_id, &text, ChunkType::SentenceWindow, index);
            chunk.section = "content".to_string();
            annotate(&mut chunk, cfg);
            chunks.push(chunk);
            index += 1;
        }

        if is_final {
            break;
        }
        i += step;
    }

    chunks
}

/// Two-level hierarchy: coarse parents aligned to blank-line boundaries,
/// fine children carved from each parent with fixed windows.
///
/// Parents come first in the returned list, then all children.
pub fn parent_document_chunks(content: &str, document_id: &str, cfg: &ResolvedConfig) -> Vec<Chunk> {
    let parent_size = cfg.max_chunk_size * 2;
    let bytes = content.as_bytes();

    let mut parents: Vec<Chunk> = Vec::new();
    let mut children: Vec<Chunk> = Vec::new();
    let mut start = 0usize;
    let mut parent_index = 0usize;

    while start < content.len() {
        let mut end = (start + parent_size).min(content.len());

        if end < content.len() {
            // retreat up to 200 bytes to a paragraph boundary
            let floor = (start + parent_size).saturating_sub(200).max(start + 1);
            let mut i = end;
            while i > floor {
                if bytes.get(i) == Some(&b'\n') && bytes.get(i + 1) == Some(&b'\n') {
                    end = i;
                    break;
                }
                i -= 1;
            }
        }

        let end = floor_boundary(content, end).max(start + 1).min(content.len());
        let from = floor_boundary(content, start);
        let text = content[from..end].trim();

        if !text.is_empty() {
            let mut parent = Chunk::new(document_id, text, ChunkType::Parent, parent_index);
            parent.section = format!("section_{}", parent_index + 1);
            parent.start_pos = Some(from);
            parent.end_pos = Some(end);
            annotate(&mut parent, cfg);

            let child_cfg = ResolvedConfig {
                fixed_size: cfg.min_chunk_size.max(1),
                overlap: cfg.overlap / 2,
                ..cfg.clone()
            };
            let parent_text = parent.text.clone();
            let mut carved = fixed_size_chunks(&parent_text, document_id, &child_cfg);
            for child in &mut carved {
                child.parent_chunk_id = Some(parent.id.clone());
                child.section = parent.section.clone();
                child.chunk_type = ChunkType::Child;
                parent.child_chunk_ids.push(child.id.clone());
            }
            children.extend(carved);
            parents.push(parent);
            parent_index += 1;
        }

        start = end;
    }

    parents.extend(children);
    parents
}

/// Post-segmentation sweep: merge sub-meaningful fragments forward, then
/// synthesize section parents for large documents.
pub fn post_process(mut chunks: Vec<Chunk>, profile: &DocumentProfile) -> Vec<Chunk> {
    let mut kept: Vec<Chunk> = Vec::with_capacity(chunks.len());
    let mut i = 0usize;

    while i < chunks.len() {
        if chunks[i].text.len() < MIN_MEANINGFUL_CHUNK_SIZE / 2 && i + 1 < chunks.len() {
            let fragment = chunks[i].clone();
            let next = &mut chunks[i + 1];
            next.text = format!("{}\n\n{}", fragment.text, next.text);
            next.start_pos = fragment.start_pos;
            next.keywords.extend(fragment.keywords);
        } else {
            kept.push(chunks[i].clone());
        }
        i += 1;
    }

    if matches!(
        profile.category,
        DocumentCategory::Large | DocumentCategory::VeryLarge
    ) {
        kept = add_section_parents(kept);
    }

    kept
}

/// Groups chunks by section and synthesizes a `parent` chunk over every
/// group of three or more, re-pointing the members' parent links to it.
/// Parents are emitted ahead of their members; group order follows first
/// appearance so the sweep stays deterministic.
fn add_section_parents(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Chunk>> = HashMap::new();

    for chunk in chunks {
        let key = if chunk.section.is_empty() {
            "document".to_string()
        } else {
            chunk.section.clone()
        };
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(chunk);
    }

    let mut out = Vec::new();
    for key in order {
        let mut group = groups.remove(&key).unwrap_or_default();
        if group.len() >= 3 {
            let combined: String = group
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let mut parent = Chunk::new(
                &group[0].document_id,
                &combined,
                ChunkType::Parent,
                group[0].chunk_index,
            );
            parent.section = key.clone();
            parent.child_chunk_ids = group.iter().map(|c| c.id.clone()).collect();
            for member in &mut group {
                member.parent_chunk_id = Some(parent.id.clone());
            }
            out.push(parent);
        }
        out.extend(group);
    }

    out
}
