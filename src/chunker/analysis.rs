//! Document characterization.
//!
//! Classifies a document by size and structural shape before a segmentation
//! strategy is chosen. All classification is mechanical: fixed byte
//! thresholds and fixed regexes, so the same content always lands in the
//! same class.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Size class thresholds, in bytes of content.
pub const VERY_SMALL_DOC: usize = 1000;
pub const SMALL_DOC: usize = 3000;
pub const MEDIUM_DOC: usize = 10_000;
pub const LARGE_DOC: usize = 50_000;

/// Size classification of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    VerySmall,
    Small,
    Medium,
    Large,
    VeryLarge,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::VerySmall => "very_small",
            DocumentCategory::Small => "small",
            DocumentCategory::Medium => "medium",
            DocumentCategory::Large => "large",
            DocumentCategory::VeryLarge => "very_large",
        }
    }
}

/// Structural classification of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    None,
    Simple,
    Sectioned,
    Hierarchical,
}

impl StructureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureType::None => "none",
            StructureType::Simple => "simple",
            StructureType::Sectioned => "sectioned",
            StructureType::Hierarchical => "hierarchical",
        }
    }
}

/// The result of characterizing a document.
#[derive(Debug, Clone)]
pub struct DocumentProfile {
    pub length: usize,
    pub category: DocumentCategory,
    pub structure: StructureType,
    pub has_structure: bool,
    /// Rough [0, 1] estimate from mean sentence length. Advisory.
    pub complexity: f64,
}

static HIERARCHICAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?m)^#+\s+").unwrap(),
        Regex::new(r"(?m)^[A-Z][A-Z\s]+:?$").unwrap(),
        Regex::new(r"(?m)^\d+\.\s+[A-Z]").unwrap(),
        Regex::new(r"(?m)^[IVX]+\.\s+").unwrap(),
    ]
});

static SECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(
            r"(?i)\b(experience|education|skills|summary|objective|projects|achievements|awards|certifications|languages|references|contact|about)\b",
        )
        .unwrap(),
        Regex::new(r"(?m)^[A-Z][A-Z\s]{3,}:?\s*$").unwrap(),
        Regex::new(r"(?m)^.{1,50}:$").unwrap(),
    ]
});

/// Characterizes a document: size class, structure class, complexity.
pub fn analyze(content: &str) -> DocumentProfile {
    let length = content.len();

    let category = match length {
        l if l < VERY_SMALL_DOC => DocumentCategory::VerySmall,
        l if l < SMALL_DOC => DocumentCategory::Small,
        l if l < MEDIUM_DOC => DocumentCategory::Medium,
        l if l < LARGE_DOC => DocumentCategory::Large,
        _ => DocumentCategory::VeryLarge,
    };

    let (structure, has_structure) = analyze_structure(content);

    DocumentProfile {
        length,
        category,
        structure,
        has_structure,
        complexity: complexity(content),
    }
}

/// Detects structural signals.
///
/// `hierarchical` needs at least three distinct header-pattern kinds (or five
/// section-keyword hits), `sectioned` at least one header kind (or two
/// keyword hits), `simple` at least three blank-line paragraph breaks.
fn analyze_structure(content: &str) -> (StructureType, bool) {
    let header_kinds = HIERARCHICAL_PATTERNS
        .iter()
        .filter(|re| re.is_match(content))
        .count();

    let section_hits: usize = SECTION_PATTERNS
        .iter()
        .map(|re| re.find_iter(content).count())
        .sum();

    if header_kinds >= 3 || section_hits >= 5 {
        (StructureType::Hierarchical, true)
    } else if header_kinds >= 1 || section_hits >= 2 {
        (StructureType::Sectioned, true)
    } else if content.matches("\n\n").count() >= 3 {
        (StructureType::Simple, true)
    } else {
        (StructureType::None, false)
    }
}

/// Mean words-per-sentence divided by 15, capped at 1.
fn complexity(content: &str) -> f64 {
    let words = content.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    let sentences = content.split('.').count();
    let avg = words as f64 / sentences as f64;
    (avg / 15.0).min(1.0)
}

/// The ideal number of chunks for a document of the given length.
pub fn optimal_chunk_count(length: usize) -> usize {
    match length {
        l if l < 600 => 1,
        l if l < 1200 => 2,
        l if l < 2000 => 3,
        l if l < 4000 => 4,
        l if l < 8000 => length.div_ceil(1500),
        _ => length.div_ceil(1000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_classes() {
        assert_eq!(analyze(&"x".repeat(500)).category, DocumentCategory::VerySmall);
        assert_eq!(analyze(&"x".repeat(1500)).category, DocumentCategory::Small);
        assert_eq!(analyze(&"x".repeat(5000)).category, DocumentCategory::Medium);
        assert_eq!(analyze(&"x".repeat(20_000)).category, DocumentCategory::Large);
        assert_eq!(
            analyze(&"x".repeat(60_000)).category,
            DocumentCategory::VeryLarge
        );
    }

    #[test]
    fn test_markdown_headers_are_sectioned() {
        let content = "# Title\n\nSome prose here.";
        let profile = analyze(content);
        assert!(profile.has_structure);
        assert_eq!(profile.structure, StructureType::Sectioned);
    }

    #[test]
    fn test_resume_sections_are_hierarchical() {
        let content = "EXPERIENCE\nwork history\n\nEDUCATION\nschool\n\nSKILLS\nthings\n\nSUMMARY\nabout\n\nPROJECTS\nstuff";
        let profile = analyze(content);
        assert_eq!(profile.structure, StructureType::Hierarchical);
    }

    #[test]
    fn test_paragraph_breaks_are_simple() {
        let content = "one paragraph here\n\nanother one\n\na third\n\nand a fourth";
        let profile = analyze(content);
        assert_eq!(profile.structure, StructureType::Simple);
    }

    #[test]
    fn test_plain_prose_has_no_structure() {
        let profile = analyze("just one flat run of text with no breaks at all");
        assert_eq!(profile.structure, StructureType::None);
        assert!(!profile.has_structure);
    }

    #[test]
    fn test_optimal_chunk_count_table() {
        assert_eq!(optimal_chunk_count(400), 1);
        assert_eq!(optimal_chunk_count(800), 2);
        assert_eq!(optimal_chunk_count(1500), 3);
        assert_eq!(optimal_chunk_count(3000), 4);
        assert_eq!(optimal_chunk_count(6000), 4); // ⌈6000/1500⌉
        assert_eq!(optimal_chunk_count(9500), 10); // ⌈9500/1000⌉
    }

    #[test]
    fn test_complexity_bounds() {
        assert_eq!(complexity(""), 0.0);
        let long = "word ".repeat(400); // one "sentence", many words
        assert_eq!(complexity(&long), 1.0);
    }
}
