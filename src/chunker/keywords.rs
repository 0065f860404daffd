//! Frequency-based keyword extraction for chunk annotation.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

const MAX_KEYWORDS: usize = 10;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").unwrap());

/// Articles, prepositions, pronouns, and basic verbs that carry no signal.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will", "would",
    "could", "should", "this", "that", "these", "those", "i", "you", "he", "she", "it", "we",
    "they", "my", "your", "his", "her", "its", "our", "their",
];

/// Extracts the top keywords from a chunk's text.
///
/// Lowercases, tokenizes on `\b[a-zA-Z]{3,}\b`, drops stop words, counts
/// frequencies, and returns the ten most frequent terms. Ties are broken by
/// first appearance so the result is stable for identical input.
pub fn extract_keywords(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let lowered = text.to_lowercase();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: HashMap<&str, usize> = HashMap::new();

    for (position, m) in WORD_RE.find_iter(&lowered).enumerate() {
        let word = m.as_str();
        if STOP_WORDS.contains(&word) {
            continue;
        }
        *counts.entry(word).or_insert(0) += 1;
        first_seen.entry(word).or_insert(position);
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(first_seen[a.0].cmp(&first_seen[b.0])));

    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(word, _)| word.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert!(extract_keywords("").is_empty());
    }

    #[test]
    fn test_stop_words_dropped() {
        let keywords = extract_keywords("the cat and the dog and the cat");
        assert_eq!(keywords, vec!["cat", "dog"]);
    }

    #[test]
    fn test_frequency_order() {
        let keywords = extract_keywords("rust rust rust python python sqlite");
        assert_eq!(keywords, vec!["rust", "python", "sqlite"]);
    }

    #[test]
    fn test_ties_break_by_first_appearance() {
        let keywords = extract_keywords("zebra apple zebra apple");
        assert_eq!(keywords, vec!["zebra", "apple"]);
    }

    #[test]
    fn test_short_words_ignored() {
        let keywords = extract_keywords("go is ok but rust compiles");
        assert!(!keywords.contains(&"go".to_string()));
        assert!(!keywords.contains(&"ok".to_string()));
        assert!(keywords.contains(&"rust".to_string()));
    }

    #[test]
    fn test_capped_at_ten() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda omicron";
        assert_eq!(extract_keywords(text).len(), 10);
    }

    #[test]
    fn test_deterministic() {
        let text = "engineer built systems engineer shipped systems daily";
        assert_eq!(extract_keywords(text), extract_keywords(text));
    }
}
