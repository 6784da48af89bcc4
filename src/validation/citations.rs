//! Citation extraction and matching against known sources.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::source::Source;
use crate::tools::UrlCheck;

/// Parenthetical and author-year citation shapes. Each runs independently,
/// so overlapping matches from different patterns are all reported.
static INLINE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // (Smith, 2023)
        r"\([^)]+\d{4}\)",
        // Smith (2023), Smith et al. (2023)
        r"\b\w+(?:\s+et\s+al\.?)?\s*\(\d{4}\)",
        // Smith and Jones (2023)
        r"\b\w+(?:\s+and\s+\w+)?\s*\(\d{4}\)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s\)\]]+").expect("static regex"));

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("static regex"));

/// Trailing characters dropped from URL matches (sentence punctuation).
const URL_TRAILING: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    /// "(Author, Year)"-like reference
    InlineReference,
    /// Raw URL
    Url,
}

/// A citation found in text.
///
/// `start`/`end` are byte offsets into the validated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub kind: CitationKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_source: Option<Source>,
    pub confidence: f64,
    /// Result of the live check, for URL citations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_check: Option<UrlCheck>,
}

impl Citation {
    fn new(kind: CitationKind, text: &str, start: usize, end: usize) -> Self {
        Self {
            kind,
            text: text.to_string(),
            start,
            end,
            validated: false,
            matched_source: None,
            confidence: 0.0,
            url_check: None,
        }
    }
}

/// Outcome of matching one citation against the known sources.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMatch {
    pub validated: bool,
    pub matched_source: Option<Source>,
    pub confidence: f64,
}

/// Extract inline references and URLs from `text`, tagged with byte offsets.
///
/// Inline patterns come first (in pattern order), then URLs.
pub fn extract_citations(text: &str) -> Vec<Citation> {
    let mut citations = Vec::new();

    for pattern in INLINE_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            citations.push(Citation::new(
                CitationKind::InlineReference,
                m.as_str(),
                m.start(),
                m.end(),
            ));
        }
    }

    for m in URL_PATTERN.find_iter(text) {
        let url = m.as_str().trim_end_matches(URL_TRAILING);
        if url.is_empty() {
            continue;
        }
        citations.push(Citation::new(
            CitationKind::Url,
            url,
            m.start(),
            m.start() + url.len(),
        ));
    }

    citations
}

fn word_set(text: &str) -> HashSet<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Match a citation against source titles.
///
/// A source matches when its title shares at least two words with the
/// citation text; the first matching source in declaration order wins.
/// Confidence is the shared-word count over the title word count, capped at 1.
pub fn match_against_sources(citation_text: &str, sources: &[Source]) -> SourceMatch {
    let citation_words = word_set(citation_text);

    for source in sources {
        let title_words = word_set(&source.title);
        let shared = title_words.intersection(&citation_words).count();
        if shared >= 2 {
            let confidence = (shared as f64 / title_words.len() as f64).min(1.0);
            return SourceMatch {
                validated: true,
                matched_source: Some(source.clone()),
                confidence,
            };
        }
    }

    SourceMatch {
        validated: false,
        matched_source: None,
        confidence: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(citations: &[Citation]) -> Vec<&str> {
        citations.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn extracts_parenthetical_reference_with_offsets() {
        let text = "Studies show X (Smith, 2023).";
        let citations = extract_citations(text);
        let first = &citations[0];
        assert_eq!(first.kind, CitationKind::InlineReference);
        assert_eq!(first.text, "(Smith, 2023)");
        assert_eq!(&text[first.start..first.end], "(Smith, 2023)");
        assert!(!first.validated);
    }

    #[test]
    fn author_year_shapes() {
        let citations = extract_citations("As Smith et al. (2020) and Brown and Green (2019) argue.");
        let found = texts(&citations);
        assert!(found.contains(&"Smith et al. (2020)"));
        assert!(found.contains(&"Brown and Green (2019)"));
    }

    #[test]
    fn overlapping_patterns_are_not_deduplicated() {
        let citations = extract_citations("Smith (2023) wrote it.");
        let count = citations.iter().filter(|c| c.text.ends_with("(2023)")).count();
        assert!(count >= 2);
    }

    #[test]
    fn urls_drop_trailing_punctuation() {
        let text = "See https://example.com/genesis-study. Also (https://a.example/x), done";
        let urls: Vec<Citation> = extract_citations(text)
            .into_iter()
            .filter(|c| c.kind == CitationKind::Url)
            .collect();
        assert_eq!(texts(&urls), vec!["https://example.com/genesis-study", "https://a.example/x"]);
        assert_eq!(&text[urls[0].start..urls[0].end], "https://example.com/genesis-study");
    }

    #[test]
    fn single_shared_word_does_not_match() {
        let sources = vec![Source::new("Smith Study on X", "https://s.example", "")];
        let result = match_against_sources("(Smith, 2023)", &sources);
        assert!(!result.validated);
        assert!(result.matched_source.is_none());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn two_shared_words_match_first_source() {
        let sources = vec![
            Source::new("Unrelated Title", "https://u.example", ""),
            Source::new("Smith Creation Narratives", "https://a.example", ""),
            Source::new("Smith Creation", "https://b.example", ""),
        ];
        let result = match_against_sources("Smith Creation (2023)", &sources);
        assert!(result.validated);
        assert_eq!(
            result.matched_source.map(|s| s.url),
            Some("https://a.example".to_string())
        );
        assert!((result.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn no_text_means_no_citations() {
        assert!(extract_citations("").is_empty());
        assert!(extract_citations("No references here at all.").is_empty());
    }
}
