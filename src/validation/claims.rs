//! Claim extraction: sentences phrased as assertions that ought to carry a citation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Sentences shorter than this (in characters) are never claims.
const MIN_CLAIM_CHARS: usize = 20;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("static regex"));

static ASSERTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(is|was|are|were|has|had|shows|demonstrates|proves|indicates)\b.*\b(that|how|why)\b",
        r"(?i)\baccording to\b",
        r"(?i)\bstudies?\s+show\b",
        r"(?i)\bresearch\s+(indicates|shows|demonstrates)\b",
        r"(?i)\b\d{4}\b.*\bfound\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// A sentence that reads as a factual assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    /// Byte offset of the trimmed sentence in the source text
    pub start: usize,
    pub end: usize,
}

impl Claim {
    /// Distance in characters between the start of this claim and the byte
    /// offset `offset`, both taken in `text`.
    pub fn char_distance(&self, text: &str, offset: usize) -> usize {
        char_index(text, self.start).abs_diff(char_index(text, offset))
    }
}

/// Number of characters of `text` before byte offset `byte`.
pub fn char_index(text: &str, byte: usize) -> usize {
    text.char_indices().take_while(|(i, _)| *i < byte).count()
}

/// Split `text` into trimmed sentences with their byte spans.
fn sentences(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut cursor = 0;
    let ends = SENTENCE_END
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .chain(std::iter::once((text.len(), text.len())));

    for (end, next) in ends {
        let raw = &text[cursor..end];
        let leading = raw.len() - raw.trim_start().len();
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            out.push((cursor + leading, trimmed));
        }
        cursor = next;
    }
    out
}

/// Extract claims from `text`.
///
/// Sentences are split on `.`, `!` and `?`; fragments under 20 characters are
/// skipped and the rest are kept when any assertion pattern matches.
pub fn extract_claims(text: &str) -> Vec<Claim> {
    sentences(text)
        .into_iter()
        .filter(|(_, sentence)| sentence.chars().count() >= MIN_CLAIM_CHARS)
        .filter(|(_, sentence)| ASSERTION_PATTERNS.iter().any(|p| p.is_match(sentence)))
        .map(|(start, sentence)| Claim {
            text: sentence.to_string(),
            start,
            end: start + sentence.len(),
        })
        .collect()
}
