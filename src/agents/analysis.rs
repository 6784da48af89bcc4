//! Keyword heuristics over fetched content and collected sources.
//!
//! Nothing here understands language: themes, perspectives and scripture
//! references are found by fixed keyword lists and one regex.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::source::{ContentAnalysis, Source};

/// Characters of fetched text kept on the source.
pub const EXCERPT_CHARS: usize = 1000;

/// Unique scripture references kept in synthesized insights.
const MAX_INSIGHT_REFERENCES: usize = 10;

static BIBLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d*\s*[a-zA-Z]+\s+\d+:\d+(-\d+)?\b").expect("static regex")
});

const THEMES: [&str; 14] = [
    "salvation",
    "grace",
    "redemption",
    "atonement",
    "justification",
    "sanctification",
    "eschatology",
    "christology",
    "pneumatology",
    "creation",
    "covenant",
    "trinity",
    "incarnation",
    "resurrection",
];

/// Book names and vocabulary marking a topic as biblical.
const BIBLICAL_WORDS: [&str; 84] = [
    "genesis", "exodus", "leviticus", "numbers", "deuteronomy", "joshua", "judges", "ruth",
    "samuel", "kings", "chronicles", "ezra", "nehemiah", "esther", "job", "psalm", "psalms",
    "proverbs", "ecclesiastes", "isaiah", "jeremiah", "lamentations", "ezekiel", "daniel",
    "hosea", "joel", "amos", "obadiah", "jonah", "micah", "nahum", "habakkuk", "zephaniah",
    "haggai", "zechariah", "malachi", "matthew", "mark", "luke", "john", "acts", "romans",
    "corinthians", "galatians", "ephesians", "philippians", "colossians", "thessalonians",
    "timothy", "titus", "philemon", "hebrews", "james", "peter", "jude", "revelation",
    "bible", "biblical", "scripture", "gospel", "gospels", "testament", "jesus", "christ",
    "god", "lord", "christian", "christianity", "church", "faith", "theology", "theological",
    "exegesis", "hermeneutics", "apostle", "apostles", "disciple", "disciples", "prophet",
    "prophets", "messiah", "torah", "pentateuch", "psalter",
];

/// Checked in order; a later match overrides an earlier one.
const PERSPECTIVE_KEYWORDS: [(&str, &[&str]); 3] = [
    ("evangelical", &["evangelical", "conservative", "reformed", "biblical inerrancy"]),
    ("progressive", &["progressive", "liberal", "historical-critical", "contextual"]),
    ("orthodox", &["orthodox", "traditional", "catholic", "patristic"]),
];

/// Description keywords standing in for themes of unprocessed sources.
const FALLBACK_THEMES: [(&str, &str); 3] = [
    ("historical context", "historical_context"),
    ("theological", "theological_implications"),
    ("scholarly", "scholarly_debate"),
];

/// Scripture references such as `Genesis 1:1-3`, in order of appearance.
pub fn biblical_references(text: &str) -> Vec<String> {
    BIBLE_REFERENCE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Whether a topic is about the Bible, by book names and biblical vocabulary.
pub fn is_biblical_topic(topic: &str) -> bool {
    let lower = topic.to_lowercase();
    lower.contains("song of songs")
        || lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| BIBLICAL_WORDS.contains(&word))
}

/// Theological themes mentioned in `text`.
pub fn themes(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    THEMES
        .iter()
        .filter(|theme| lower.contains(*theme))
        .map(|theme| theme.to_string())
        .collect()
}

/// Author perspective suggested by keywords, if any matched.
///
/// Precedence is orthodox, then progressive, then evangelical.
pub fn perspective(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let mut found = None;
    for (name, keywords) in PERSPECTIVE_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            found = Some(name.to_string());
        }
    }
    found
}

/// Analyse fetched text. `summary` is attached as-is.
pub fn analyze_content(text: &str, summary: Option<String>) -> ContentAnalysis {
    ContentAnalysis {
        excerpt: text.chars().take(EXCERPT_CHARS).collect(),
        summary,
        themes: themes(text),
        biblical_references: biblical_references(text),
        perspective: perspective(text),
    }
}

/// First sentences of `text`, up to `max_chars`, used when no model is available.
pub fn extractive_summary(text: &str, max_chars: usize) -> String {
    let mut summary = String::new();
    for sentence in text.split_inclusive(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        if !summary.is_empty() && summary.len() + sentence.len() + 1 > max_chars {
            break;
        }
        if !summary.is_empty() {
            summary.push(' ');
        }
        summary.push_str(sentence);
    }
    if summary.len() > max_chars {
        summary = summary.chars().take(max_chars).collect();
    }
    summary
}

/// Aggregated findings over all collected sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    /// Theme name to number of sources mentioning it
    pub key_themes: BTreeMap<String, usize>,
    /// Perspective name to number of processed sources ("unknown" included)
    pub perspectives: BTreeMap<String, usize>,
    pub biblical_references: Vec<String>,
    /// Sources whose content has been fetched and analysed
    pub content_analyzed: usize,
    /// Notes from gap-filling searches
    #[serde(default)]
    pub gaps_filled: Vec<String>,
    /// Notes from quality-improvement searches
    #[serde(default)]
    pub improvements: Vec<String>,
}

impl Insights {
    /// Distinct perspectives observed, ignoring "unknown".
    pub fn known_perspectives(&self) -> usize {
        self.perspectives.keys().filter(|p| p.as_str() != "unknown").count()
    }
}

/// Fold sources into insights.
///
/// Processed sources contribute their analysed themes, perspective and
/// references; unprocessed ones fall back to description keywords.
/// Notes in `previous` are carried over.
pub fn synthesize_insights(sources: &[Source], previous: &Insights) -> Insights {
    let mut key_themes: BTreeMap<String, usize> = BTreeMap::new();
    let mut perspectives: BTreeMap<String, usize> = BTreeMap::new();
    let mut seen_refs = BTreeSet::new();
    let mut references = Vec::new();
    let mut analyzed = 0;

    for source in sources {
        match &source.analysis {
            Some(analysis) => {
                analyzed += 1;
                for theme in &analysis.themes {
                    *key_themes.entry(theme.clone()).or_default() += 1;
                }
                let name = analysis.perspective.as_deref().unwrap_or("unknown");
                *perspectives.entry(name.to_string()).or_default() += 1;
                for reference in &analysis.biblical_references {
                    if references.len() < MAX_INSIGHT_REFERENCES && seen_refs.insert(reference.clone()) {
                        references.push(reference.clone());
                    }
                }
            }
            None => {
                for (keyword, theme) in FALLBACK_THEMES {
                    if source.description_mentions(keyword) {
                        *key_themes.entry(theme.to_string()).or_default() += 1;
                    }
                }
            }
        }
    }

    Insights {
        key_themes,
        perspectives,
        biblical_references: references,
        content_analyzed: analyzed,
        gaps_filled: previous.gaps_filled.clone(),
        improvements: previous.improvements.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_scripture_references() {
        let refs = biblical_references("See Genesis 1:1-3 and later John 3:16, also 1 Cor 13:4.");
        assert_eq!(refs, vec!["Genesis 1:1-3", "John 3:16", "1 Cor 13:4"]);
        assert!(biblical_references("no verses here").is_empty());
    }

    #[test]
    fn biblical_topics_are_recognized_by_whole_words() {
        assert!(is_biblical_topic("Genesis 1 creation account"));
        assert!(is_biblical_topic("Pauline theology in Romans"));
        assert!(is_biblical_topic("Song of Songs allegory"));
        assert!(!is_biblical_topic("Rust async runtimes"));
        assert!(!is_biblical_topic("goddess cults of Ugarit"));
    }

    #[test]
    fn themes_are_case_insensitive() {
        assert_eq!(
            themes("Grace and the COVENANT of creation"),
            vec!["grace", "creation", "covenant"]
        );
    }

    #[test]
    fn perspective_precedence() {
        assert_eq!(perspective("a conservative reading"), Some("evangelical".to_string()));
        assert_eq!(
            perspective("a conservative and liberal debate"),
            Some("progressive".to_string())
        );
        assert_eq!(
            perspective("evangelical, liberal and patristic voices"),
            Some("orthodox".to_string())
        );
        assert_eq!(perspective("neutral text"), None);
    }

    #[test]
    fn excerpt_is_bounded() {
        let text = "x".repeat(5000);
        let analysis = analyze_content(&text, None);
        assert_eq!(analysis.excerpt.chars().count(), EXCERPT_CHARS);
    }

    #[test]
    fn extractive_summary_keeps_whole_sentences() {
        let text = "First sentence here. Second one follows! Third is long enough to overflow.";
        assert_eq!(extractive_summary(text, 45), "First sentence here. Second one follows!");
        assert_eq!(extractive_summary("", 10), "");
        assert_eq!(extractive_summary(&"y".repeat(50), 10).len(), 10);
    }

    #[test]
    fn synthesis_mixes_analysis_and_fallback() {
        let mut processed = Source::new("Commentary", "https://a.example", "");
        processed.analysis = Some(analyze_content(
            "Patristic reading of creation and covenant in Genesis 1:1",
            None,
        ));
        let unprocessed = Source::new(
            "Overview",
            "https://b.example",
            "Historical context and scholarly notes",
        );
        let previous = Insights {
            gaps_filled: vec!["historical_context: 2 sources".to_string()],
            ..Default::default()
        };

        let insights = synthesize_insights(&[processed, unprocessed], &previous);
        assert_eq!(insights.content_analyzed, 1);
        assert_eq!(insights.key_themes.get("creation"), Some(&1));
        assert_eq!(insights.key_themes.get("historical_context"), Some(&1));
        assert_eq!(insights.key_themes.get("scholarly_debate"), Some(&1));
        assert_eq!(insights.perspectives.get("orthodox"), Some(&1));
        assert_eq!(insights.biblical_references, vec!["Genesis 1:1"]);
        assert_eq!(insights.gaps_filled.len(), 1);
    }

    #[test]
    fn unknown_perspective_is_not_counted_as_known() {
        let mut insights = Insights::default();
        insights.perspectives.insert("unknown".to_string(), 3);
        insights.perspectives.insert("academic".to_string(), 1);
        assert_eq!(insights.known_perspectives(), 1);
    }
}
