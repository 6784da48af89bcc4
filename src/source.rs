//! Research sources and the per-source content analysis attached once a
//! source has been fetched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Years that count as "recent" scholarship for quality heuristics.
const RECENT_YEARS: std::ops::RangeInclusive<i32> = 2020..=2024;

/// Kind of publication a source points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// General web page
    #[default]
    Web,
    /// Paper or journal article (e.g. from Semantic Scholar)
    Academic,
    /// Podcast episode
    Podcast,
}

/// Where a source came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Capability provider that produced the source ("brave", "semantic_scholar", ...)
    pub provider: String,
    /// Query that surfaced the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
    /// Show or journal the source was published in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

/// Result of fetching and analysing a source's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    /// First part of the fetched text (bounded)
    pub excerpt: String,
    /// Model-written or extractive summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Theological themes mentioned in the text
    #[serde(default)]
    pub themes: Vec<String>,
    /// Scripture references such as "Genesis 1:1-3"
    #[serde(default)]
    pub biblical_references: Vec<String>,
    /// Detected author perspective, if any keyword matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspective: Option<String>,
}

/// A discovered source.
///
/// # Invariants
/// - `url` and `title` are non-empty for every source admitted into a research context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub provenance: Provenance,
    /// Present once the content has been fetched and processed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ContentAnalysis>,
}

impl Source {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            description: description.into(),
            source_type: SourceType::Web,
            provenance: Provenance::default(),
            analysis: None,
        }
    }

    pub fn with_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// A source is admissible when it carries both a title and a URL.
    pub fn is_admissible(&self) -> bool {
        !self.title.trim().is_empty() && !self.url.trim().is_empty()
    }

    pub fn is_content_processed(&self) -> bool {
        self.analysis.is_some()
    }

    /// Lowercased concatenation of everything known about the source.
    pub fn searchable_text(&self) -> String {
        let mut text = format!("{} {} {}", self.title, self.url, self.description);
        if let Some(analysis) = &self.analysis {
            text.push(' ');
            text.push_str(&analysis.excerpt);
            if let Some(summary) = &analysis.summary {
                text.push(' ');
                text.push_str(summary);
            }
        }
        text.to_lowercase()
    }

    /// Whether any known text of the source mentions `keyword` (case-insensitive).
    pub fn mentions(&self, keyword: &str) -> bool {
        self.searchable_text().contains(&keyword.to_lowercase())
    }

    /// Whether the description mentions `keyword` (case-insensitive).
    pub fn description_mentions(&self, keyword: &str) -> bool {
        self.description
            .to_lowercase()
            .contains(&keyword.to_lowercase())
    }

    pub fn is_podcast(&self) -> bool {
        self.source_type == SourceType::Podcast
    }

    pub fn is_academic(&self) -> bool {
        self.source_type == SourceType::Academic || self.mentions("academic")
    }

    /// Heuristic recency: the description mentions a year in 2020..=2024.
    pub fn is_recent(&self) -> bool {
        RECENT_YEARS
            .into_iter()
            .any(|year| self.description.contains(&year.to_string()))
    }

    /// Perspective detected from fetched content, if any.
    pub fn perspective(&self) -> Option<&str> {
        self.analysis
            .as_ref()
            .and_then(|a| a.perspective.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admissibility_requires_title_and_url() {
        assert!(Source::new("Title", "https://a.example", "").is_admissible());
        assert!(!Source::new("", "https://a.example", "").is_admissible());
        assert!(!Source::new("Title", "  ", "").is_admissible());
    }

    #[test]
    fn recency_looks_for_years_in_description() {
        assert!(Source::new("t", "u", "published in 2023 by").is_recent());
        assert!(!Source::new("t", "u", "published in 1998").is_recent());
        assert!(!Source::new("t", "u", "published in 2025").is_recent());
    }

    #[test]
    fn academic_by_type_or_text() {
        assert!(Source::new("t", "u", "").with_type(SourceType::Academic).is_academic());
        assert!(Source::new("An Academic Review", "u", "").is_academic());
        assert!(!Source::new("Blog post", "u", "sermon notes").is_academic());
    }

    #[test]
    fn searchable_text_includes_analysis() {
        let mut source = Source::new("Title", "https://x.example", "desc");
        assert!(!source.mentions("covenant"));
        source.analysis = Some(ContentAnalysis {
            excerpt: "The Covenant theme".to_string(),
            ..Default::default()
        });
        assert!(source.mentions("covenant"));
        assert!(source.is_content_processed());
    }
}
