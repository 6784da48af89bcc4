//! Hallucination scoring over synthesized text.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::citations::{extract_citations, match_against_sources, Citation, CitationKind};
use super::claims::{char_index, extract_claims, Claim};
use super::store::ValidationStore;
use super::ValidationError;
use crate::config::ResearchConfig;
use crate::source::Source;
use crate::tools::UrlValidator;

/// Content larger than this is rejected by [`CitationValidator::hallucination_check`].
pub const MAX_CONTENT_BYTES: usize = 1024 * 1024;

/// Risk reported when the validator itself fails.
pub const NEUTRAL_RISK: f64 = 0.5;

/// Citations with lower confidence are reported as weak matches.
const LOW_CONFIDENCE: f64 = 0.5;

/// Outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub content: String,
    pub citations: Vec<Citation>,
    pub claims: Vec<Claim>,
    pub unsupported_claims: Vec<Claim>,
    /// Always within `[0, 1]`
    pub hallucination_risk: f64,
    pub validation_passed: bool,
    pub recommendations: Vec<String>,
    /// Set when the pass degraded to a neutral result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    /// Result used when validation could not run.
    pub fn neutral(content: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            citations: Vec::new(),
            claims: Vec::new(),
            unsupported_claims: Vec::new(),
            hallucination_risk: NEUTRAL_RISK,
            validation_passed: false,
            recommendations: vec![
                "Hallucination check failed - manual review required".to_string()
            ],
            error: Some(error.into()),
        }
    }

    pub fn invalid_citation_count(&self) -> usize {
        self.citations.iter().filter(|c| !c.validated).count()
    }
}

/// Weighted hallucination risk in `[0, 1]`.
///
/// `0.5 * unsupported_ratio + 0.3 * invalid_citation_ratio + 0.2 * (1 - coverage)`,
/// where coverage is citations per claim. Text without claims carries no risk.
pub fn hallucination_risk(claims: usize, unsupported: usize, citations: usize, invalid: usize) -> f64 {
    if claims == 0 {
        return 0.0;
    }
    let unsupported_ratio = unsupported as f64 / claims as f64;
    let invalid_ratio = invalid as f64 / citations.max(1) as f64;
    let coverage = citations as f64 / claims as f64;
    let risk = 0.5 * unsupported_ratio + 0.3 * invalid_ratio + 0.2 * (1.0 - coverage).max(0.0);
    risk.clamp(0.0, 1.0)
}

fn recommendations(citations: &[Citation], unsupported: &[Claim]) -> Vec<String> {
    let mut out = Vec::new();

    let invalid_urls = citations
        .iter()
        .filter(|c| c.kind == CitationKind::Url && !c.validated)
        .count();
    if invalid_urls > 0 {
        out.push(format!("Fix {} invalid URLs", invalid_urls));
    }

    if !unsupported.is_empty() {
        out.push(format!(
            "Add citations for {} unsupported claims",
            unsupported.len()
        ));
    }

    let weak = citations
        .iter()
        .filter(|c| c.kind == CitationKind::InlineReference && c.confidence < LOW_CONFIDENCE)
        .count();
    if weak > 0 {
        out.push(format!("Improve citation matching for {} citations", weak));
    }

    out
}

/// Extracts claims and citations, validates citations and scores the result.
pub struct CitationValidator {
    url_validator: Arc<dyn UrlValidator>,
    store: Option<Arc<dyn ValidationStore>>,
    proximity: usize,
    pass_threshold: f64,
}

impl CitationValidator {
    pub fn new(url_validator: Arc<dyn UrlValidator>) -> Self {
        let defaults = ResearchConfig::default();
        Self {
            url_validator,
            store: None,
            proximity: defaults.citation_proximity,
            pass_threshold: defaults.risk_pass_threshold,
        }
    }

    /// Take proximity and pass threshold from the research configuration.
    pub fn with_config(mut self, config: &ResearchConfig) -> Self {
        self.proximity = config.citation_proximity;
        self.pass_threshold = config.risk_pass_threshold;
        self
    }

    /// Persist every keyed validation pass to `store`.
    pub fn with_store(mut self, store: Arc<dyn ValidationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn store(&self) -> Option<&Arc<dyn ValidationStore>> {
        self.store.as_ref()
    }

    /// Score `content` against `sources`.
    ///
    /// Inline references are matched against source titles; URLs are checked
    /// live and count as validated iff accessible. A claim is supported when a
    /// validated citation starts fewer than `citation_proximity` characters
    /// before or after the claim's first character.
    pub async fn detect_hallucinations(&self, content: &str, sources: &[Source]) -> ValidationResult {
        let claims = extract_claims(content);
        let mut citations = extract_citations(content);

        let url_checks = join_all(
            citations
                .iter()
                .filter(|c| c.kind == CitationKind::Url)
                .map(|c| self.url_validator.validate_url(&c.text)),
        )
        .await;
        let mut url_checks = url_checks.into_iter();

        for citation in citations.iter_mut() {
            match citation.kind {
                CitationKind::Url => {
                    let check = url_checks.next().unwrap_or_default();
                    citation.validated = check.accessible;
                    citation.confidence = if check.accessible { 1.0 } else { 0.0 };
                    citation.url_check = Some(check);
                }
                CitationKind::InlineReference => {
                    let matched = match_against_sources(&citation.text, sources);
                    citation.validated = matched.validated;
                    citation.matched_source = matched.matched_source;
                    citation.confidence = matched.confidence;
                }
            }
        }

        let anchors: Vec<usize> = citations
            .iter()
            .filter(|c| c.validated)
            .map(|c| char_index(content, c.start))
            .collect();
        let unsupported: Vec<Claim> = claims
            .iter()
            .filter(|claim| {
                let at = char_index(content, claim.start);
                !anchors.iter().any(|anchor| anchor.abs_diff(at) < self.proximity)
            })
            .cloned()
            .collect();

        let invalid = citations.iter().filter(|c| !c.validated).count();
        let risk = hallucination_risk(claims.len(), unsupported.len(), citations.len(), invalid);

        tracing::info!(
            "Validation: {} claims ({} unsupported), {} citations ({} invalid), risk {:.2}",
            claims.len(),
            unsupported.len(),
            citations.len(),
            invalid,
            risk
        );

        ValidationResult {
            content: content.to_string(),
            recommendations: recommendations(&citations, &unsupported),
            citations,
            claims,
            unsupported_claims: unsupported,
            hallucination_risk: risk,
            validation_passed: risk < self.pass_threshold,
            error: None,
        }
    }

    /// Validate with input checks, failing instead of degrading.
    pub async fn check(&self, content: &str, sources: &[Source]) -> Result<ValidationResult, ValidationError> {
        if content.len() > MAX_CONTENT_BYTES {
            return Err(ValidationError::ContentTooLarge {
                size: content.len(),
                limit: MAX_CONTENT_BYTES,
            });
        }
        Ok(self.detect_hallucinations(content, sources).await)
    }

    /// Validate and persist under `graph_id`; never fails.
    ///
    /// Any validation error becomes a neutral result. Store failures are
    /// logged and do not affect the returned result.
    pub async fn hallucination_check(
        &self,
        graph_id: Option<&str>,
        content: &str,
        sources: &[Source],
    ) -> ValidationResult {
        let result = match self.check(content, sources).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Hallucination check failed: {}", e);
                let preview: String = content.chars().take(1000).collect();
                ValidationResult::neutral(preview, e.to_string())
            }
        };

        if let (Some(store), Some(graph_id)) = (&self.store, graph_id) {
            if let Err(e) = store.save(graph_id, &result).await {
                tracing::warn!("Failed to save validation result for {}: {}", graph_id, e);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeUrlValidator;
    use crate::validation::InMemoryValidationStore;
    use proptest::prelude::*;

    fn validator(accessible: &[&str]) -> CitationValidator {
        CitationValidator::new(Arc::new(FakeUrlValidator::accessible(accessible)))
    }

    #[tokio::test]
    async fn single_word_overlap_leaves_claim_unsupported() {
        let sources = vec![Source::new("Smith Study on X", "https://s.example", "")];
        let result = validator(&[])
            .detect_hallucinations("Studies show X is real (Smith, 2023).", &sources)
            .await;

        let paren = result
            .citations
            .iter()
            .find(|c| c.text == "(Smith, 2023)")
            .unwrap();
        assert!(!paren.validated);
        assert_eq!(result.claims.len(), 1);
        assert_eq!(result.unsupported_claims.len(), 1);
        assert!(!result.validation_passed);
        assert!(result
            .recommendations
            .contains(&"Add citations for 1 unsupported claims".to_string()));
    }

    #[tokio::test]
    async fn accessible_url_supports_nearby_claim() {
        let text = "Studies show that creation accounts share motifs. See https://example.com/genesis-study.";
        let result = validator(&["https://example.com/genesis-study"])
            .detect_hallucinations(text, &[])
            .await;

        assert_eq!(result.claims.len(), 1);
        assert!(result.unsupported_claims.is_empty());
        let url = &result.citations[0];
        assert_eq!(url.kind, CitationKind::Url);
        assert!(url.validated);
        assert_eq!(url.url_check.as_ref().and_then(|c| c.status_code), Some(200));
        // one claim, one valid citation: no risk
        assert_eq!(result.hallucination_risk, 0.0);
        assert!(result.validation_passed);
    }

    #[tokio::test]
    async fn inaccessible_url_is_reported() {
        let text = "Research shows the motif is widespread in older texts https://dead.example/x";
        let result = validator(&[]).detect_hallucinations(text, &[]).await;
        assert!(result.recommendations.contains(&"Fix 1 invalid URLs".to_string()));
        // 0.5 * 1 + 0.3 * 1 + 0.2 * 0
        assert!((result.hallucination_risk - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn proximity_is_configurable() {
        let filler = "x".repeat(80);
        let text = format!(
            "According to the tablets the flood came first. {} https://example.com/flood",
            filler
        );
        let near = validator(&["https://example.com/flood"]);
        assert!(near.detect_hallucinations(&text, &[]).await.unsupported_claims.is_empty());

        let config = ResearchConfig {
            citation_proximity: 10,
            ..ResearchConfig::default()
        };
        let far = validator(&["https://example.com/flood"]).with_config(&config);
        assert_eq!(far.detect_hallucinations(&text, &[]).await.unsupported_claims.len(), 1);
    }

    #[tokio::test]
    async fn proximity_is_measured_from_claim_start() {
        let config = ResearchConfig {
            citation_proximity: 60,
            ..ResearchConfig::default()
        };
        // citation right after the claim, but 85 characters from its start
        let text = "According to the tablets the flood narrative was written after the exile in Babylon. \
                    https://example.com/flood";
        let result = validator(&["https://example.com/flood"])
            .with_config(&config)
            .detect_hallucinations(text, &[])
            .await;
        assert_eq!(result.claims.len(), 1);
        assert_eq!(result.unsupported_claims.len(), 1);
    }

    #[tokio::test]
    async fn proximity_counts_characters_not_bytes() {
        let config = ResearchConfig {
            citation_proximity: 120,
            ..ResearchConfig::default()
        };
        // 100 characters but 150 bytes between claim start and citation
        let text = "According to Walton the verb means to assign roles. \
                    ἐν ἀρχῇ ἐποίησεν ὁ θεὸς τὸν οὐρανὸν καὶ τὴν γῆν https://example.com/walton";
        let result = validator(&["https://example.com/walton"])
            .with_config(&config)
            .detect_hallucinations(text, &[])
            .await;
        assert_eq!(result.claims.len(), 1);
        assert!(result.unsupported_claims.is_empty());
    }

    #[tokio::test]
    async fn text_without_claims_has_no_risk() {
        let result = validator(&[]).detect_hallucinations("Short note. Nothing else.", &[]).await;
        assert!(result.claims.is_empty());
        assert_eq!(result.hallucination_risk, 0.0);
        assert!(result.validation_passed);
    }

    #[tokio::test]
    async fn oversized_content_degrades_to_neutral() {
        let huge = "a".repeat(MAX_CONTENT_BYTES + 1);
        let v = validator(&[]);
        assert!(matches!(
            v.check(&huge, &[]).await,
            Err(ValidationError::ContentTooLarge { .. })
        ));

        let result = v.hallucination_check(None, &huge, &[]).await;
        assert_eq!(result.hallucination_risk, NEUTRAL_RISK);
        assert!(!result.validation_passed);
        assert_eq!(
            result.recommendations,
            vec!["Hallucination check failed - manual review required".to_string()]
        );
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn keyed_checks_are_persisted() {
        let store = Arc::new(InMemoryValidationStore::new());
        let v = validator(&[]).with_store(store.clone());
        let result = v
            .hallucination_check(Some("graph-1"), "According to Smith the flood story is older.", &[])
            .await;
        assert_eq!(store.load("graph-1").await.unwrap(), Some(result));

        v.hallucination_check(None, "Nothing to see.", &[]).await;
        assert_eq!(store.len().await, 1);
    }

    proptest! {
        #[test]
        fn risk_is_bounded(claims in 0usize..50, unsupported in 0usize..50, citations in 0usize..50, invalid in 0usize..50) {
            let unsupported = unsupported.min(claims);
            let invalid = invalid.min(citations);
            let risk = hallucination_risk(claims, unsupported, citations, invalid);
            prop_assert!((0.0..=1.0).contains(&risk));
        }

        #[test]
        fn extraction_never_panics_and_offsets_are_valid(text in "\\PC{0,300}") {
            for citation in extract_citations(&text) {
                prop_assert!(citation.start <= citation.end && citation.end <= text.len());
                prop_assert!(text.is_char_boundary(citation.start));
            }
            for claim in extract_claims(&text) {
                prop_assert_eq!(&text[claim.start..claim.end], claim.text.as_str());
            }
        }
    }
}
