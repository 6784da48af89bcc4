//! Research goal: what the run should achieve, fixed once the run starts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::types::GoalError;

/// Perspectives required when the caller does not name any.
pub const DEFAULT_PERSPECTIVES: [&str; 4] = ["evangelical", "progressive", "orthodox", "academic"];

/// One of the standard completion criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionCriterion {
    SufficientSourcesFound,
    MultiplePerspectivesRepresented,
    KeyThemesIdentified,
    QualityScoreMet,
    CitationsValidated,
}

impl CompletionCriterion {
    pub const ALL: [CompletionCriterion; 5] = [
        Self::SufficientSourcesFound,
        Self::MultiplePerspectivesRepresented,
        Self::KeyThemesIdentified,
        Self::QualityScoreMet,
        Self::CitationsValidated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SufficientSourcesFound => "sufficient_sources_found",
            Self::MultiplePerspectivesRepresented => "multiple_perspectives_represented",
            Self::KeyThemesIdentified => "key_themes_identified",
            Self::QualityScoreMet => "quality_score_met",
            Self::CitationsValidated => "citations_validated",
        }
    }
}

impl std::fmt::Display for CompletionCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the agent should achieve, not how.
///
/// # Invariants
/// - `topic` is non-empty
/// - `0 <= quality_threshold <= 1`
/// - `1 <= min_sources <= max_sources`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchGoal {
    topic: String,
    mandate: String,
    quality_threshold: f64,
    min_sources: usize,
    max_sources: usize,
    required_perspectives: BTreeSet<String>,
    completion_criteria: BTreeSet<CompletionCriterion>,
}

impl ResearchGoal {
    /// Start building a goal for `topic` with default thresholds.
    pub fn builder(topic: impl Into<String>) -> ResearchGoalBuilder {
        ResearchGoalBuilder::new(topic)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn mandate(&self) -> &str {
        &self.mandate
    }

    pub fn quality_threshold(&self) -> f64 {
        self.quality_threshold
    }

    pub fn min_sources(&self) -> usize {
        self.min_sources
    }

    pub fn max_sources(&self) -> usize {
        self.max_sources
    }

    pub fn required_perspectives(&self) -> &BTreeSet<String> {
        &self.required_perspectives
    }

    pub fn completion_criteria(&self) -> &BTreeSet<CompletionCriterion> {
        &self.completion_criteria
    }
}

/// Builder for [`ResearchGoal`]; `build` checks every invariant.
#[derive(Debug, Clone)]
pub struct ResearchGoalBuilder {
    topic: String,
    mandate: Option<String>,
    quality_threshold: f64,
    min_sources: usize,
    max_sources: usize,
    required_perspectives: Option<BTreeSet<String>>,
    completion_criteria: Option<BTreeSet<CompletionCriterion>>,
}

impl ResearchGoalBuilder {
    fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            mandate: None,
            quality_threshold: 0.6,
            min_sources: 5,
            max_sources: 15,
            required_perspectives: None,
            completion_criteria: None,
        }
    }

    pub fn mandate(mut self, mandate: impl Into<String>) -> Self {
        self.mandate = Some(mandate.into());
        self
    }

    pub fn quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn min_sources(mut self, min: usize) -> Self {
        self.min_sources = min;
        self
    }

    pub fn max_sources(mut self, max: usize) -> Self {
        self.max_sources = max;
        self
    }

    /// Perspectives are lowercased; they are matched against lowercased text.
    pub fn perspectives<I, S>(mut self, perspectives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.required_perspectives = Some(
            perspectives
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        );
        self
    }

    pub fn criteria<I>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = CompletionCriterion>,
    {
        self.completion_criteria = Some(criteria.into_iter().collect());
        self
    }

    pub fn build(self) -> Result<ResearchGoal, GoalError> {
        let topic = self.topic.trim().to_string();
        if topic.is_empty() {
            return Err(GoalError::EmptyTopic);
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(GoalError::InvalidQualityThreshold(self.quality_threshold));
        }
        if self.min_sources == 0 {
            return Err(GoalError::ZeroMinSources);
        }
        if self.max_sources < self.min_sources {
            return Err(GoalError::SourceBoundsInverted {
                min: self.min_sources,
                max: self.max_sources,
            });
        }

        let mandate = self
            .mandate
            .unwrap_or_else(|| format!("Survey scholarly perspectives on {}", topic));

        Ok(ResearchGoal {
            topic,
            mandate,
            quality_threshold: self.quality_threshold,
            min_sources: self.min_sources,
            max_sources: self.max_sources,
            required_perspectives: self
                .required_perspectives
                .unwrap_or_else(|| DEFAULT_PERSPECTIVES.iter().map(|p| p.to_string()).collect()),
            completion_criteria: self
                .completion_criteria
                .unwrap_or_else(|| CompletionCriterion::ALL.into_iter().collect()),
        })
    }
}
