//! Decision policy: chooses the next action from the current context.
//!
//! Everything here is a pure function of the context, so the same context
//! always yields the same decision and the same scores.
//!
//! # Decision Order
//! 1. Escape hatch on too many failed attempts
//! 2. Ready task of the research graph
//! 3. Heuristic fallback, first match wins: podcast lookup for biblical topics
//!    (once, when enabled), discover, cover perspectives, fetch content,
//!    improve quality, fill gaps, complete, synthesize

use std::collections::BTreeSet;

use super::analysis::is_biblical_topic;
use super::context::{Focus, ResearchContext};
use super::goal::CompletionCriterion;
use super::types::{Action, ActionKind, CompletionReason, DiscoveryStrategy, KnowledgeGap, QualityIssue};
use crate::config::ResearchConfig;

/// Below this many sources the policy searches broadly instead of by theme.
const BROAD_SEARCH_BELOW: usize = 3;

/// Sources fetched by one `FetchContent` action.
const FETCH_BATCH: usize = 3;

/// Sources standing in for validated citations.
const CITATION_PROXY_SOURCES: usize = 3;

/// Distinct perspectives or themes needed for full credit.
const DIVERSITY_TARGET: usize = 2;
const THEME_TARGET: usize = 3;

/// Themes checked in order when generating a targeted query.
const THEME_CHECKLIST: [(&str, &str); 3] = [
    ("historical_context", "historical context ancient near east"),
    ("theological_implications", "theological implications systematic theology"),
    ("scholarly_debate", "scholarly debate controversy"),
];

#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    max_failed_attempts: u32,
    loop_window: usize,
    min_satisfied_criteria: usize,
    podcast_discovery: bool,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new(&ResearchConfig::default())
    }
}

impl DecisionPolicy {
    pub fn new(config: &ResearchConfig) -> Self {
        Self {
            max_failed_attempts: config.max_failed_attempts,
            loop_window: config.max_same_action_attempts,
            min_satisfied_criteria: config.min_satisfied_criteria,
            podcast_discovery: false,
        }
    }

    /// Search podcasts first for biblical topics. Off unless a podcast
    /// provider is available.
    pub fn with_podcast_discovery(mut self, enabled: bool) -> Self {
        self.podcast_discovery = enabled;
        self
    }

    pub fn loop_window(&self) -> usize {
        self.loop_window
    }

    fn permitted(&self, context: &ResearchContext, kind: ActionKind) -> bool {
        context.can_perform_action(kind, self.loop_window)
    }

    /// Choose the next action.
    pub fn decide_next_action(&self, context: &ResearchContext) -> Action {
        if context.failed_attempts() >= self.max_failed_attempts {
            return Action::Complete {
                reason: CompletionReason::MaxAttemptsReached,
            };
        }

        if let Some(task) = context
            .task_graph()
            .and_then(|graph| graph.ready_tasks().first().copied())
        {
            return Action::ExecuteTask {
                task_id: task.id().clone(),
            };
        }

        self.heuristic_action(context)
    }

    fn heuristic_action(&self, context: &ResearchContext) -> Action {
        let goal = context.goal();
        let source_count = context.sources().len();

        if self.podcast_discovery
            && !context.podcasts_searched()
            && is_biblical_topic(goal.topic())
            && self.permitted(context, ActionKind::DiscoverSources)
        {
            return Action::DiscoverSources(DiscoveryStrategy::PodcastSearch {
                query: goal.topic().to_string(),
            });
        }

        if source_count < goal.min_sources() && self.permitted(context, ActionKind::DiscoverSources) {
            let strategy = if source_count < BROAD_SEARCH_BELOW {
                DiscoveryStrategy::BroadSearch {
                    query: format!("{} theological commentary scholarly", goal.topic()),
                }
            } else {
                DiscoveryStrategy::TargetedSearch {
                    query: targeted_query(context),
                }
            };
            return Action::DiscoverSources(strategy);
        }

        let missing = missing_perspectives(context);
        if !missing.is_empty() && self.permitted(context, ActionKind::DiscoverSources) {
            return Action::DiscoverSources(DiscoveryStrategy::PerspectiveSearch {
                perspectives: missing,
            });
        }

        if source_count >= goal.min_sources() && context.focus() == Focus::InitialDiscovery {
            return Action::FetchContent {
                urls: context
                    .sources()
                    .iter()
                    .take(FETCH_BATCH)
                    .map(|s| s.url.clone())
                    .collect(),
            };
        }

        if context.quality_score() < goal.quality_threshold()
            && self.permitted(context, ActionKind::ImproveQuality)
        {
            return Action::ImproveQuality {
                issues: quality_issues(context),
            };
        }

        let gaps = knowledge_gaps(context);
        if !gaps.is_empty() && self.permitted(context, ActionKind::FillGaps) {
            return Action::FillGaps { gaps };
        }

        let satisfied = self.evaluate_criteria(context);
        if goal.completion_criteria().is_subset(&satisfied) {
            return Action::Complete {
                reason: CompletionReason::CriteriaMet,
            };
        }

        if self.permitted(context, ActionKind::SynthesizeCurrentFindings) {
            return Action::Synthesize;
        }

        Action::Complete {
            reason: CompletionReason::NoViableActions,
        }
    }

    /// Standard criteria that currently hold, derived from state on every call.
    pub fn evaluate_criteria(&self, context: &ResearchContext) -> BTreeSet<CompletionCriterion> {
        let goal = context.goal();
        let sources = context.sources().len();
        let present_perspectives =
            goal.required_perspectives().len() - missing_perspectives(context).len();

        CompletionCriterion::ALL
            .into_iter()
            .filter(|criterion| match criterion {
                CompletionCriterion::SufficientSourcesFound => sources >= goal.min_sources(),
                CompletionCriterion::MultiplePerspectivesRepresented => {
                    present_perspectives >= DIVERSITY_TARGET
                }
                CompletionCriterion::KeyThemesIdentified => {
                    context.insights().key_themes.len() >= THEME_TARGET
                }
                CompletionCriterion::QualityScoreMet => {
                    context.quality_score() >= goal.quality_threshold()
                }
                CompletionCriterion::CitationsValidated => sources >= CITATION_PROXY_SOURCES,
            })
            .collect()
    }

    /// Whether the run may stop.
    ///
    /// Basic completion needs `min_sources`, the goal's quality threshold and
    /// enough satisfied criteria. Too many failed attempts also end the run.
    pub fn is_complete(&self, context: &ResearchContext) -> bool {
        self.meets_basic_completion(context) || context.failed_attempts() >= self.max_failed_attempts
    }

    /// Completion without the failed-attempts escape hatch.
    pub fn meets_basic_completion(&self, context: &ResearchContext) -> bool {
        let goal = context.goal();
        context.sources().len() >= goal.min_sources()
            && context.quality_score() >= goal.quality_threshold()
            && self.evaluate_criteria(context).len() >= self.min_satisfied_criteria
    }
}

/// Weighted quality of the collected material, in `[0, 1]`.
///
/// - 0.3 once `min_sources` is reached
/// - 0.4 for at least three processed sources, 0.2 for at least one
/// - 0.2 for two distinct known perspectives among processed sources
/// - 0.1 for three distinct themes
pub fn assess_quality(context: &ResearchContext) -> f64 {
    let mut score: f64 = 0.0;

    if context.sources().len() >= context.goal().min_sources() {
        score += 0.3;
    }

    let processed = context.processed_source_count();
    if processed >= 3 {
        score += 0.4;
    } else if processed >= 1 {
        score += 0.2;
    }

    let perspectives: BTreeSet<&str> = context
        .sources()
        .iter()
        .filter_map(|s| s.perspective())
        .filter(|p| *p != "unknown")
        .collect();
    if perspectives.len() >= DIVERSITY_TARGET {
        score += 0.2;
    }

    if context.insights().key_themes.len() >= THEME_TARGET {
        score += 0.1;
    }

    score.min(1.0)
}

/// Query for the first checklist theme not yet among the key themes.
pub fn targeted_query(context: &ResearchContext) -> String {
    let topic = context.goal().topic();
    let themes = &context.insights().key_themes;
    THEME_CHECKLIST
        .iter()
        .find(|(theme, _)| !themes.contains_key(*theme))
        .map(|(_, suffix)| format!("{} {}", topic, suffix))
        .unwrap_or_else(|| format!("{} recent scholarship 2023 2024", topic))
}

/// Required perspectives no source description mentions, in sorted order.
pub fn missing_perspectives(context: &ResearchContext) -> Vec<String> {
    context
        .goal()
        .required_perspectives()
        .iter()
        .filter(|p| !context.sources().iter().any(|s| s.description_mentions(p)))
        .cloned()
        .collect()
}

pub fn quality_issues(context: &ResearchContext) -> Vec<QualityIssue> {
    let sources = context.sources();
    let mut issues = Vec::new();

    let academic = sources.iter().filter(|s| s.is_academic()).count();
    if (academic as f64) < sources.len() as f64 * 0.5 {
        issues.push(QualityIssue::LowAcademicRatio);
    }

    if sources.iter().filter(|s| s.is_recent()).count() < 2 {
        issues.push(QualityIssue::OutdatedSources);
    }

    issues
}

/// Coverage areas whose keyword appears in no source.
pub fn knowledge_gaps(context: &ResearchContext) -> Vec<KnowledgeGap> {
    KnowledgeGap::ALL
        .into_iter()
        .filter(|gap| !context.sources().iter().any(|s| s.mentions(gap.keyword())))
        .collect()
}
