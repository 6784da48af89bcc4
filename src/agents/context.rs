//! Research context: the run's working memory.
//!
//! The context is never mutated in place by the agent. Every change is a
//! [`ResearchEvent`] folded in with [`ResearchContext::apply`], which also
//! writes the matching scratchpad entry.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::analysis::Insights;
use super::goal::{CompletionCriterion, ResearchGoal};
use super::types::ActionKind;
use crate::source::{ContentAnalysis, Source};
use crate::task::{GraphStatus, ResearchGraph, TaskError, TaskId, TaskStatus};
use crate::validation::ValidationResult;

/// What the heuristic policy is currently concentrating on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    #[default]
    InitialDiscovery,
    ContentAnalysis,
}

/// One step of the agent's reasoning log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    pub step: usize,
    pub thought: String,
    pub action: String,
    pub result: String,
}

/// A change to the research context.
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchEvent {
    TaskStarted { task_id: TaskId, at: DateTime<Utc> },
    TaskCompleted { task_id: TaskId, result: Value, at: DateTime<Utc> },
    TaskFailed { task_id: TaskId, error: String, at: DateTime<Utc> },
    /// Candidate sources; inadmissible, duplicate and overflow entries are dropped
    SourcesDiscovered { sources: Vec<Source> },
    /// Outcome of the run's podcast lookup; admitted like `SourcesDiscovered`
    PodcastsSearched { episodes: Vec<Source> },
    /// Analysis of the source with this URL
    ContentAnalyzed { url: String, analysis: ContentAnalysis },
    FocusChanged(Focus),
    InsightsSynthesized(Insights),
    SynthesisWritten(String),
    /// Raise quality by `delta`, noting what was done
    QualityImproved { delta: f64, note: String },
    /// Freshly assessed quality; the score never decreases
    QualityAssessed(f64),
    GapsFilled(Vec<String>),
    ValidationRecorded(ValidationResult),
    AttemptFailed { reason: String },
    ActionRecorded { kind: ActionKind, description: String },
    CriteriaEvaluated(BTreeSet<CompletionCriterion>),
}

/// Mutable state of one research run.
///
/// # Invariants
/// - `sources` holds admissible sources with distinct URLs, at most `goal.max_sources`
/// - `quality_score` is within `[0, 1]`
/// - `action_history` and `scratchpad` are append-only
#[derive(Debug, Clone, Serialize)]
pub struct ResearchContext {
    run_id: String,
    goal: ResearchGoal,
    sources: Vec<Source>,
    insights: Insights,
    quality_score: f64,
    focus: Focus,
    completed_criteria: BTreeSet<CompletionCriterion>,
    action_history: Vec<ActionKind>,
    failed_attempts: u32,
    podcasts_searched: bool,
    task_graph: Option<ResearchGraph>,
    validation: Option<ValidationResult>,
    synthesis: Option<String>,
    scratchpad: Vec<ScratchpadEntry>,
}

impl ResearchContext {
    pub fn new(goal: ResearchGoal) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            goal,
            sources: Vec::new(),
            insights: Insights::default(),
            quality_score: 0.0,
            focus: Focus::default(),
            completed_criteria: BTreeSet::new(),
            action_history: Vec::new(),
            failed_attempts: 0,
            podcasts_searched: false,
            task_graph: None,
            validation: None,
            synthesis: None,
            scratchpad: Vec::new(),
        }
    }

    pub fn with_task_graph(mut self, graph: ResearchGraph) -> Self {
        self.task_graph = Some(graph);
        self
    }

    pub fn goal(&self) -> &ResearchGoal {
        &self.goal
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn insights(&self) -> &Insights {
        &self.insights
    }

    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn completed_criteria(&self) -> &BTreeSet<CompletionCriterion> {
        &self.completed_criteria
    }

    pub fn action_history(&self) -> &[ActionKind] {
        &self.action_history
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Whether podcast feeds have already been searched in this run.
    pub fn podcasts_searched(&self) -> bool {
        self.podcasts_searched
    }

    pub fn task_graph(&self) -> Option<&ResearchGraph> {
        self.task_graph.as_ref()
    }

    pub fn validation(&self) -> Option<&ValidationResult> {
        self.validation.as_ref()
    }

    pub fn synthesis(&self) -> Option<&str> {
        self.synthesis.as_deref()
    }

    pub fn scratchpad(&self) -> &[ScratchpadEntry] {
        &self.scratchpad
    }

    /// Id under which validation results of this run are stored: the task
    /// graph's id, or a per-run id when researching without a graph.
    pub fn graph_id(&self) -> &str {
        self.task_graph
            .as_ref()
            .map(|g| g.graph_id())
            .unwrap_or(&self.run_id)
    }

    pub fn processed_source_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_content_processed()).count()
    }

    /// Loop guard: `kind` is blocked iff it fills the last `window` history entries.
    pub fn can_perform_action(&self, kind: ActionKind, window: usize) -> bool {
        if window == 0 || self.action_history.len() < window {
            return true;
        }
        !self.action_history[self.action_history.len() - window..]
            .iter()
            .all(|k| *k == kind)
    }

    /// Fold one event into the context.
    pub fn apply(mut self, event: ResearchEvent) -> Self {
        match event {
            ResearchEvent::TaskStarted { task_id, at } => {
                self.transition_task(&task_id, "started", |graph| graph.start_task(task_id.as_str(), at));
            }
            ResearchEvent::TaskCompleted { task_id, result, at } => {
                self.transition_task(&task_id, "completed", |graph| {
                    graph.complete_task(task_id.as_str(), result, at)
                });
            }
            ResearchEvent::TaskFailed { task_id, error, at } => {
                let note = format!("Task {} failed: {}", task_id, error);
                self.transition_task(&task_id, "failed", |graph| {
                    graph.fail_task(task_id.as_str(), error, at)
                });
                self.failed_attempts += 1;
                self.note("Recording task failure", "update_context", note);
            }
            ResearchEvent::SourcesDiscovered { sources } => {
                let added = self.add_sources(sources);
                self.note(
                    "Updating context with new sources",
                    "update_context",
                    format!("Added {} new sources ({} total)", added, self.sources.len()),
                );
            }
            ResearchEvent::PodcastsSearched { episodes } => {
                self.podcasts_searched = true;
                let found = episodes.len();
                let added = self.add_sources(episodes);
                self.note(
                    "Searching podcasts for relevant episodes",
                    "podcast_search",
                    format!("Found {} episodes, added {}", found, added),
                );
            }
            ResearchEvent::ContentAnalyzed { url, analysis } => {
                if let Some(source) = self.sources.iter_mut().find(|s| s.url == url) {
                    source.analysis = Some(analysis);
                    self.note("Analysed source content", "update_context", url);
                }
            }
            ResearchEvent::FocusChanged(focus) => {
                self.focus = focus;
            }
            ResearchEvent::InsightsSynthesized(insights) => {
                let themes: Vec<&str> = insights.key_themes.keys().map(String::as_str).collect();
                let result = format!("Key themes: [{}]", themes.join(", "));
                self.insights = insights;
                self.note("Updating context with new insights", "update_context", result);
            }
            ResearchEvent::SynthesisWritten(text) => {
                let result = format!("{} characters", text.chars().count());
                self.synthesis = Some(text);
                self.note("Stored written synthesis", "update_context", result);
            }
            ResearchEvent::QualityImproved { delta, note } => {
                let old = self.quality_score;
                self.quality_score = (old + delta).clamp(0.0, 1.0);
                self.insights.improvements.push(note);
                self.note(
                    "Updating quality score",
                    "update_context",
                    format!("Quality score updated from {:.2} to {:.2}", old, self.quality_score),
                );
            }
            ResearchEvent::QualityAssessed(score) => {
                let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
                if score > self.quality_score {
                    let old = self.quality_score;
                    self.quality_score = score;
                    self.note(
                        "Updating quality score",
                        "update_context",
                        format!("Quality score updated from {:.2} to {:.2}", old, score),
                    );
                }
            }
            ResearchEvent::GapsFilled(notes) => {
                let result = notes.join("; ");
                self.insights.gaps_filled.extend(notes);
                self.note("Filled knowledge gaps", "update_context", result);
            }
            ResearchEvent::ValidationRecorded(result) => {
                let summary = format!(
                    "Validation {}: risk {:.2}",
                    if result.validation_passed { "passed" } else { "flagged issues" },
                    result.hallucination_risk
                );
                self.validation = Some(result);
                self.note("Updating validation results", "update_context", summary);
            }
            ResearchEvent::AttemptFailed { reason } => {
                self.failed_attempts += 1;
                self.note("Action produced nothing", "update_context", reason);
            }
            ResearchEvent::ActionRecorded { kind, description } => {
                self.action_history.push(kind);
                self.note("Decided next action", kind.as_str(), description);
            }
            ResearchEvent::CriteriaEvaluated(criteria) => {
                self.completed_criteria = criteria;
            }
        }
        self
    }

    /// Apply events in order.
    pub fn apply_all(self, events: impl IntoIterator<Item = ResearchEvent>) -> Self {
        events.into_iter().fold(self, ResearchContext::apply)
    }

    fn transition_task<F>(&mut self, task_id: &TaskId, verb: &str, transition: F)
    where
        F: FnOnce(&mut ResearchGraph) -> Result<(), TaskError>,
    {
        let Some(graph) = self.task_graph.as_mut() else {
            tracing::warn!("Task {} {} but the context has no task graph", task_id, verb);
            return;
        };
        match transition(graph) {
            Ok(()) => {
                tracing::debug!("Task {} {}", task_id, verb);
                let status = if graph.all_completed() {
                    GraphStatus::Completed
                } else if graph.count_with_status(TaskStatus::Failed) > 0 {
                    GraphStatus::Failed
                } else {
                    GraphStatus::Executing
                };
                graph.set_status(status);
            }
            Err(e) => tracing::warn!("Ignoring task event: {}", e),
        }
    }

    fn add_sources(&mut self, sources: Vec<Source>) -> usize {
        let mut added = 0;
        for source in sources {
            if self.sources.len() >= self.goal.max_sources() {
                break;
            }
            if !source.is_admissible() || self.sources.iter().any(|s| s.url == source.url) {
                continue;
            }
            self.sources.push(source);
            added += 1;
        }
        added
    }

    fn note(&mut self, thought: &str, action: &str, result: impl Into<String>) {
        self.scratchpad.push(ScratchpadEntry {
            step: self.scratchpad.len() + 1,
            thought: thought.to_string(),
            action: action.to_string(),
            result: result.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskPlanner;
    use serde_json::json;

    fn goal(max_sources: usize) -> ResearchGoal {
        ResearchGoal::builder("Genesis 1")
            .min_sources(1)
            .max_sources(max_sources)
            .build()
            .unwrap()
    }

    fn source(n: usize) -> Source {
        Source::new(format!("Title {}", n), format!("https://s{}.example", n), "")
    }

    #[test]
    fn sources_are_deduplicated_and_capped() {
        let ctx = ResearchContext::new(goal(3)).apply(ResearchEvent::SourcesDiscovered {
            sources: vec![
                source(1),
                source(1),
                Source::new("", "https://untitled.example", ""),
                source(2),
                source(3),
                source(4),
            ],
        });
        let urls: Vec<&str> = ctx.sources().iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://s1.example", "https://s2.example", "https://s3.example"]);
        assert_eq!(ctx.scratchpad().len(), 1);
        assert_eq!(ctx.scratchpad()[0].step, 1);
    }

    #[test]
    fn podcast_episodes_are_admitted_once_searched() {
        let ctx = ResearchContext::new(goal(5));
        assert!(!ctx.podcasts_searched());

        let episode = source(1).with_type(crate::source::SourceType::Podcast);
        let ctx = ctx.apply(ResearchEvent::PodcastsSearched {
            episodes: vec![episode, source(1)],
        });
        assert!(ctx.podcasts_searched());
        assert_eq!(ctx.sources().len(), 1);
        assert!(ctx.sources()[0].is_podcast());
        assert_eq!(ctx.scratchpad()[0].result, "Found 2 episodes, added 1");

        let ctx = ResearchContext::new(goal(5))
            .apply(ResearchEvent::PodcastsSearched { episodes: Vec::new() });
        assert!(ctx.podcasts_searched());
        assert!(ctx.sources().is_empty());
    }

    #[test]
    fn loop_guard_blocks_after_full_window() {
        let record = |ctx: ResearchContext, kind| {
            ctx.apply(ResearchEvent::ActionRecorded {
                kind,
                description: String::new(),
            })
        };
        let mut ctx = ResearchContext::new(goal(5));
        for _ in 0..2 {
            ctx = record(ctx, ActionKind::DiscoverSources);
            assert!(ctx.can_perform_action(ActionKind::DiscoverSources, 3));
        }
        ctx = record(ctx, ActionKind::DiscoverSources);
        assert!(!ctx.can_perform_action(ActionKind::DiscoverSources, 3));
        assert!(ctx.can_perform_action(ActionKind::FillGaps, 3));

        ctx = record(ctx, ActionKind::FillGaps);
        assert!(ctx.can_perform_action(ActionKind::DiscoverSources, 3));
    }

    #[test]
    fn task_events_drive_the_graph() {
        let graph = TaskPlanner::new().create_plan("Genesis 1", "quick_survey");
        let ctx = ResearchContext::new(goal(5)).with_task_graph(graph);
        let now = Utc::now();

        let ctx = ctx
            .apply(ResearchEvent::TaskStarted { task_id: "SEARCH".into(), at: now })
            .apply(ResearchEvent::TaskCompleted {
                task_id: "SEARCH".into(),
                result: json!([]),
                at: now,
            })
            .apply(ResearchEvent::TaskStarted { task_id: "FETCH".into(), at: now })
            .apply(ResearchEvent::TaskFailed {
                task_id: "FETCH".into(),
                error: "no documents".to_string(),
                at: now,
            });

        let graph = ctx.task_graph().unwrap();
        assert_eq!(graph.task("SEARCH").unwrap().status(), TaskStatus::Completed);
        assert_eq!(graph.task("FETCH").unwrap().status(), TaskStatus::Failed);
        assert!(graph.ready_tasks().is_empty());
        assert_eq!(graph.status(), GraphStatus::Failed);
        assert_eq!(ctx.failed_attempts(), 1);
    }

    #[test]
    fn invalid_task_event_is_ignored() {
        let graph = TaskPlanner::new().create_plan("Genesis 1", "quick_survey");
        let ctx = ResearchContext::new(goal(5)).with_task_graph(graph);
        let ctx = ctx.apply(ResearchEvent::TaskCompleted {
            task_id: "SEARCH".into(),
            result: json!([]),
            at: Utc::now(),
        });
        assert_eq!(
            ctx.task_graph().unwrap().task("SEARCH").unwrap().status(),
            TaskStatus::Pending
        );
    }

    #[test]
    fn quality_never_leaves_bounds_or_decreases() {
        let ctx = ResearchContext::new(goal(5))
            .apply(ResearchEvent::QualityAssessed(0.4))
            .apply(ResearchEvent::QualityAssessed(0.2))
            .apply(ResearchEvent::QualityImproved {
                delta: 0.9,
                note: "academic".to_string(),
            })
            .apply(ResearchEvent::QualityAssessed(f64::NAN));
        assert_eq!(ctx.quality_score(), 1.0);
        assert_eq!(ctx.insights().improvements, vec!["academic"]);
    }

    #[test]
    fn content_analysis_attaches_to_matching_source() {
        let ctx = ResearchContext::new(goal(5))
            .apply(ResearchEvent::SourcesDiscovered { sources: vec![source(1)] })
            .apply(ResearchEvent::ContentAnalyzed {
                url: "https://s1.example".to_string(),
                analysis: ContentAnalysis::default(),
            })
            .apply(ResearchEvent::ContentAnalyzed {
                url: "https://missing.example".to_string(),
                analysis: ContentAnalysis::default(),
            });
        assert_eq!(ctx.processed_source_count(), 1);
    }

    #[test]
    fn graph_id_falls_back_to_run_id() {
        let plain = ResearchContext::new(goal(5));
        assert!(!plain.graph_id().is_empty());
        assert_ne!(plain.graph_id(), ResearchContext::new(goal(5)).graph_id());

        let graph = TaskPlanner::new().create_plan("Genesis 1", "quick_survey");
        let id = graph.graph_id().to_string();
        assert_eq!(plain.with_task_graph(graph).graph_id(), id);
    }
}
