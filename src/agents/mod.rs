//! Agents module - autonomous research loop.
//!
//! # Pieces
//! - **ResearchGoal**: what to research and when to stop
//! - **ResearchContext**: working memory, updated only through [`ResearchEvent`]s
//! - **DecisionPolicy**: pure choice of the next [`Action`] (task graph first, heuristics second)
//! - **ResearchAgent**: executes actions through the capability traits and owns the loop
//!
//! # Design Principles
//! - Decisions are a pure function of the context
//! - Capability failures become events, never loop errors
//! - Every run terminates with a report, bounded by the iteration and failure caps

mod analysis;
mod context;
mod goal;
mod policy;
mod research;
mod types;

pub use analysis::{
    analyze_content, biblical_references, extractive_summary, is_biblical_topic, perspective,
    synthesize_insights, themes, Insights, EXCERPT_CHARS,
};
pub use context::{Focus, ResearchContext, ResearchEvent, ScratchpadEntry};
pub use goal::{CompletionCriterion, ResearchGoal, ResearchGoalBuilder, DEFAULT_PERSPECTIVES};
pub use policy::{
    assess_quality, knowledge_gaps, missing_perspectives, quality_issues, targeted_query,
    DecisionPolicy,
};
pub use research::{validation_content, FetchedDocument, ResearchAgent, ResearchOutcome};
pub use types::{
    Action, ActionKind, CompletionReason, DiscoveryStrategy, GoalError, KnowledgeGap,
    QualityIssue, TerminalReason,
};
