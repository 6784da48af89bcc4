//! Core types for the decision loop: actions, their outcomes and input errors.

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// How new sources should be discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DiscoveryStrategy {
    /// Generic topic search, used while almost nothing has been found
    BroadSearch { query: String },
    /// Search aimed at a theme not yet covered
    TargetedSearch { query: String },
    /// One search per missing perspective
    PerspectiveSearch { perspectives: Vec<String> },
    /// Episode lookup across the configured podcast feeds
    PodcastSearch { query: String },
}

impl DiscoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BroadSearch { .. } => "broad_search",
            Self::TargetedSearch { .. } => "targeted_search",
            Self::PerspectiveSearch { .. } => "perspective_search",
            Self::PodcastSearch { .. } => "podcast_search",
        }
    }
}

/// Weakness in the collected sources that `ImproveQuality` tries to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    /// Fewer than half of the sources look academic
    LowAcademicRatio,
    /// Fewer than two sources mention a recent year
    OutdatedSources,
}

impl QualityIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowAcademicRatio => "low_academic_ratio",
            Self::OutdatedSources => "outdated_sources",
        }
    }
}

/// Coverage area missing from every collected source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeGap {
    HistoricalContext,
    TheologicalAnalysis,
    ScholarlyConsensus,
}

impl KnowledgeGap {
    pub const ALL: [KnowledgeGap; 3] = [
        Self::HistoricalContext,
        Self::TheologicalAnalysis,
        Self::ScholarlyConsensus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HistoricalContext => "historical_context",
            Self::TheologicalAnalysis => "theological_analysis",
            Self::ScholarlyConsensus => "scholarly_consensus",
        }
    }

    /// Keyword whose presence in any source closes the gap.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::HistoricalContext => "historical",
            Self::TheologicalAnalysis => "theological",
            Self::ScholarlyConsensus => "scholarly",
        }
    }

    /// Search suffix used to fill the gap.
    pub fn query_suffix(&self) -> &'static str {
        match self {
            Self::HistoricalContext => "historical context ancient",
            Self::TheologicalAnalysis => "theological analysis systematic",
            Self::ScholarlyConsensus => "scholarly consensus debate",
        }
    }
}

/// Why the policy decided to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// `failed_attempts` reached the configured cap
    MaxAttemptsReached,
    /// Every completion criterion of the goal holds
    CriteriaMet,
    /// Every heuristic action is exhausted or blocked by the loop guard
    NoViableActions,
}

impl CompletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxAttemptsReached => "max_attempts_reached",
            Self::CriteriaMet => "criteria_met",
            Self::NoViableActions => "no_viable_actions",
        }
    }
}

/// The next step chosen by the decision policy.
///
/// # Exhaustive Matching
/// The agent matches every variant explicitly when executing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Run a ready task of the research graph
    ExecuteTask { task_id: TaskId },
    DiscoverSources(DiscoveryStrategy),
    /// Fetch and analyse the given source URLs
    FetchContent { urls: Vec<String> },
    ImproveQuality { issues: Vec<QualityIssue> },
    FillGaps { gaps: Vec<KnowledgeGap> },
    /// Fold the current sources into insights
    Synthesize,
    Complete { reason: CompletionReason },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::ExecuteTask { .. } => ActionKind::ExecuteTask,
            Self::DiscoverSources(_) => ActionKind::DiscoverSources,
            Self::FetchContent { .. } => ActionKind::FetchContent,
            Self::ImproveQuality { .. } => ActionKind::ImproveQuality,
            Self::FillGaps { .. } => ActionKind::FillGaps,
            Self::Synthesize => ActionKind::SynthesizeCurrentFindings,
            Self::Complete { .. } => ActionKind::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    fn strategy_name(&self) -> &'static str {
        match self {
            Self::DiscoverSources(strategy) => strategy.as_str(),
            _ => "",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExecuteTask { task_id } => write!(f, "execute task {}", task_id),
            Self::DiscoverSources(DiscoveryStrategy::BroadSearch { query })
            | Self::DiscoverSources(DiscoveryStrategy::TargetedSearch { query })
            | Self::DiscoverSources(DiscoveryStrategy::PodcastSearch { query }) => {
                write!(f, "discover sources ({}): {}", self.strategy_name(), query)
            }
            Self::DiscoverSources(DiscoveryStrategy::PerspectiveSearch { perspectives }) => {
                write!(f, "discover sources (perspective_search): {}", perspectives.join(", "))
            }
            Self::FetchContent { urls } => write!(f, "fetch content of {} sources", urls.len()),
            Self::ImproveQuality { issues } => {
                let names: Vec<&str> = issues.iter().map(QualityIssue::as_str).collect();
                write!(f, "improve quality: {}", names.join(", "))
            }
            Self::FillGaps { gaps } => {
                let names: Vec<&str> = gaps.iter().map(KnowledgeGap::as_str).collect();
                write!(f, "fill gaps: {}", names.join(", "))
            }
            Self::Synthesize => f.write_str("synthesize current findings"),
            Self::Complete { reason } => write!(f, "complete ({})", reason.as_str()),
        }
    }
}

/// Action name as recorded in the action history and checked by the loop guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ExecuteTask,
    DiscoverSources,
    FetchContent,
    ImproveQuality,
    FillGaps,
    SynthesizeCurrentFindings,
    Complete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecuteTask => "execute_task",
            Self::DiscoverSources => "discover_sources",
            Self::FetchContent => "fetch_content",
            Self::ImproveQuality => "improve_quality",
            Self::FillGaps => "fill_gaps",
            Self::SynthesizeCurrentFindings => "synthesize_current_findings",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason why a research run terminated.
///
/// Every variant is a normal end state; budget exhaustion is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The completion check passed before the next decision
    ResearchComplete,
    /// The policy chose to stop
    Policy(CompletionReason),
    /// Hit the iteration cap
    MaxIterations,
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResearchComplete => f.write_str("research_complete"),
            Self::Policy(reason) => f.write_str(reason.as_str()),
            Self::MaxIterations => f.write_str("max_iterations"),
        }
    }
}

/// Input errors, rejected before any work starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GoalError {
    #[error("Research topic must not be empty")]
    EmptyTopic,

    #[error("Quality threshold must be within [0, 1], got {0}")]
    InvalidQualityThreshold(f64),

    #[error("min_sources must be at least 1")]
    ZeroMinSources,

    #[error("max_sources ({max}) must not be below min_sources ({min})")]
    SourceBoundsInverted { min: usize, max: usize },
}
