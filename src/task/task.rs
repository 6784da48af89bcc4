//! Core Task type: one tool invocation inside a research graph.
//!
//! # Invariants
//! - `id` is unique within its owning `ResearchGraph`
//! - Status only moves forward: `Pending -> Running -> Completed | Failed`
//! - A terminal task is never started again

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a task within a graph (e.g. `SEARCH_PRIMARY`).
///
/// Ids come from plan templates, so they are human-readable rather than UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for TaskId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Tool a task invokes.
///
/// # Exhaustive Matching
/// The executor matches every variant explicitly; adding a tool forces
/// the executor to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTool {
    /// Search the web for sources (`query`, `max_results`)
    WebSearch,
    /// Fetch and summarize documents found by an upstream search (`urls_from`)
    GetPdf,
    /// Extract citations and metadata from fetched documents (`pdf_ids_from`)
    ExtractMetadata,
    /// Synthesize findings into a written analysis (`sources_from`, `topic`)
    SynthesizeResearch,
    /// Score an analysis for unsupported claims (`content_from`, `citations_from`)
    HallucinationCheck,
    /// Write the report to a note file (`filename`, `content_from`)
    SaveNote,
}

impl TaskTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskTool::WebSearch => "web_search",
            TaskTool::GetPdf => "get_pdf",
            TaskTool::ExtractMetadata => "extract_metadata",
            TaskTool::SynthesizeResearch => "synthesize_research",
            TaskTool::HallucinationCheck => "hallucination_check",
            TaskTool::SaveNote => "save_note",
        }
    }
}

impl std::fmt::Display for TaskTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a task in its lifecycle.
///
/// # State Machine
/// ```text
/// Pending -> Running -> Completed
///                   \-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting for its dependencies or for the scheduler
    Pending,
    /// Task is currently being executed
    Running,
    /// Task completed successfully
    Completed,
    /// Task failed; see `Task::error`
    Failed,
}

impl TaskStatus {
    /// `true` if the task is Completed or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A single node of a research graph.
///
/// Fields are private: only the owning graph mutates a task, and only through
/// the explicit transitions below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    tool: TaskTool,
    #[serde(default)]
    args: Map<String, Value>,
    #[serde(default)]
    depends_on: Vec<TaskId>,
    status: TaskStatus,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task.
    pub fn new(
        id: impl Into<TaskId>,
        tool: TaskTool,
        args: Map<String, Value>,
        depends_on: Vec<TaskId>,
    ) -> Self {
        Self {
            id: id.into(),
            tool,
            args,
            depends_on,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn tool(&self) -> TaskTool {
        self.tool
    }

    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    /// String argument, if present.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// Unsigned integer argument, if present.
    pub fn arg_u64(&self, key: &str) -> Option<u64> {
        self.args.get(key).and_then(Value::as_u64)
    }

    pub fn depends_on(&self) -> &[TaskId] {
        &self.depends_on
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    // State transitions - explicit and validated

    /// Transition the task to Running.
    ///
    /// # Precondition
    /// `self.status == Pending`
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), TaskError> {
        match self.status {
            TaskStatus::Pending => {
                self.status = TaskStatus::Running;
                self.started_at = Some(at);
                Ok(())
            }
            other => Err(TaskError::InvalidTransition {
                task: self.id.clone(),
                from: other,
                to: TaskStatus::Running,
            }),
        }
    }

    /// Transition the task to Completed, recording its result.
    ///
    /// # Precondition
    /// `self.status == Running`
    pub fn complete(&mut self, result: Value, at: DateTime<Utc>) -> Result<(), TaskError> {
        match self.status {
            TaskStatus::Running => {
                self.status = TaskStatus::Completed;
                self.result = Some(result);
                self.completed_at = Some(at);
                Ok(())
            }
            other => Err(TaskError::InvalidTransition {
                task: self.id.clone(),
                from: other,
                to: TaskStatus::Completed,
            }),
        }
    }

    /// Transition the task to Failed, recording the error.
    ///
    /// # Precondition
    /// `self.status == Running`
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<(), TaskError> {
        match self.status {
            TaskStatus::Running => {
                self.status = TaskStatus::Failed;
                self.error = Some(error.into());
                self.completed_at = Some(at);
                Ok(())
            }
            other => Err(TaskError::InvalidTransition {
                task: self.id.clone(),
                from: other,
                to: TaskStatus::Failed,
            }),
        }
    }
}

/// Errors that can occur during task operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("Invalid state transition for task {task} from {from:?} to {to:?}")]
    InvalidTransition {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),
}
