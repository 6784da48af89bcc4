//! Research graph: a DAG of tasks with explicit dependencies.
//!
//! The graph holds no execution behavior beyond readiness computation and
//! validated status transitions. The caller executes tasks and writes the
//! outcome back through `start_task` / `complete_task` / `fail_task`.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::task::{Task, TaskError, TaskId, TaskStatus};

/// Lifecycle of a graph as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphStatus {
    Planning,
    Executing,
    Completed,
    Failed,
}

/// Complete research task graph for one run.
///
/// # Invariants
/// - `graph_id` is unique per run
/// - `tasks` keep declaration order; readiness order follows it
/// - Dependencies should resolve within the graph and be acyclic (see `validate`);
///   readiness tolerates violations by never scheduling the affected tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchGraph {
    topic: String,
    graph_id: String,
    tasks: Vec<Task>,
    status: GraphStatus,
    created_at: DateTime<Utc>,
}

impl ResearchGraph {
    /// Create a graph in the `Planning` state with a fresh UUID.
    pub fn new(topic: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            topic: topic.into(),
            graph_id: Uuid::new_v4().to_string(),
            tasks,
            status: GraphStatus::Planning,
            created_at: Utc::now(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn status(&self) -> GraphStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_status(&mut self, status: GraphStatus) {
        self.status = status;
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task, TaskError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id() == id)
            .ok_or_else(|| TaskError::UnknownTask(TaskId::new(id)))
    }

    /// Tasks that can run now, in declaration order.
    ///
    /// A task is ready when it is `Pending` and every dependency refers to a
    /// task of this graph that is `Completed`. Dangling dependency ids keep a
    /// task blocked forever instead of raising an error.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        let statuses: HashMap<&str, TaskStatus> = self
            .tasks
            .iter()
            .map(|t| (t.id().as_str(), t.status()))
            .collect();

        self.tasks
            .iter()
            .filter(|task| task.status() == TaskStatus::Pending)
            .filter(|task| {
                task.depends_on().iter().all(|dep| {
                    statuses.get(dep.as_str()) == Some(&TaskStatus::Completed)
                })
            })
            .collect()
    }

    /// Mark a task as running.
    pub fn start_task(&mut self, id: &str, at: DateTime<Utc>) -> Result<(), TaskError> {
        self.task_mut(id)?.start(at)
    }

    /// Mark a running task as completed with its result.
    pub fn complete_task(
        &mut self,
        id: &str,
        result: Value,
        at: DateTime<Utc>,
    ) -> Result<(), TaskError> {
        self.task_mut(id)?.complete(result, at)
    }

    /// Mark a running task as failed.
    pub fn fail_task(
        &mut self,
        id: &str,
        error: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), TaskError> {
        self.task_mut(id)?.fail(error, at)
    }

    /// Result of a completed task, if any.
    pub fn result_of(&self, id: &str) -> Option<&Value> {
        self.task(id)
            .filter(|t| t.status() == TaskStatus::Completed)
            .and_then(Task::result)
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status() == status).count()
    }

    /// `true` when every task completed.
    pub fn all_completed(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| t.status() == TaskStatus::Completed)
    }

    /// Check structural invariants: unique ids, resolvable dependencies, no cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.execution_order().map(|_| ())
    }

    /// Topological execution order (Kahn's algorithm).
    ///
    /// Ties are broken by declaration order so the result is deterministic.
    ///
    /// # Errors
    /// Duplicate ids, dangling dependencies, self dependencies and cycles.
    pub fn execution_order(&self) -> Result<Vec<TaskId>, GraphError> {
        let n = self.tasks.len();
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(n);
        for (i, task) in self.tasks.iter().enumerate() {
            if index.insert(task.id().as_str(), i).is_some() {
                return Err(GraphError::DuplicateTaskId(task.id().clone()));
            }
        }

        let mut in_degree = vec![0usize; n];
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, task) in self.tasks.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in task.depends_on() {
                let Some(&d) = index.get(dep.as_str()) else {
                    return Err(GraphError::DanglingDependency {
                        task: task.id().clone(),
                        dependency: dep.clone(),
                    });
                };
                if d == i {
                    return Err(GraphError::SelfDependency(task.id().clone()));
                }
                if seen.insert(d) {
                    adj[d].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        let mut queue: std::collections::VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(node) = queue.pop_front() {
            order.push(self.tasks[node].id().clone());
            for &next in &adj[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != n {
            Err(GraphError::CircularDependency)
        } else {
            Ok(order)
        }
    }

    /// Save the graph as pretty-printed JSON.
    pub async fn save_json(&self, path: &Path) -> Result<(), GraphError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        tracing::debug!("Saved graph {} to {}", self.graph_id, path.display());
        Ok(())
    }

    /// Load a graph previously written by `save_json`.
    pub async fn load_json(path: &Path) -> Result<Self, GraphError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Structural and persistence errors of a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Duplicate task id {0}")]
    DuplicateTaskId(TaskId),

    #[error("Task {task} depends on unknown task {dependency}")]
    DanglingDependency { task: TaskId, dependency: TaskId },

    #[error("Task {0} depends on itself")]
    SelfDependency(TaskId),

    #[error("Circular dependency detected in task graph")]
    CircularDependency,

    #[error("Graph I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Graph serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
