//! Task module - research tasks, the dependency graph and plan templates.
//!
//! - All types use algebraic data types with exhaustive matching
//! - Invariants are documented and enforced through explicit transitions
//! - Readiness and ordering are pure functions over the graph

mod graph;
mod planner;
#[allow(clippy::module_inception)]
mod task;

pub use graph::{GraphError, GraphStatus, ResearchGraph};
pub use planner::{safe_topic, TaskPlanner, DEFAULT_TEMPLATE};
pub use task::{Task, TaskError, TaskId, TaskStatus, TaskTool};
