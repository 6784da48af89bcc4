//! # Research Agent
//!
//! Autonomous research orchestrator for theological and biblical scholarship.
//!
//! This library provides:
//! - A planner that instantiates named templates into dependency graphs of research tasks
//! - A reactive decision policy that executes ready tasks and falls back to heuristics
//! - A citation validator that scores hallucination risk and persists results per run
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │          ResearchAgent           │
//!        │  decide → execute → update loop  │
//!        └───────┬──────────────┬───────────┘
//!                │              │
//!                ▼              ▼
//!       ┌─────────────┐  ┌──────────────────┐
//!       │ Capabilities │  │ CitationValidator │
//!       │ search/fetch │  │   + SQLite store  │
//!       │     /llm     │  └──────────────────┘
//!       └─────────────┘
//! ```
//!
//! ## Research Flow
//! 1. Build a [`agents::ResearchGoal`] and plan a task graph for the topic
//! 2. Execute ready tasks; when none is ready, pick a heuristic action
//! 3. Fold every result into the context as events, reassess quality
//! 4. Validate the synthesis periodically and at the end
//! 5. Render a markdown report
//!
//! ## Modules
//! - `agents`: goal, context, decision policy and the research loop
//! - `task`: tasks, research graphs and plan templates
//! - `validation`: citation and claim extraction, risk scoring, result stores
//! - `tools`: search, fetch and URL-check capabilities
//! - `llm`: chat completion client

pub mod agents;
pub mod config;
pub mod llm;
pub mod report;
pub mod source;
pub mod task;
pub mod tools;
pub mod validation;

#[cfg(test)]
mod testing;

pub use agents::{ResearchAgent, ResearchGoal, ResearchOutcome};
pub use config::Config;
