//! Validation result storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `sqlite`: SQLite database, one row per graph id

mod memory;
mod sqlite;

pub use memory::InMemoryValidationStore;
pub use sqlite::SqliteValidationStore;

use async_trait::async_trait;
use thiserror::Error;

use super::ValidationResult;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Graph id must be a non-empty string")]
    InvalidGraphId,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Validation store trait - implemented by all storage backends.
///
/// Saving under an existing graph id replaces the previous result.
#[async_trait]
pub trait ValidationStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Insert or replace the result for `graph_id`.
    async fn save(&self, graph_id: &str, result: &ValidationResult) -> Result<(), StoreError>;

    /// Load the result for `graph_id`, if any.
    async fn load(&self, graph_id: &str) -> Result<Option<ValidationResult>, StoreError>;
}

pub(crate) fn check_graph_id(graph_id: &str) -> Result<(), StoreError> {
    if graph_id.trim().is_empty() {
        Err(StoreError::InvalidGraphId)
    } else {
        Ok(())
    }
}
