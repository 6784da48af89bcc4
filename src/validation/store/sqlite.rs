//! SQLite-based validation store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::{check_graph_id, StoreError, ValidationStore};
use crate::validation::ValidationResult;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS validation_results (
    graph_id TEXT PRIMARY KEY NOT NULL,
    validation_data TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

pub struct SqliteValidationStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteValidationStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            Ok::<_, StoreError>(conn)
        })
        .await??;

        tracing::debug!("Opened validation store at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored rows.
    pub async fn row_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM validation_results", [], |row| row.get(0))?;
            Ok::<_, StoreError>(count.max(0) as usize)
        })
        .await?
    }
}

#[async_trait]
impl ValidationStore for SqliteValidationStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn save(&self, graph_id: &str, result: &ValidationResult) -> Result<(), StoreError> {
        check_graph_id(graph_id)?;
        let conn = self.conn.clone();
        let graph_id = graph_id.to_string();
        let data = serde_json::to_string(result)?;
        let now = Utc::now().to_rfc3339();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT OR REPLACE INTO validation_results (graph_id, validation_data, created_at)
                 VALUES (?1, ?2, ?3)",
                params![graph_id, data, now],
            )?;
            tracing::info!("Saved validation result for graph {}", graph_id);
            Ok::<_, StoreError>(())
        })
        .await?
    }

    async fn load(&self, graph_id: &str) -> Result<Option<ValidationResult>, StoreError> {
        check_graph_id(graph_id)?;
        let conn = self.conn.clone();
        let graph_id = graph_id.to_string();

        let data: Option<String> = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                "SELECT validation_data FROM validation_results WHERE graph_id = ?1",
                params![graph_id],
                |row| row.get(0),
            )
            .optional()
        })
        .await??;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
