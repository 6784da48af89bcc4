//! In-memory validation store (non-persistent).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_graph_id, StoreError, ValidationStore};
use crate::validation::ValidationResult;

#[derive(Clone, Default)]
pub struct InMemoryValidationStore {
    results: Arc<RwLock<HashMap<String, ValidationResult>>>,
}

impl InMemoryValidationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored graph ids.
    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }
}

#[async_trait]
impl ValidationStore for InMemoryValidationStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn save(&self, graph_id: &str, result: &ValidationResult) -> Result<(), StoreError> {
        check_graph_id(graph_id)?;
        self.results
            .write()
            .await
            .insert(graph_id.to_string(), result.clone());
        Ok(())
    }

    async fn load(&self, graph_id: &str) -> Result<Option<ValidationResult>, StoreError> {
        check_graph_id(graph_id)?;
        Ok(self.results.read().await.get(graph_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_write_wins() {
        let store = InMemoryValidationStore::new();
        let first = ValidationResult::neutral("one", "e1");
        let second = ValidationResult::neutral("two", "e2");

        store.save("g", &first).await.unwrap();
        store.save("g", &second).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.load("g").await.unwrap(), Some(second));
        assert_eq!(store.load("other").await.unwrap(), None);
        assert!(!store.is_persistent());
    }

    #[tokio::test]
    async fn empty_graph_id_is_rejected() {
        let store = InMemoryValidationStore::new();
        let result = ValidationResult::neutral("x", "e");
        assert!(matches!(
            store.save(" ", &result).await,
            Err(StoreError::InvalidGraphId)
        ));
        assert!(store.is_empty().await);
    }
}
