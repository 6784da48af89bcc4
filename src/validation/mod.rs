//! Citation validation and hallucination scoring.
//!
//! Claims and citations are found with fixed patterns, citations are checked
//! against known sources or live URLs, and a bounded risk score is computed.
//! Results are persisted per graph id.

mod citations;
mod claims;
mod store;
mod validator;

pub use citations::{extract_citations, match_against_sources, Citation, CitationKind, SourceMatch};
pub use claims::{extract_claims, Claim};
pub use store::{InMemoryValidationStore, SqliteValidationStore, StoreError, ValidationStore};
pub use validator::{
    hallucination_risk, CitationValidator, ValidationResult, MAX_CONTENT_BYTES, NEUTRAL_RISK,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Content too large for validation ({size} bytes, max {limit})")]
    ContentTooLarge { size: usize, limit: usize },

    #[error("Validation store error: {0}")]
    Store(#[from] StoreError),
}
