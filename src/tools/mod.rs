//! Capability providers: search, podcast lookup, page fetch and URL
//! accessibility checks.
//!
//! The research core only sees the traits defined here. HTTP implementations
//! live in [`web`]; each receives its configuration at construction and never
//! reads the environment.

mod retry;
mod web;

pub use retry::{with_retry, CapabilityRetry};
pub use web::{
    BraveSearch, HttpFetcher, HttpUrlValidator, RoutedSearch, RssPodcastSearch,
    SemanticScholarSearch,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::source::Source;

/// Maximum length of a sanitized search query, in characters.
pub const MAX_QUERY_CHARS: usize = 500;

/// Maximum URL length accepted by URL validation.
pub const MAX_URL_LEN: usize = 2048;

/// Search for sources matching a query.
///
/// Zero results is a normal outcome, not an error.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short provider name recorded in source provenance.
    fn name(&self) -> &str;

    /// Search with an already sanitized query; `max_results` is within 1..=10.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Source>, CapabilityError>;
}

/// Look up podcast episodes about a query.
///
/// Returned sources are of type [`SourceType::Podcast`](crate::source::SourceType::Podcast).
/// A show whose feed cannot be read is skipped; the call fails only when
/// no show could be searched at all.
#[async_trait]
pub trait PodcastSearch: Send + Sync {
    fn name(&self) -> &str;

    async fn search_episodes(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Source>, CapabilityError>;
}

/// Fetch the readable text of a page.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, CapabilityError>;
}

/// Check whether a URL is reachable.
///
/// Never fails: problems are reported inside [`UrlCheck`].
#[async_trait]
pub trait UrlValidator: Send + Sync {
    async fn validate_url(&self, url: &str) -> UrlCheck;
}

/// Outcome of a URL accessibility check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlCheck {
    pub accessible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UrlCheck {
    pub fn accessible(status_code: u16, final_url: impl Into<String>) -> Self {
        Self {
            accessible: status_code == 200,
            status_code: Some(status_code),
            final_url: Some(final_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            accessible: false,
            status_code: None,
            final_url: None,
            error: Some(error.into()),
        }
    }
}

/// Classification of capability failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityErrorKind {
    /// Rejected before any call was made (empty query, bad URL)
    InvalidInput,
    /// Provider is missing credentials or configuration
    NotConfigured,
    /// HTTP 429
    RateLimited,
    /// Per-call timeout elapsed
    Timeout,
    /// Connection failure
    Network,
    /// Non-success HTTP status other than 429
    Http,
    /// Response could not be decoded
    Parse,
    /// Input exceeds a size limit
    TooLarge,
}

impl CapabilityErrorKind {
    /// Transient failures are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CapabilityErrorKind::RateLimited
                | CapabilityErrorKind::Timeout
                | CapabilityErrorKind::Network
        )
    }
}

impl std::fmt::Display for CapabilityErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CapabilityErrorKind::InvalidInput => "Invalid input",
            CapabilityErrorKind::NotConfigured => "Not configured",
            CapabilityErrorKind::RateLimited => "Rate limited",
            CapabilityErrorKind::Timeout => "Timeout",
            CapabilityErrorKind::Network => "Network error",
            CapabilityErrorKind::Http => "HTTP error",
            CapabilityErrorKind::Parse => "Parse error",
            CapabilityErrorKind::TooLarge => "Too large",
        };
        f.write_str(label)
    }
}

/// Error returned by a capability provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CapabilityError {
    pub kind: CapabilityErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
}

impl CapabilityError {
    pub fn new(kind: CapabilityErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::InvalidInput, message)
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::NotConfigured, message)
    }

    /// Build an error from a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = if status == 429 {
            CapabilityErrorKind::RateLimited
        } else {
            CapabilityErrorKind::Http
        };
        Self {
            kind,
            message: message.into(),
            status_code: Some(status),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<reqwest::Error> for CapabilityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(CapabilityErrorKind::Timeout, format!("Request timeout: {}", e))
        } else if e.is_connect() {
            Self::new(CapabilityErrorKind::Network, format!("Connection failed: {}", e))
        } else if e.is_decode() {
            Self::new(CapabilityErrorKind::Parse, format!("Invalid response: {}", e))
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), e.to_string())
        } else {
            Self::new(CapabilityErrorKind::Network, format!("Request failed: {}", e))
        }
    }
}

/// Sanitize a search query.
///
/// Strips `<`, `>`, `"` and `\`, trims, truncates to [`MAX_QUERY_CHARS`]
/// characters and rejects anything shorter than two characters.
pub fn sanitize_query(query: &str) -> Result<String, CapabilityError> {
    let stripped: String = query
        .trim()
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\\'))
        .collect();

    let sanitized: String = if stripped.chars().count() > MAX_QUERY_CHARS {
        tracing::warn!("Query truncated to {} characters", MAX_QUERY_CHARS);
        stripped.chars().take(MAX_QUERY_CHARS).collect()
    } else {
        stripped
    };

    if sanitized.chars().count() < 2 {
        return Err(CapabilityError::invalid_input(
            "Query too short after sanitization",
        ));
    }
    Ok(sanitized)
}

/// Clamp a requested result count to 1..=10.
pub fn clamp_results(requested: usize) -> usize {
    requested.clamp(1, 10)
}

/// Check URL shape before any network call: http(s) scheme, a host, bounded length.
pub fn check_url_format(raw: &str) -> Result<url::Url, CapabilityError> {
    if raw.len() > MAX_URL_LEN {
        return Err(CapabilityError::invalid_input("URL too long"));
    }
    let parsed = url::Url::parse(raw)
        .map_err(|e| CapabilityError::invalid_input(format!("Invalid URL format: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(CapabilityError::invalid_input("Invalid URL format"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_and_trims() {
        assert_eq!(
            sanitize_query("  <b>\"Genesis\" 1\\ </b> ").unwrap(),
            "bGenesis 1 /b"
        );
    }

    #[test]
    fn sanitize_rejects_short_queries() {
        assert!(sanitize_query("").is_err());
        assert!(sanitize_query(" <ab> ").is_ok());
        assert!(sanitize_query(" <a> ").is_err());
        let err = sanitize_query("<>\"x").unwrap_err();
        assert_eq!(err.kind, CapabilityErrorKind::InvalidInput);
    }

    #[test]
    fn sanitize_truncates_long_queries() {
        let long = "a".repeat(700);
        assert_eq!(sanitize_query(&long).unwrap().len(), MAX_QUERY_CHARS);
    }

    #[test]
    fn result_count_is_clamped() {
        assert_eq!(clamp_results(0), 1);
        assert_eq!(clamp_results(5), 5);
        assert_eq!(clamp_results(50), 10);
    }

    #[test]
    fn url_format_rules() {
        assert!(check_url_format("https://example.com/a").is_ok());
        assert!(check_url_format("ftp://example.com/a").is_err());
        assert!(check_url_format("not a url").is_err());
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LEN));
        assert!(check_url_format(&long).is_err());
    }

    #[test]
    fn status_classification() {
        assert!(CapabilityError::from_status(429, "slow down").is_transient());
        assert!(!CapabilityError::from_status(401, "bad key").is_transient());
        assert!(!CapabilityError::invalid_input("x").is_transient());
    }
}
