//! LLM error types with retry classification.
//!
//! Rate limits and timeouts are transient and retried with doubling backoff;
//! every other failure is surfaced immediately.

use std::time::Duration;

/// Error from LLM API calls.
#[derive(Debug, thiserror::Error)]
#[error("{kind}{}: {message}", .status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
pub struct LlmError {
    /// The kind of error
    pub kind: LlmErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    /// Error message
    pub message: String,
    /// Suggested retry delay (from the Retry-After header)
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn with_kind(kind: LlmErrorKind, status_code: Option<u16>, message: String) -> Self {
        Self {
            kind,
            status_code,
            message,
            retry_after: None,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::with_kind(LlmErrorKind::RateLimited, Some(429), message)
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: String) -> Self {
        Self::with_kind(LlmErrorKind::Timeout, None, message)
    }

    /// Create a server error.
    pub fn server_error(status_code: u16, message: String) -> Self {
        Self::with_kind(LlmErrorKind::ServerError, Some(status_code), message)
    }

    /// Create a client error (bad request, auth, etc.).
    pub fn client_error(status_code: u16, message: String) -> Self {
        Self::with_kind(LlmErrorKind::ClientError, Some(status_code), message)
    }

    /// Create a network error.
    pub fn network_error(message: String) -> Self {
        Self::with_kind(LlmErrorKind::NetworkError, None, message)
    }

    /// Create a parse error.
    pub fn parse_error(message: String) -> Self {
        Self::with_kind(LlmErrorKind::ParseError, None, message)
    }

    /// Check if this error is transient and should be retried.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// Honors `retry_after` when the server sent one, otherwise
    /// `base * 2^attempt` capped at `max`.
    pub fn suggested_delay(&self, attempt: u32, base: Duration, max: Duration) -> Duration {
        if let Some(retry_after) = self.retry_after {
            return retry_after.min(max);
        }
        base.saturating_mul(2u32.saturating_pow(attempt)).min(max)
    }
}

/// Classification of LLM errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Rate limited (429) - transient
    RateLimited,
    /// Per-call timeout elapsed - transient
    Timeout,
    /// Server error (5xx)
    ServerError,
    /// Client error (400, 401, 403, 404)
    ClientError,
    /// Connection failed
    NetworkError,
    /// Response parsing error
    ParseError,
}

impl LlmErrorKind {
    /// Only rate limits and timeouts are retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmErrorKind::RateLimited | LlmErrorKind::Timeout)
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::RateLimited => "Rate limited",
            Self::Timeout => "Timeout",
            Self::ServerError => "Server error",
            Self::ClientError => "Client error",
            Self::NetworkError => "Network error",
            Self::ParseError => "Parse error",
        })
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Whether to retry on rate limit errors
    pub retry_rate_limits: bool,
    /// Whether to retry on timeouts
    pub retry_timeouts: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            retry_rate_limits: true,
            retry_timeouts: true,
        }
    }
}

impl RetryConfig {
    /// Check if the given error should be retried based on this config.
    pub fn should_retry(&self, error: &LlmError) -> bool {
        match error.kind {
            LlmErrorKind::RateLimited => self.retry_rate_limits,
            LlmErrorKind::Timeout => self.retry_timeouts,
            LlmErrorKind::ServerError
            | LlmErrorKind::ClientError
            | LlmErrorKind::NetworkError
            | LlmErrorKind::ParseError => false,
        }
    }
}

/// Parse HTTP status code into error kind.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        408 | 504 => LlmErrorKind::Timeout,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmErrorKind::RateLimited.is_transient());
        assert!(LlmErrorKind::Timeout.is_transient());
        assert!(!LlmErrorKind::ServerError.is_transient());
        assert!(!LlmErrorKind::NetworkError.is_transient());
        assert!(!LlmErrorKind::ClientError.is_transient());
        assert!(!LlmErrorKind::ParseError.is_transient());
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(classify_http_status(429), LlmErrorKind::RateLimited);
        assert_eq!(classify_http_status(504), LlmErrorKind::Timeout);
        assert_eq!(classify_http_status(500), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(503), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(400), LlmErrorKind::ClientError);
        assert_eq!(classify_http_status(401), LlmErrorKind::ClientError);
    }

    #[test]
    fn test_doubling_backoff() {
        let error = LlmError::timeout("slow".to_string());
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);

        assert_eq!(error.suggested_delay(0, base, max), Duration::from_secs(1));
        assert_eq!(error.suggested_delay(1, base, max), Duration::from_secs(2));
        assert_eq!(error.suggested_delay(2, base, max), Duration::from_secs(4));
        assert_eq!(error.suggested_delay(10, base, max), max);
    }

    #[test]
    fn test_retry_after_respected() {
        let error = LlmError::rate_limited("test".to_string(), Some(Duration::from_secs(30)));
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        assert_eq!(error.suggested_delay(0, base, max), Duration::from_secs(30));
        assert_eq!(error.suggested_delay(5, base, max), Duration::from_secs(30));
    }

    #[test]
    fn test_only_rate_limits_and_timeouts_retry() {
        let config = RetryConfig::default();
        assert!(config.should_retry(&LlmError::rate_limited("x".into(), None)));
        assert!(config.should_retry(&LlmError::timeout("x".into())));
        assert!(!config.should_retry(&LlmError::server_error(500, "x".into())));
        assert!(!config.should_retry(&LlmError::client_error(401, "x".into())));
    }

    #[test]
    fn test_display_includes_status() {
        let error = LlmError::client_error(401, "bad key".into());
        assert_eq!(error.to_string(), "Client error (HTTP 401): bad key");
    }
}
