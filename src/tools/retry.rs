//! Bounded retry with exponential backoff for capability calls.

use std::future::Future;
use std::time::Duration;

use super::CapabilityError;

/// Retry policy for capability calls.
///
/// Only transient failures (rate limits, timeouts, connection errors) are
/// retried; everything else is returned on the first attempt.
#[derive(Debug, Clone)]
pub struct CapabilityRetry {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further retry
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for CapabilityRetry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl CapabilityRetry {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

/// Run `op` with retries according to `policy`.
pub async fn with_retry<T, F, Fut>(
    policy: &CapabilityRetry,
    operation: &str,
    mut op: F,
) -> Result<T, CapabilityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("{} succeeded after {} retries", operation, attempt);
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "{} attempt {} failed with {}, retrying in {:?}",
                    operation,
                    attempt + 1,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if attempt > 0 {
                    tracing::error!("{} failed after {} retries: {}", operation, attempt, error);
                } else {
                    tracing::debug!("{} failed: {}", operation, error);
                }
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::CapabilityErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> CapabilityRetry {
        CapabilityRetry {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = CapabilityRetry::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(), "search", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CapabilityError::new(CapabilityErrorKind::Timeout, "slow"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(), "search", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CapabilityError::from_status(429, "busy")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(), "search", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CapabilityError::from_status(401, "bad key")) }
        })
        .await;
        assert_eq!(result.unwrap_err().status_code, Some(401));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
