//! Retry with exponential backoff for transient fetch failures
//!
//! **Backoff Strategy:**
//! - Initial delay: `base_delay` (1s by default)
//! - Multiplier: 2.0 (1s, 2s, 4s, ...)
//! - Only errors where [`is_transient`](crate::error::RefDataError::is_transient) holds are retried

use crate::error::RefDataResult;
use std::time::{Duration, Instant};

/// Retry settings for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// # Arguments
/// * `operation_name` - Name for logging (usually the URL)
/// * `policy` - Retry count and base delay
/// * `operation` - Async closure performing one attempt
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> RefDataResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = RefDataResult<T>>,
{
    let start_time = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying fetch");
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Fetch succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_transient() {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Permanent fetch failure, not retrying"
                    );
                    return Err(err);
                }

                let retry = attempt;
                if retry > policy.max_retries {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Fetch failed: retries exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for(retry);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient fetch failure, will retry after backoff"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefDataError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> RefDataError {
        RefDataError::Network {
            url: "https://wiki.example".to_string(),
            message: "connection reset".to_string(),
            status: None,
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_with_backoff("op", fast_policy(3), |_| async { Ok::<_, RefDataError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_backoff("op", fast_policy(3), move |_| {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("body")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: RefDataResult<()> = retry_with_backoff("op", fast_policy(3), move |_| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert!(result.is_err());
        // One initial attempt plus three retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: RefDataResult<()> = retry_with_backoff("op", fast_policy(3), move |_| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RefDataError::Network {
                    url: "https://wiki.example".to_string(),
                    message: "not found".to_string(),
                    status: Some(404),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
