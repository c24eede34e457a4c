//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use curio_core::constants::{OWNER_RETRY_ATTEMPTS, OWNER_RETRY_BASE_DELAY};
use curio_core::error::{CurioError, Result};

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_EXPONENT: u32 = 8;

/// Bounded retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay after the first failure; doubles after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: OWNER_RETRY_ATTEMPTS,
            base_delay: OWNER_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Same attempt count, no waiting.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after the failed attempt `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.min(MAX_BACKOFF_EXPONENT))
    }
}

/// Runs `op` until it succeeds or the policy is exhausted.
///
/// The final error is [`CurioError::LedgerReadFailed`] carrying the last
/// underlying failure.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, target: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(key = target, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                warn!(key = target, attempt, error = %e, "Attempt failed");
                last_error = Some(e);
                if attempt + 1 < attempts {
                    let delay = policy.backoff_delay(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    Err(CurioError::LedgerReadFailed {
        target: target.to_string(),
        attempts,
        reason: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(20), policy.backoff_delay(8));
    }

    #[tokio::test]
    async fn test_recovers_before_exhaustion() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&RetryPolicy::immediate(3), "0xc", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CurioError::RpcError("flaky".into()))
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
    async fn test_exhaustion_reports_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(&RetryPolicy::immediate(3), "0xc", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CurioError::RpcError("execution reverted".into())) }
        })
        .await;

        match result {
            Err(CurioError::LedgerReadFailed {
                target,
                attempts,
                reason,
            }) => {
                assert_eq!(target, "0xc");
                assert_eq!(attempts, 3);
                assert!(reason.contains("execution reverted"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_between_attempts() {
        let start = tokio::time::Instant::now();
        let _: Result<()> = retry_with_backoff(&RetryPolicy::default(), "0xc", || async {
            Err(CurioError::RpcError("down".into()))
        })
        .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1600));
    }
}
