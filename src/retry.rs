//! Bounded retry with exponential backoff and a per-call timeout.
//!
//! Delay before attempt `n` (1-based, after the first failure) is
//! `base × 2^(n-1)`, with the exponent capped at 5. A call that exceeds the
//! timeout counts as a transient failure.

use ragsync_core::error::EmbeddingError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

/// Errors that know whether another attempt could succeed.
pub trait Retryable: Sized + std::fmt::Display {
    fn is_transient(&self) -> bool;
    fn timed_out(after: Duration) -> Self;
}

impl Retryable for EmbeddingError {
    fn is_transient(&self) -> bool {
        EmbeddingError::is_transient(self)
    }
    fn timed_out(after: Duration) -> Self {
        EmbeddingError::Transient(format!("timed out after {:?}", after))
    }
}

/// Index backends report plain `anyhow` errors; treat all of them as
/// transient.
impl Retryable for anyhow::Error {
    fn is_transient(&self) -> bool {
        true
    }
    fn timed_out(after: Duration) -> Self {
        anyhow::anyhow!("timed out after {:?}", after)
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
/// Returns the last error.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        let delay = policy.delay_for(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(policy.timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(
                    operation = what,
                    attempt,
                    error = %e,
                    "transient failure, retrying"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(p.delay_for(0), Duration::ZERO);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(6), Duration::from_millis(3200));
        assert_eq!(p.delay_for(9), Duration::from_millis(3200));
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, EmbeddingError> = run_with_retry(&fast(3), "embed", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(EmbeddingError::Transient("busy".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(out.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_fails_fast() {
        let calls = AtomicU32::new(0);
        let out: Result<(), EmbeddingError> = run_with_retry(&fast(5), "embed", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EmbeddingError::Permanent("bad request".into()))
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let calls = AtomicU32::new(0);
        let out: Result<(), anyhow::Error> = run_with_retry(&fast(2), "upsert", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("locked"))
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let policy = RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
        };
        let out: Result<(), EmbeddingError> = run_with_retry(&policy, "embed", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = out.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("timed out"));
    }
}
