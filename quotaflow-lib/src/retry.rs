use log::debug;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u64 = 4;

/// Default wait before the first retry
pub const DEFAULT_RETRY_WAIT_TIME: Duration = Duration::from_secs(1);

/// Growth of the wait time between consecutive retries
const BACKOFF_FACTOR: f64 = 1.5;

/// Errors of the guarded remote call that may go away on a second try
pub trait Retryable {
    /// Whether the failed call should be attempted again
    fn should_retry(&self) -> bool;
}

/// Exponential backoff for the guarded remote call.
///
/// Every attempt runs the whole operation again. Acquire permits inside the
/// operation, so a failed attempt returns its slots before the policy
/// sleeps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u64,
    /// Wait before the first retry
    #[serde(with = "humantime_serde")]
    pub wait_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WAIT_TIME)
    }
}

impl RetryPolicy {
    /// Create a new policy
    #[must_use]
    pub const fn new(max_retries: u64, wait_time: Duration) -> Self {
        Self {
            max_retries,
            wait_time,
        }
    }

    /// A policy that never retries
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails with an error that should not be
    /// retried, or the retries are used up.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retries: u64 = 0;
        let mut wait_time = self.wait_time;

        let mut result = op().await;
        while retries < self.max_retries {
            if !matches!(&result, Err(e) if e.should_retry()) {
                return result;
            }
            retries += 1;
            debug!("Retrying failed call ({retries}/{}) in {wait_time:?}", self.max_retries);
            tokio::time::sleep(wait_time).await;
            wait_time = wait_time.mul_f64(BACKOFF_FACTOR);
            result = op().await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, PartialEq)]
    enum CallError {
        Overloaded,
        BadInput,
    }

    impl Retryable for CallError {
        fn should_retry(&self) -> bool {
            matches!(self, Self::Overloaded)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let attempts = &AtomicU64::new(0);
        let start = tokio::time::Instant::now();

        let result = RetryPolicy::default()
            .run(move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CallError::Overloaded)
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 1s + 1.5s of backoff
        assert!(start.elapsed() >= Duration::from_millis(2500));
        assert!(start.elapsed() < Duration::from_millis(2600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let attempts = &AtomicU64::new(0);

        let result: Result<(), _> = RetryPolicy::new(2, Duration::from_millis(10))
            .run(move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Overloaded)
            })
            .await;

        assert_eq!(result, Err(CallError::Overloaded));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_returned_at_once() {
        let attempts = &AtomicU64::new(0);

        let result: Result<(), _> = RetryPolicy::default()
            .run(move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CallError::BadInput)
            })
            .await;

        assert_eq!(result, Err(CallError::BadInput));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_none_runs_once() {
        let attempts = &AtomicU64::new(0);
        let _: Result<(), _> = RetryPolicy::none()
            .run(move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Overloaded)
            })
            .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
