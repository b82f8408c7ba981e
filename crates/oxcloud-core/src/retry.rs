//! Exponential backoff around fallible asynchronous operations.
//!
//! Whether an error is worth retrying is up to the caller; this module only
//! runs the loop. Waiting uses the tokio timer, so other tasks keep running.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use thiserror::Error;
use tracing::{debug, warn};

/// Result of an operation that gave up.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error; `source` is the
    /// error of the last attempt, unchanged.
    #[error("Retries exhausted after {attempts} attempts: {source}")]
    Exhausted {
        attempts: usize,
        #[source]
        source: E,
    },

    /// The operation failed with an error the predicate did not accept.
    #[error(transparent)]
    Fatal(E),
}

impl<E> RetryError<E> {
    /// The underlying error, whatever the reason for giving up.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Fatal(source) => source,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Backoff parameters.
///
/// Before attempt `k` (k ≥ 2) the loop sleeps `base_delay * 2^(k-1)`, capped
/// at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts including the first; `None` retries forever.
    pub max_attempts: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: Some(4),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_attempts: usize) -> Self {
        RetryPolicy {
            base_delay,
            max_attempts: Some(max_attempts.max(1)),
            ..Self::default()
        }
    }

    /// Retry until success or a fatal error.
    pub fn unbounded(base_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            base_delay,
            max_delay,
            max_attempts: None,
        }
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> + use<> {
        let retries = self
            .max_attempts
            .map_or(usize::MAX, |attempts| attempts.saturating_sub(1));
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay.saturating_mul(2).min(self.max_delay))
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(retries)
            .build()
    }
}

/// Run `operation` until it succeeds, fails fatally, or runs out of attempts.
///
/// # Example
///
/// ```
/// # use std::time::Duration;
/// # use oxcloud_core::retry::{retry_with_backoff, RetryPolicy};
/// # tokio_test_block_on(async {
/// let policy = RetryPolicy::new(Duration::from_millis(1), 3);
/// let value = retry_with_backoff(&policy, || async { Ok::<_, std::io::Error>(42) }, |_| true)
///     .await
///     .unwrap();
/// assert_eq!(value, 42);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(f)
/// # }
/// ```
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: R,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut delays = policy.backoff();
    let mut attempts = 0usize;

    loop {
        attempts += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !is_retryable(&error) {
            debug!(attempts, error = %error, "Non-retryable failure");
            return Err(RetryError::Fatal(error));
        }

        match delays.next() {
            Some(delay) => {
                debug!(attempts, delay_ms = delay.as_millis(), error = %error, "Retrying after backoff");
                tokio::time::sleep(delay).await;
            }
            None => {
                warn!(attempts, error = %error, "Giving up after retries");
                return Err(RetryError::Exhausted {
                    attempts,
                    source: error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient(usize),
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::new(Duration::from_millis(10), 4);
        let delays: Vec<_> = policy.backoff().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80)
            ]
        );
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(10), 6).with_max_delay(Duration::from_millis(50));
        assert!(policy.backoff().all(|d| d <= Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_waits_and_returns_last_error() {
        let base = Duration::from_millis(100);
        let policy = RetryPolicy::new(base, 4);
        let calls = AtomicUsize::new(0);
        let start = Instant::now();

        let result: Result<(), _> = retry_with_backoff(
            &policy,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(TestError::Transient(n)) }
            },
            |_| true,
        )
        .await;

        assert!(start.elapsed() >= base * 14);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(RetryError::Exhausted { attempts, source }) => {
                assert_eq!(attempts, 4);
                assert_eq!(source, TestError::Transient(3));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = retry_with_backoff(
            &RetryPolicy::default(),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Permanent) }
            },
            |e| matches!(e, TestError::Transient(_)),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Fatal(TestError::Permanent))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::unbounded(Duration::from_millis(5), Duration::from_millis(20));
        let value = retry_with_backoff(
            &policy,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < 9 { Err(TestError::Transient(n)) } else { Ok(n) } }
            },
            |_| true,
        )
        .await
        .unwrap();
        assert_eq!(value, 9);
    }
}
