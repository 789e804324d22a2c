//! Retry Logic with Exponential Backoff
//!
//! This module implements retry logic for handling transient failures when
//! sending record batches to the REST proxy.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  send_batch_with_retry(...)  │ TopicSender API
//! └──────┬───────────────────────┘
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │  RetryPolicy                 │
//! │  - max_retries: 5            │
//! │  - initial_backoff: 100ms    │
//! │  - max_backoff: 30s          │
//! │  - backoff_multiplier: 2.0   │
//! └──────┬───────────────────────┘
//!        │
//!        ├─→ Attempt 1: Immediate
//!        ├─→ Attempt 2: Wait 100ms (backoff)
//!        ├─→ Attempt 3: Wait 200ms (backoff * 2)
//!        ├─→ Attempt 4: Wait 400ms (backoff * 4)
//!        ├─→ Attempt 5: Wait 800ms (backoff * 8)
//!        └─→ Attempt 6: Wait 1.6s  (backoff * 16)
//! ```
//!
//! ## Retryable vs Non-Retryable Errors
//!
//! Classification is delegated to [`ClientError::is_retryable`]:
//!
//! **Retryable** (transient failures):
//! - `Io`: proxy unreachable, connection reset, timeout
//! - `Http` 5xx, 408 and 429: proxy overloaded or restarting
//! - `Registry` I/O and 5xx failures
//!
//! **Non-Retryable** (permanent failures):
//! - `Authentication`: credentials rejected, needs `reset_connection()`
//! - `SchemaIncompatible`, `InvalidRecords`: same data fails again
//! - `UnsupportedMediaType`: every encoding was already tried
//!
//! ## Examples
//!
//! ```ignore
//! use radar_client::retry::{RetryPolicy, retry_with_backoff};
//!
//! let policy = RetryPolicy::default(); // 5 retries, 100ms-30s backoff
//!
//! retry_with_backoff(&policy, || sender.send_batch(records.clone())).await?;
//! ```
//!
//! [`TopicSender::send_batch_with_retry`](crate::TopicSender::send_batch_with_retry)
//! uses the jittered variant, so senders that lost the same proxy do not
//! all come back at once.

use crate::error::{ClientError, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration for exponential backoff.
///
/// # Fields
///
/// * `max_retries` - Maximum number of retry attempts (default: 5)
/// * `initial_backoff` - Initial backoff duration (default: 100ms)
/// * `max_backoff` - Maximum backoff duration (default: 30s)
/// * `backoff_multiplier` - Backoff multiplier for exponential growth (default: 2.0)
///
/// # Backoff Calculation
///
/// ```text
/// backoff = min(initial_backoff * multiplier^attempt, max_backoff)
/// ```
///
/// # Examples
///
/// ```ignore
/// // Conservative retries for a shared proxy
/// let policy = RetryPolicy {
///     max_retries: 3,
///     initial_backoff: Duration::from_millis(500),
///     max_backoff: Duration::from_secs(60),
///     backoff_multiplier: 3.0,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Maximum number of retry attempts
    /// * `initial_backoff` - Initial backoff duration
    /// * `max_backoff` - Maximum backoff duration
    /// * `backoff_multiplier` - Backoff multiplier for exponential growth
    pub fn new(
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Calculate backoff duration for a given attempt number.
    ///
    /// # Arguments
    ///
    /// * `attempt` - Attempt number (0-indexed)
    ///
    /// # Returns
    ///
    /// Backoff duration = min(initial_backoff * multiplier^attempt, max_backoff)
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);
        backoff.min(self.max_backoff)
    }

    /// Check if an error is retryable under this policy.
    pub fn is_retryable(&self, error: &ClientError) -> bool {
        error.is_retryable()
    }
}

/// Retry an operation with exponential backoff.
///
/// # Arguments
///
/// * `policy` - Retry policy configuration
/// * `operation` - Async operation to retry
///
/// # Returns
///
/// - `Ok(T)` if operation succeeds within max_retries
/// - `Err(ClientError)` if all retries exhausted or non-retryable error
///
/// # Behavior
///
/// 1. Try operation
/// 2. If success, return result
/// 3. If error is non-retryable, return error immediately
/// 4. If error is retryable and retries remaining, sleep for the backoff
///    duration and retry
/// 5. If all retries exhausted, return last error
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    retry_loop(policy, operation, |backoff| backoff).await
}

/// Retry an operation with jittered exponential backoff.
///
/// # Jitter
///
/// Adds random jitter (±25%) to backoff duration to prevent thundering herd
/// when many senders reconnect to a proxy that just came back.
///
/// ```text
/// jittered_backoff = backoff * (0.75 + random(0.0, 0.5))
/// ```
pub async fn retry_with_jittered_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    retry_loop(policy, operation, |backoff| {
        let jitter = 0.75 + (rand::random::<f64>() * 0.5); // 0.75-1.25x
        Duration::from_millis((backoff.as_millis() as f64 * jitter) as u64)
    })
    .await
}

async fn retry_loop<F, Fut, T, J>(policy: &RetryPolicy, mut operation: F, jitter: J) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    J: Fn(Duration) -> Duration,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                if !policy.is_retryable(&error) {
                    warn!(error = %error, "Non-retryable error, giving up");
                    return Err(error);
                }

                if attempt >= policy.max_retries {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        error = %error,
                        "Max retries exhausted, giving up"
                    );
                    return Err(error);
                }

                let backoff = jitter(policy.backoff(attempt));
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis(),
                    error = %error,
                    "Retryable error, backing off"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn unavailable() -> ClientError {
        ClientError::Http {
            status: 503,
            request: String::new(),
            response: "proxy down".to_string(),
        }
    }

    /// Replays a fixed sequence of send outcomes, then succeeds.
    struct ScriptedProxy {
        outcomes: Mutex<VecDeque<ClientError>>,
        attempts: Mutex<usize>,
    }

    impl ScriptedProxy {
        fn failing_with(errors: Vec<ClientError>) -> Self {
            Self {
                outcomes: Mutex::new(errors.into()),
                attempts: Mutex::new(0),
            }
        }

        async fn send(&self) -> Result<usize> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                *attempts += 1;
                *attempts
            };
            match self.outcomes.lock().unwrap().pop_front() {
                Some(error) => Err(error),
                None => Ok(attempt),
            }
        }

        fn attempts(&self) -> usize {
            *self.attempts.lock().unwrap()
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(1),
            Duration::from_millis(10),
            2.0,
        )
    }

    #[test]
    fn test_default_backoff_schedule_is_capped() {
        let policy = RetryPolicy::default();
        let schedule: Vec<u64> = (0..5).map(|n| policy.backoff(n).as_millis() as u64).collect();
        assert_eq!(schedule, vec![100, 200, 400, 800, 1600]);
        assert_eq!(policy.backoff(20), Duration::from_secs(30));

        let flat = RetryPolicy::new(5, Duration::from_millis(500), Duration::from_secs(60), 1.0);
        assert_eq!(flat.backoff(3), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let proxy = ScriptedProxy::failing_with(vec![
            ClientError::Io("connection reset".to_string()),
            unavailable(),
        ]);

        let attempt = retry_with_backoff(&fast_policy(5), || proxy.send()).await.unwrap();
        assert_eq!(attempt, 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_retrying() {
        let proxy = ScriptedProxy::failing_with(vec![
            unavailable(),
            ClientError::Authentication("HTTP 401".to_string()),
        ]);

        let err = retry_with_backoff(&fast_policy(5), || proxy.send()).await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(proxy.attempts(), 2);

        let proxy = ScriptedProxy::failing_with(vec![ClientError::SchemaIncompatible(
            "missing field".to_string(),
        )]);
        let err = retry_with_jittered_backoff(&fast_policy(5), || proxy.send())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SchemaIncompatible(_)));
        assert_eq!(proxy.attempts(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        for max_retries in [0, 2] {
            let proxy = ScriptedProxy::failing_with(vec![unavailable(); 10]);
            let err = retry_with_backoff(&fast_policy(max_retries), || proxy.send())
                .await
                .unwrap_err();
            assert_eq!(err, unavailable());
            assert_eq!(proxy.attempts(), max_retries + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100), Duration::from_secs(1), 2.0);

        let proxy = ScriptedProxy::failing_with(vec![unavailable(); 2]);
        let start = tokio::time::Instant::now();
        retry_with_backoff(&policy, || proxy.send()).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "waited {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(310), "waited {:?}", elapsed);

        // 100ms + 200ms, each scaled by 0.75-1.25
        let proxy = ScriptedProxy::failing_with(vec![unavailable(); 2]);
        let start = tokio::time::Instant::now();
        retry_with_jittered_backoff(&policy, || proxy.send()).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(225), "waited {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(380), "waited {:?}", elapsed);
    }
}
