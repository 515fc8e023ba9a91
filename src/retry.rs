//! Bounded exponential backoff around remote API calls
//!
//! Every attempt, including the first, acquires a rate limit token before the
//! call goes out, so retries never bypass the shared quota. Backoff sleeps are
//! interruptible by the shared cancel token: a shutdown request is never held
//! up behind a long backoff.

use crate::config::RetryConfig;
use crate::drive::ApiError;
use crate::limiter::{Acquire, RateLimiter};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Executes remote calls with rate limiting and bounded retries
#[derive(Clone)]
pub struct RetryExecutor {
    limiter: RateLimiter,
    cancel: CancellationToken,
    max_retries: u32,
    base_delay_secs: f64,
    max_delay_secs: f64,
}

impl RetryExecutor {
    pub fn new(config: &RetryConfig, limiter: RateLimiter, cancel: CancellationToken) -> Self {
        Self {
            limiter,
            cancel,
            max_retries: config.max_retries,
            base_delay_secs: config.base_delay_secs,
            max_delay_secs: config.max_delay_secs,
        }
    }

    /// Backoff delay for a 0-indexed attempt, before jitter
    fn delay_secs(&self, attempt: u32) -> f64 {
        let exp = 2f64.powi(attempt.min(31) as i32);
        (self.base_delay_secs * exp).min(self.max_delay_secs)
    }

    /// Invoke `op`, retrying retryable failures with capped exponential
    /// backoff. Fatal failures and retry exhaustion surface the error as-is;
    /// cancellation surfaces as `ApiError::Shutdown`.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match self.limiter.acquire(None, &self.cancel).await {
                Acquire::Granted => {}
                Acquire::Cancelled => return Err(ApiError::Shutdown),
                Acquire::TimedOut => return Err(ApiError::LimiterTimeout),
            }

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.max_retries {
                return Err(err);
            }

            let mut delay = self.delay_secs(attempt);
            delay *= 0.7 + rand::thread_rng().gen::<f64>() * 0.6;
            attempt += 1;

            warn!(
                attempt,
                delay_secs = format!("{:.2}", delay),
                max_retries = self.max_retries,
                error = %err,
                "remote call failed, retrying"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ApiError::Shutdown),
                _ = tokio::time::sleep(Duration::from_secs_f64(delay)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn executor(max_retries: u32, base_delay_secs: f64) -> RetryExecutor {
        RetryExecutor::new(
            &RetryConfig {
                max_retries,
                base_delay_secs,
                max_delay_secs: base_delay_secs * 4.0,
            },
            RateLimiter::new(1000.0, 1000.0),
            CancellationToken::new(),
        )
    }

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            status: code,
            endpoint: "/test".to_string(),
            message: String::new(),
        }
    }

    #[tokio::test]
    async fn test_success_needs_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = executor(3, 0.001)
            .execute(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ApiError>(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_triggers_zero_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = executor(5, 0.001)
            .execute(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(status(403))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Status { status: 403, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retryable_exhausts_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = executor(2, 0.001)
            .execute(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(status(503))
                }
            })
            .await
            .unwrap_err();

        // 1 initial attempt + 2 retries, last retryable error surfaced.
        assert!(matches!(err, ApiError::Status { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = executor(4, 0.001)
            .execute(|| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(status(429))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let limiter = RateLimiter::new(1000.0, 1000.0);
        let cancel = CancellationToken::new();
        let executor = RetryExecutor::new(
            &RetryConfig {
                max_retries: 5,
                base_delay_secs: 30.0,
                max_delay_secs: 60.0,
            },
            limiter,
            cancel.clone(),
        );

        let task = tokio::spawn(async move {
            executor
                .execute(|| async { Err::<(), _>(status(500)) })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ApiError::Shutdown));
    }

    #[test]
    fn test_delay_is_capped() {
        let executor = executor(8, 1.0);
        assert_eq!(executor.delay_secs(0), 1.0);
        assert_eq!(executor.delay_secs(1), 2.0);
        assert_eq!(executor.delay_secs(2), 4.0);
        // Cap is base * 4 in the test fixture.
        assert_eq!(executor.delay_secs(5), 4.0);
    }
}
