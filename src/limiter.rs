//! Token bucket rate limiting for remote API calls
//!
//! A single limiter is shared by every worker so the combined call rate stays
//! under the remote quota. Token accounting uses the tokio monotonic clock, so
//! wall-clock adjustments cannot skew the refill math.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Outcome of a single acquire call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// A token was consumed; the caller may issue one remote call
    Granted,
    /// The shared cancel token fired before a token became available
    Cancelled,
    /// The optional timeout elapsed before a token became available
    TimedOut,
}

/// Shared token bucket limiter
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Bucket>>,
}

struct Bucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    updated: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.updated).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
            self.updated = now;
        }
    }
}

impl RateLimiter {
    /// Create a limiter with `burst` capacity refilled at `rps` tokens/second
    pub fn new(rps: f64, burst: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Bucket {
                rate: rps,
                capacity: burst,
                tokens: burst,
                updated: Instant::now(),
            })),
        }
    }

    /// Block until a token is available, the cancel token fires, or the
    /// timeout elapses. No token is consumed unless `Granted` is returned,
    /// and none is granted when `cancel` is already set on entry.
    pub async fn acquire(&self, timeout: Option<Duration>, cancel: &CancellationToken) -> Acquire {
        if cancel.is_cancelled() {
            return Acquire::Cancelled;
        }

        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let wait = {
                let mut bucket = self.inner.lock().await;
                let now = Instant::now();
                bucket.refill(now);

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Acquire::Granted;
                }

                let needed = 1.0 - bucket.tokens;
                Duration::from_secs_f64((needed / bucket.rate).max(0.001))
            };

            let mut sleep_for = wait;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Acquire::TimedOut;
                }
                sleep_for = sleep_for.min(deadline - now);
            }

            trace!("Rate limiting: waiting {:?}", sleep_for);
            tokio::select! {
                _ = cancel.cancelled() => return Acquire::Cancelled,
                _ = tokio::time::sleep(sleep_for) => {}
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    // Re-check the bucket once before reporting the timeout so
                    // a token that became available during the final sleep is
                    // not wasted.
                    let mut bucket = self.inner.lock().await;
                    bucket.refill(Instant::now());
                    if bucket.tokens >= 1.0 {
                        bucket.tokens -= 1.0;
                        return Acquire::Granted;
                    }
                    return Acquire::TimedOut;
                }
            }
        }
    }
}
