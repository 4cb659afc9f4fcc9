//! Retry policy, classification and the retry loop.
//!
//! Retry is opt-in and composes across three levels: per-call options
//! override per-collection options, which override store-wide options,
//! merged field by field. An unset field falls through to the next level;
//! an explicit `enabled` at a more specific level is final, so a call that
//! disables retry cannot be re-enabled by a broader default.

use futures::future::BoxFuture;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::{Error, Result};

/// Returns whether the retry loop may replay an operation that failed with
/// this error. Delegates to [`Error::is_retryable`].
pub fn should_retry(error: &Error) -> bool {
    error.is_retryable()
}

/// A fully-resolved retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 means no retry).
    pub max_attempts: u32,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Upper clamp on any single delay.
    pub max_delay: Duration,
    /// Whether to jitter each delay.
    pub randomize: bool,
    /// Absolute wall-clock budget across all attempts.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_factor: 2.0,
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            randomize: true,
            max_elapsed: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    /// The delay to sleep before retry number `attempt` (1-based over
    /// failed attempts), exponential and clamped to `[0, max_delay]` so a
    /// degenerate factor can never produce an invalid duration. Jitter is
    /// applied separately so this stays deterministic for tests.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let raw = (self.min_delay.as_secs_f64() * exp).max(0.0);
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }
}

/// One level of retry configuration; every field optional.
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    /// Opt-in switch. Retry runs only when some level sets this to `true`
    /// and no more specific level sets it to `false`.
    pub enabled: Option<bool>,
    pub max_attempts: Option<u32>,
    pub backoff_factor: Option<f64>,
    pub min_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub randomize: Option<bool>,
    pub max_elapsed: Option<Duration>,
}

impl RetryOptions {
    /// Enables retry with all other fields falling through.
    pub fn enabled() -> Self {
        Self { enabled: Some(true), ..Self::default() }
    }

    /// Explicitly disables retry at this level; final for more general
    /// levels.
    pub fn disabled() -> Self {
        Self { enabled: Some(false), ..Self::default() }
    }

    /// Merges call > collection > store options into an effective policy.
    /// Returns `None` when retry is not enabled for the call.
    pub fn resolve(call: &RetryOptions, collection: &RetryOptions, store: &RetryOptions) -> Option<RetryPolicy> {
        fn pick<T: Copy>(
            call: Option<T>,
            collection: Option<T>,
            store: Option<T>,
        ) -> Option<T> {
            call.or(collection).or(store)
        }

        let enabled = pick(call.enabled, collection.enabled, store.enabled).unwrap_or(false);
        if !enabled {
            return None;
        }

        let defaults = RetryPolicy::default();
        Some(RetryPolicy {
            max_attempts: pick(call.max_attempts, collection.max_attempts, store.max_attempts)
                .unwrap_or(defaults.max_attempts),
            backoff_factor: pick(call.backoff_factor, collection.backoff_factor, store.backoff_factor)
                .unwrap_or(defaults.backoff_factor),
            min_delay: pick(call.min_delay, collection.min_delay, store.min_delay)
                .unwrap_or(defaults.min_delay),
            max_delay: pick(call.max_delay, collection.max_delay, store.max_delay)
                .unwrap_or(defaults.max_delay),
            randomize: pick(call.randomize, collection.randomize, store.randomize)
                .unwrap_or(defaults.randomize),
            max_elapsed: pick(call.max_elapsed, collection.max_elapsed, store.max_elapsed)
                .or(defaults.max_elapsed),
        })
    }
}

/// An external cancellation signal for retry loops.
///
/// Cancelling never rolls anything back; it only stops further attempts.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-call execution options carried by every orchestrator operation.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub retry: RetryOptions,
    pub cancellation: Option<CancellationToken>,
}

impl CallOptions {
    pub fn with_retry(retry: RetryOptions) -> Self {
        Self { retry, ..Self::default() }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Drives `op` to completion, replaying retryable failures per `policy`.
///
/// With no policy the operation runs exactly once. Once the cancellation
/// token is observed the loop stops and surfaces [`Error::Cancelled`]
/// instead of the underlying retryable error.
pub(crate) async fn run_with_retry<'a, T, F>(
    operation: &'static str,
    policy: Option<RetryPolicy>,
    cancellation: Option<CancellationToken>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> BoxFuture<'a, Result<T>>,
{
    let Some(policy) = policy else {
        return op().await;
    };

    let started = Instant::now();
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !should_retry(&error) || attempt >= policy.max_attempts.max(1) {
                    return Err(error);
                }
                if let Some(budget) = policy.max_elapsed {
                    if started.elapsed() >= budget {
                        return Err(error);
                    }
                }
                if let Some(token) = &cancellation {
                    if token.is_cancelled() {
                        return Err(Error::Cancelled { operation: operation.to_string() });
                    }
                }

                let mut delay = policy.delay_for_attempt(attempt);
                if policy.randomize {
                    // Jitter into [delay/2, delay] to spread contending
                    // retriers.
                    let factor = rand::thread_rng().gen_range(0.5..=1.0);
                    delay = delay.mul_f64(factor);
                }
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;

                if let Some(token) = &cancellation {
                    if token.is_cancelled() {
                        return Err(Error::Cancelled { operation: operation.to_string() });
                    }
                }
                attempt += 1;
            }
        }
    }
}
