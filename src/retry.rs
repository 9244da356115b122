//! Retry/backoff combinator shared by the fetcher, the LLM gateway and the
//! public data API clients, built on `backoff::future::retry_notify`.
//!
//! Every budget in this crate counts retries: `max_retries = 3` means one
//! attempt plus at most three retries.

use backoff::backoff::{Backoff, Zero};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again
    Retry(Duration),
    /// Give up and return the error
    Stop,
}

/// Exponential backoff parameters: `base * 2^attempt`, randomized by `randomization_factor`
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            randomization_factor: 0.25,
        }
    }

    /// A policy that retries immediately, used by tests and tight loops
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            randomization_factor: 0.0,
        }
    }

    /// Fresh interval schedule for one retried call
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(self.randomization_factor)
            .with_max_interval(Duration::from_secs(60))
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Flat schedule whose delays fall uniformly in `[min, max]`
pub fn window(min: Duration, max: Duration) -> ExponentialBackoff {
    let max = max.max(min);
    let mid = (min + max) / 2;
    let factor = if mid.is_zero() {
        0.0
    } else {
        (max - min).as_secs_f64() / (max + min).as_secs_f64()
    };
    ExponentialBackoffBuilder::new()
        .with_initial_interval(mid)
        .with_multiplier(1.0)
        .with_randomization_factor(factor)
        .with_max_interval(max)
        .with_max_elapsed_time(None)
        .build()
}

/// One delay drawn from [`window`]
pub fn jitter(min: Duration, max: Duration) -> Duration {
    window(min, max)
        .next_backoff()
        .map_or(min, |delay| delay.clamp(min, max.max(min)))
}

/// Drives `op` through `backoff` until it succeeds, `classify` marks the error
/// permanent, or `max_attempts` runs have failed.
async fn run<T, E, B, Op, Fut, Classify>(backoff: B, max_attempts: u32, classify: Classify, mut op: Op) -> Result<T, E>
where
    B: Backoff,
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: Fn(u32, E) -> backoff::Error<E>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let classify = &classify;
    let mut attempt = 0u32;

    backoff::future::retry_notify(
        backoff,
        move || {
            let current = attempt;
            attempt += 1;
            let fut = op(current);
            async move {
                fut.await.map_err(|err| {
                    if current + 1 >= max_attempts {
                        backoff::Error::permanent(err)
                    } else {
                        classify(current, err)
                    }
                })
            }
        },
        |err: E, delay: Duration| {
            tracing::debug!(delay_ms = delay.as_millis() as u64, error = %err, "Retrying after transient error");
        },
    )
    .await
}

/// Runs `op` until it succeeds, `decide` says stop, or `max_attempts` is hit.
///
/// `op` receives the 0-based attempt number so callers can vary request
/// details (headers, endpoints) between attempts.
pub async fn retry_with<T, E, Op, Fut, Decide>(max_attempts: u32, decide: Decide, op: Op) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Decide: Fn(u32, &E) -> RetryDecision,
    E: Display,
{
    run(
        Zero {},
        max_attempts,
        |attempt, err| match decide(attempt, &err) {
            RetryDecision::Retry(delay) => backoff::Error::retry_after(err, delay),
            RetryDecision::Stop => backoff::Error::permanent(err),
        },
        op,
    )
    .await
}

/// Exponential backoff over errors accepted by `is_retryable`.
///
/// The operation runs at most `policy.max_retries + 1` times.
pub async fn retry<T, E, Op, Fut, Pred>(policy: &RetryPolicy, is_retryable: Pred, op: Op) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Pred: Fn(&E) -> bool,
    E: Display,
{
    run(
        policy.backoff(),
        policy.max_retries + 1,
        |_, err| {
            if is_retryable(&err) {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            }
        },
        op,
    )
    .await
}
