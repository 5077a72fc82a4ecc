//! Generic retry executor with exponential backoff and jitter.
//!
//! Wraps an arbitrary async operation and re-runs it on transient failure:
//! classification lives in [`classify`], delay computation honours a
//! server-supplied Retry-After hint when one is present and falls back to
//! exponential backoff otherwise. The executor never swallows an error —
//! callers always get either the value or the last observed failure.

pub mod classify;

use std::future::Future;
use std::time::Duration;

use rand::Rng;

pub use classify::{is_retryable, TransientError};

/// Immutable retry policy. Shared read-only across concurrent jobs.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one. Must be ≥ 1.
    pub max_attempts: u32,
    /// Backoff base for the first retry.
    pub initial_delay: Duration,
    /// Hard cap applied to every computed delay, jitter included.
    pub max_delay: Duration,
    /// Exponential growth factor. Must be > 1.
    pub backoff_multiplier: f64,
    /// Upper bound of the uniform random jitter added to every delay.
    pub jitter_max: Duration,
    /// Substrings matched against system error codes (case-sensitive)
    /// and display messages (case-insensitive).
    pub retryable_error_patterns: Vec<String>,
    /// HTTP status codes considered transient.
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter_max: Duration::from_millis(1000),
            retryable_error_patterns: [
                "ECONNRESET",
                "ECONNREFUSED",
                "ETIMEDOUT",
                "ENOTFOUND",
                "EAI_AGAIN",
                "ENETUNREACH",
                "EHOSTUNREACH",
                "EPIPE",
                "timeout",
                "timed out",
                "connection reset",
                "connection refused",
                "network unreachable",
                "dns",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            retryable_status_codes: vec![408, 429, 500, 502, 503, 504, 520, 521, 522, 523, 524],
        }
    }
}

impl RetryConfig {
    /// Check the policy invariants. Called by config loading; the executor
    /// itself tolerates a degenerate policy by clamping `max_attempts` to 1.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts < 1 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.backoff_multiplier <= 1.0 {
            return Err("backoff_multiplier must be greater than 1".into());
        }
        if self.initial_delay > self.max_delay {
            return Err("initial_delay must not exceed max_delay".into());
        }
        Ok(())
    }
}

/// Per-attempt record handed to the retry callback. Logging only — never
/// persisted.
#[derive(Debug)]
pub struct AttemptOutcome<'e, E> {
    /// 0-based index of the attempt that just failed.
    pub attempt: u32,
    /// The failure that triggered the retry.
    pub error: &'e E,
    /// Backoff accumulated so far, including the delay about to be slept.
    pub total_delay: Duration,
}

/// Terminal result of a retry sequence.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The value, or the last observed error. Exactly one of the two.
    pub outcome: Result<T, E>,
    /// Attempts actually made (1-based count).
    pub attempts: u32,
    /// Total time spent sleeping between attempts.
    pub total_delay: Duration,
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Run `operation` under `config` with no retry callback.
pub async fn execute<T, E, F, Fut>(operation: F, config: &RetryConfig) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientError,
{
    execute_with(operation, config, |_| {}).await
}

/// Run `operation` up to `config.max_attempts` times.
///
/// On each transient failure with attempts remaining, `on_retry` is invoked
/// with the attempt index, accumulated delay, and the error, then the caller
/// is suspended for the computed delay. Non-retryable failures and retry
/// exhaustion return immediately with the last error.
pub async fn execute_with<T, E, F, Fut, C>(
    mut operation: F,
    config: &RetryConfig,
    mut on_retry: C,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientError,
    C: FnMut(&AttemptOutcome<'_, E>),
{
    let max_attempts = config.max_attempts.max(1);
    let mut total_delay = Duration::ZERO;
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                return RetryResult {
                    outcome: Ok(value),
                    attempts: attempt + 1,
                    total_delay,
                }
            }
            Err(error) => {
                let out_of_attempts = attempt + 1 >= max_attempts;
                if out_of_attempts || !is_retryable(&error, config) {
                    return RetryResult {
                        outcome: Err(error),
                        attempts: attempt + 1,
                        total_delay,
                    };
                }

                let delay = compute_delay(attempt, error.retry_after(), config);
                total_delay += delay;
                on_retry(&AttemptOutcome {
                    attempt,
                    error: &error,
                    total_delay,
                });
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}

/// Compute the delay before the retry following failed attempt `attempt`.
///
/// A server-supplied Retry-After hint overrides exponential backoff; jitter
/// is added in both cases and the result is capped at `max_delay`.
pub fn compute_delay(
    attempt: u32,
    retry_after: Option<Duration>,
    config: &RetryConfig,
) -> Duration {
    let jitter_max_ms = config.jitter_max.as_millis() as u64;
    let jitter = if jitter_max_ms == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_max_ms))
    };
    delay_for(attempt, retry_after, jitter, config)
}

/// Pure delay computation with jitter injected (unit-testable bounds).
fn delay_for(
    attempt: u32,
    retry_after: Option<Duration>,
    jitter: Duration,
    config: &RetryConfig,
) -> Duration {
    let base = match retry_after {
        Some(hint) => hint,
        None => {
            // Floored to whole milliseconds before jitter is added.
            let ms = config.initial_delay.as_millis() as f64
                * config.backoff_multiplier.powi(attempt as i32);
            Duration::from_millis(ms.min(config.max_delay.as_millis() as f64) as u64)
        }
    };
    (base + jitter).min(config.max_delay)
}

/// Parse an HTTP Retry-After header value into a duration.
///
/// Accepts either an integer-seconds value or an HTTP-date (RFC 2822); a
/// date in the past clamps to zero. Unparsable values return `None` so the
/// caller falls back to exponential backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<i64>() {
        return Some(Duration::from_secs(seconds.max(0) as u64));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(Duration::from_secs(delta.num_seconds().max(0) as u64))
}
