//! Transient-failure classification for the retry executor.
//!
//! A pure decision function: given an error and a `RetryConfig`, decide
//! whether another attempt is worth making. Holds no state and performs
//! no I/O, so it is tested exhaustively in isolation.

use std::time::Duration;

use super::RetryConfig;

/// Failure metadata the classifier inspects.
///
/// Errors crossing a network boundary (extraction provider, object storage)
/// implement this so the retry executor can tell rate limiting and upstream
/// outages apart from semantic failures. Every method has a conservative
/// default: an error that reports nothing is treated as fatal.
pub trait TransientError: std::fmt::Display {
    /// HTTP status code carried by the failure, if any.
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// System/network error code (e.g. "ECONNRESET"), if any.
    /// Matched case-sensitively against the configured patterns.
    fn error_code(&self) -> Option<&str> {
        None
    }

    /// True if the failure was an explicit timeout.
    fn is_timeout(&self) -> bool {
        false
    }

    /// Server-supplied Retry-After hint, if the response carried one.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Decide whether `error` is worth retrying under `config`.
///
/// Order of checks: status code, system error code (case-sensitive),
/// explicit timeout tag, then a case-insensitive scan of the display
/// message. Anything that matches none of these is fatal.
pub fn is_retryable<E: TransientError>(error: &E, config: &RetryConfig) -> bool {
    if let Some(status) = error.status_code() {
        if config.retryable_status_codes.contains(&status) {
            return true;
        }
    }

    if let Some(code) = error.error_code() {
        if config
            .retryable_error_patterns
            .iter()
            .any(|pattern| code.contains(pattern.as_str()))
        {
            return true;
        }
    }

    if error.is_timeout() {
        return true;
    }

    let message = error.to_string().to_lowercase();
    config
        .retryable_error_patterns
        .iter()
        .any(|pattern| message.contains(&pattern.to_lowercase()))
}
