//! Retry scheduling with exponential backoff for transient transfer failures.
//!
//! A failed attempt is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - may succeed on retry (timeouts, 5xx, resets)
//! - [`FailureType::Permanent`] - will not succeed (404, TLS, local storage)
//! - [`FailureType::NeedsAuth`] - the source wants credentials
//! - [`FailureType::RateLimited`] - HTTP 429, retried with backoff
//!
//! [`RetryPolicy::should_retry`] then decides whether another attempt is made
//! and after how long.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::TransferFailure;

/// Default maximum attempts per transfer, including the first one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Upper bound for the random jitter added to each delay.
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Failure that won't succeed regardless of retries.
    Permanent,
    /// The source requires authentication.
    NeedsAuth,
    /// The source is rate limiting (HTTP 429).
    RateLimited,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Attempt number of the upcoming try (first retry is 2).
        attempt: u32,
    },
    /// Stop retrying.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// What the queue should do with a transfer after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Show `Retrying` with `attempt` and try again after `delay`.
    Retry {
        /// Retry number shown to the user (1 for the first retry).
        attempt: u32,
        /// Backoff before the next try.
        delay: Duration,
    },
    /// Show `Failed` with `reason`.
    GiveUp {
        /// Cause recorded as the transfer's last error.
        reason: String,
    },
}

/// Exponential backoff configuration.
///
/// With defaults (3 attempts, 1 s base, ×2, 32 s cap) the delays are roughly
/// 1 s and 2 s, each plus up to 500 ms of jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is raised to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: u32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier: backoff_multiplier.max(1),
        }
    }

    /// Creates a policy with a custom attempt limit and default delays.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the configured attempt limit.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether attempt number `attempt` (1-indexed) should be retried.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "authentication required by source".to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.backoff_delay(attempt) + jitter();
        debug!(attempt, delay_ms = delay.as_millis(), "will retry");

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Delay before retrying after attempt `attempt`, without jitter.
    ///
    /// `base * multiplier^(attempt - 1)`, capped at the configured maximum.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self
            .backoff_multiplier
            .checked_pow(exponent)
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn jitter() -> Duration {
    let max_ms = MAX_JITTER.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Classifies an engine failure report.
#[must_use]
pub fn classify_failure(failure: &TransferFailure) -> FailureType {
    match failure {
        TransferFailure::HttpStatus { status } => classify_http_status(*status),
        TransferFailure::Timeout | TransferFailure::Integrity { .. } => FailureType::Transient,
        TransferFailure::Network { message } => {
            if is_tls_message(message) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        TransferFailure::Storage { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code.
#[allow(clippy::match_same_arms)]
#[must_use]
pub fn classify_http_status(status: u16) -> FailureType {
    match status {
        401 | 403 | 407 => FailureType::NeedsAuth,
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        400..=499 => FailureType::Permanent,
        500..=599 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

fn is_tls_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Turns a failed attempt into the next queue state.
///
/// `attempt` is the 1-indexed attempt that just failed. A give-up reason is the
/// failure's own message so the user sees the concrete cause.
#[must_use]
pub fn plan_failure(policy: &RetryPolicy, failure: &TransferFailure, attempt: u32) -> FailureOutcome {
    match policy.should_retry(classify_failure(failure), attempt) {
        RetryDecision::Retry { delay, attempt } => FailureOutcome::Retry {
            attempt: attempt - 1,
            delay,
        },
        RetryDecision::DoNotRetry { reason } => {
            debug!(%failure, %reason, "giving up on transfer");
            FailureOutcome::GiveUp {
                reason: failure.to_string(),
            }
        }
    }
}
