//! Failure classification and retry scheduling for transfers.
//!
//! The download engine itself lives outside this crate. When an attempt ends
//! with a [`TransferFailure`], [`plan_failure`] classifies it and consults a
//! [`RetryPolicy`] to decide between `Retrying` (with a backoff delay) and
//! `Failed` (with a reason the UI shows verbatim).
//!
//! # Example
//!
//! ```
//! use aniqueue_core::download::{FailureOutcome, RetryPolicy, TransferFailure, plan_failure};
//!
//! let policy = RetryPolicy::default();
//! match plan_failure(&policy, &TransferFailure::http_status(503), 1) {
//!     FailureOutcome::Retry { attempt, delay } => println!("retry #{attempt} in {delay:?}"),
//!     FailureOutcome::GiveUp { reason } => println!("failed: {reason}"),
//! }
//! ```

mod error;
mod retry;

pub use error::TransferFailure;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureOutcome, FailureType, RetryDecision, RetryPolicy,
    classify_failure, classify_http_status, plan_failure,
};
