//! aniqueue Core Library
//!
//! This library provides the download status core and the tracker
//! authentication layer of a media library client (anime, manga and
//! light-novel downloads; AniList and MyAnimeList tracking).
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`status`] - Display status taxonomy, stall detection, queue summaries and reason text
//! - [`download`] - Transfer failure classification and retry policy
//! - [`db`] - Database connection and schema management
//! - [`queue`] - Persistent transfer queue shared by all media kinds
//! - [`tracker`] - HTTP chain abstraction and the AniList / MyAnimeList auth interceptors

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod db;
pub mod download;
pub mod queue;
pub mod status;
pub mod tracker;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use db::{Database, DbError};
pub use download::{
    DEFAULT_MAX_RETRIES, FailureOutcome, FailureType, RetryDecision, RetryPolicy,
    TransferFailure, classify_failure, plan_failure,
};
pub use queue::{NewTransfer, QueueError, TransferQueue, TransferRecord};
pub use status::{
    DisplayStatus, FormatArg, MediaKind, MessageKey, NetworkState, QueueStatusSummary,
    STALL_THRESHOLD_MS, StatusSnapshot, StringLookup, StringTable, TransferPhase,
    TransferSignals, TransferSnapshot, display_reason_text, resolve_display_status,
    should_mark_stalled, summarize,
};
pub use tracker::{
    AnilistInterceptor, AnilistOAuth, AuthExpiryFlag, EncryptedFileTokenStore, HttpChain,
    Interceptor, MalOAuth, MemoryTokenStore, MyAnimeListInterceptor, ReqwestChain, StorageError,
    TokenStore, Tracker, TrackerClient, TrackerError, TrackerRequest, TrackerResponse,
    TransportError,
};
