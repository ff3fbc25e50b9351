//! Download status taxonomy shared by the anime, manga and light-novel pipelines.
//!
//! The download engine owns the transfers and updates their fields as bytes
//! move. This module only reads point-in-time views of those transfers:
//!
//! - [`StatusSnapshot`] - the read-only contract every transfer type implements
//! - [`should_mark_stalled`] - stall predicate evaluated on every UI tick
//! - [`summarize`] - queue-wide counts for the downloads header
//! - [`display_reason_text`] - user-facing reason line per transfer
//! - [`resolve_display_status`] - derivation of the display status from engine signals
//!
//! # Example
//!
//! ```
//! use aniqueue_core::status::{DisplayStatus, TransferSnapshot, should_mark_stalled, summarize};
//!
//! let snapshot = TransferSnapshot::running(DisplayStatus::Downloading, 1_000);
//! assert!(should_mark_stalled(&snapshot, 11_001));
//!
//! let summary = summarize([&snapshot]);
//! assert_eq!(summary.downloading, 1);
//! ```

mod resolve;
mod stall;
mod strings;
mod summary;
mod text;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use resolve::{NetworkState, TransferPhase, TransferSignals, resolve_display_status};
pub use stall::{STALL_THRESHOLD_MS, should_mark_stalled};
pub use strings::StringTable;
pub use summary::{QueueStatusSummary, summarize};
pub use text::{FormatArg, MessageKey, StringLookup, display_reason_text};

/// User-facing classification of a transfer's current condition.
///
/// Exactly one status is active at a time. Transitions are driven by the
/// download engine; nothing in this crate advances a transfer on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    /// Queued behind other transfers, waiting for a free slot.
    WaitingForSlot,
    /// No network connection is available.
    WaitingForNetwork,
    /// Wi-Fi only mode is on and the device is on a metered network.
    WaitingForWifi,
    /// Resolving pages / episode sources before the transfer starts.
    Preparing,
    /// Opening the connection to the source.
    Connecting,
    /// Bytes are actively being transferred.
    Downloading,
    /// Running, but no progress has been observed within the stall window.
    Stalled,
    /// Waiting for a scheduled retry after a transient failure.
    Retrying,
    /// Paused by the user.
    PausedByUser,
    /// Paused because free storage dropped below the engine's floor.
    PausedLowStorage,
    /// Verifying downloaded files.
    Verifying,
    /// Finished successfully.
    Completed,
    /// Terminal failure; the transfer may carry a human-readable cause.
    Failed,
}

impl DisplayStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::WaitingForSlot,
        Self::WaitingForNetwork,
        Self::WaitingForWifi,
        Self::Preparing,
        Self::Connecting,
        Self::Downloading,
        Self::Stalled,
        Self::Retrying,
        Self::PausedByUser,
        Self::PausedLowStorage,
        Self::Verifying,
        Self::Completed,
        Self::Failed,
    ];

    /// Returns the stable string representation used in the database and JSON.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingForSlot => "waiting_for_slot",
            Self::WaitingForNetwork => "waiting_for_network",
            Self::WaitingForWifi => "waiting_for_wifi",
            Self::Preparing => "preparing",
            Self::Connecting => "connecting",
            Self::Downloading => "downloading",
            Self::Stalled => "stalled",
            Self::Retrying => "retrying",
            Self::PausedByUser => "paused_by_user",
            Self::PausedLowStorage => "paused_low_storage",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns true for statuses the engine will not leave on its own.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DisplayStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid display status: {s}"))
    }
}

/// The media pipeline a transfer belongs to.
///
/// All kinds share one status taxonomy; they differ only in the resource names
/// used for localized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Anime episodes.
    Anime,
    /// Manga chapters.
    Manga,
    /// Light-novel chapters.
    Novel,
}

impl MediaKind {
    /// Every media kind.
    pub const ALL: [Self; 3] = [Self::Anime, Self::Manga, Self::Novel];

    /// Returns the stable string representation used in the database and resource names.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anime => "anime",
            Self::Manga => "manga",
            Self::Novel => "novel",
        }
    }

    /// Returns the noun used by the built-in English strings.
    #[must_use]
    pub fn item_noun(&self) -> &'static str {
        match self {
            Self::Anime => "Episode",
            Self::Manga | Self::Novel => "Chapter",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anime" => Ok(Self::Anime),
            "manga" => Ok(Self::Manga),
            "novel" => Ok(Self::Novel),
            _ => Err(format!("invalid media kind: {s}")),
        }
    }
}

/// Read-only view of a single transfer's current status.
///
/// Implemented by every transfer type so the stall detector, summarizer and
/// text mapper are written once for all media kinds.
pub trait StatusSnapshot {
    /// True only while bytes are actively being fetched.
    fn is_running_transfer(&self) -> bool;

    /// The current display status.
    fn display_status(&self) -> DisplayStatus;

    /// Epoch millis of the last observed byte progress; `<= 0` means none yet.
    fn last_progress_at(&self) -> i64;

    /// Retry attempts since the last full reset.
    fn retry_attempt(&self) -> u32;

    /// Human-readable failure cause, only meaningful when the status is `Failed`.
    fn last_error_reason(&self) -> Option<&str>;
}

impl<T: StatusSnapshot + ?Sized> StatusSnapshot for &T {
    fn is_running_transfer(&self) -> bool {
        (**self).is_running_transfer()
    }

    fn display_status(&self) -> DisplayStatus {
        (**self).display_status()
    }

    fn last_progress_at(&self) -> i64 {
        (**self).last_progress_at()
    }

    fn retry_attempt(&self) -> u32 {
        (**self).retry_attempt()
    }

    fn last_error_reason(&self) -> Option<&str> {
        (**self).last_error_reason()
    }
}

/// Owned, serializable snapshot of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSnapshot {
    /// Whether bytes are actively being fetched.
    pub is_running_transfer: bool,
    /// Current display status.
    pub display_status: DisplayStatus,
    /// Epoch millis of the last observed progress.
    pub last_progress_at: i64,
    /// Retry attempts since the last reset.
    pub retry_attempt: u32,
    /// Failure cause when `display_status` is `Failed`.
    pub last_error_reason: Option<String>,
}

impl TransferSnapshot {
    /// Creates an idle snapshot (not running, no progress) in the given status.
    #[must_use]
    pub fn idle(display_status: DisplayStatus) -> Self {
        Self {
            is_running_transfer: false,
            display_status,
            last_progress_at: 0,
            retry_attempt: 0,
            last_error_reason: None,
        }
    }

    /// Creates a running snapshot whose last progress was seen at `last_progress_at`.
    #[must_use]
    pub fn running(display_status: DisplayStatus, last_progress_at: i64) -> Self {
        Self {
            is_running_transfer: true,
            last_progress_at,
            ..Self::idle(display_status)
        }
    }

    /// Creates a failed snapshot with an optional cause.
    #[must_use]
    pub fn failed(reason: Option<&str>) -> Self {
        Self {
            last_error_reason: reason.map(str::to_string),
            ..Self::idle(DisplayStatus::Failed)
        }
    }

    /// Creates a snapshot waiting on retry attempt `attempt`.
    #[must_use]
    pub fn retrying(attempt: u32) -> Self {
        Self {
            retry_attempt: attempt,
            ..Self::idle(DisplayStatus::Retrying)
        }
    }
}

impl StatusSnapshot for TransferSnapshot {
    fn is_running_transfer(&self) -> bool {
        self.is_running_transfer
    }

    fn display_status(&self) -> DisplayStatus {
        self.display_status
    }

    fn last_progress_at(&self) -> i64 {
        self.last_progress_at
    }

    fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    fn last_error_reason(&self) -> Option<&str> {
        self.last_error_reason.as_deref()
    }
}
