//! Transfer rows and insert payloads.

use std::fmt;

use serde::Serialize;
use sqlx::FromRow;

use crate::status::{DisplayStatus, MediaKind, StatusSnapshot};

/// Payload for registering a transfer with the queue.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    /// Media pipeline the transfer belongs to.
    pub media_kind: MediaKind,
    /// Engine identifier, unique per media kind (episode or chapter id).
    pub item_key: String,
    /// Title shown in the downloads list.
    pub title: String,
}

impl NewTransfer {
    /// Creates a payload for `item_key` in the `media_kind` pipeline.
    pub fn new(media_kind: MediaKind, item_key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            media_kind,
            item_key: item_key.into(),
            title: title.into(),
        }
    }
}

/// A persisted transfer snapshot.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TransferRecord {
    /// Unique identifier.
    pub id: i64,
    /// Media kind (stored as text, parsed via `media_kind()`).
    #[sqlx(rename = "media_kind")]
    #[serde(rename = "media_kind")]
    pub media_kind_str: String,
    /// Engine identifier.
    pub item_key: String,
    /// Title shown in the downloads list.
    pub title: String,
    /// Display status (stored as text, parsed via `status()`).
    #[sqlx(rename = "display_status")]
    #[serde(rename = "display_status")]
    pub status_str: String,
    /// Whether the engine is streaming bytes for this row.
    #[sqlx(rename = "is_running")]
    pub is_running: bool,
    /// Epoch millis of the last observed progress.
    pub last_progress_at: i64,
    /// Retries since the last reset.
    #[sqlx(rename = "retry_attempt")]
    #[serde(rename = "retry_attempt")]
    pub retry_attempt_count: i64,
    /// Failure cause; only present while failed.
    pub last_error: Option<String>,
    /// Bytes written so far.
    pub bytes_downloaded: i64,
    /// Expected total bytes when known.
    pub content_length: Option<i64>,
    /// When the row was created.
    pub created_at: String,
    /// When the row was last updated.
    pub updated_at: String,
}

impl TransferRecord {
    /// Returns the parsed display status.
    ///
    /// Falls back to `WaitingForSlot` if the stored string is invalid.
    #[must_use]
    pub fn status(&self) -> DisplayStatus {
        self.status_str.parse().unwrap_or(DisplayStatus::WaitingForSlot)
    }

    /// Returns the parsed media kind.
    ///
    /// Falls back to `Anime` if the stored string is invalid.
    #[must_use]
    pub fn media_kind(&self) -> MediaKind {
        self.media_kind_str.parse().unwrap_or(MediaKind::Anime)
    }

    /// Download progress in percent, when the content length is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self) -> Option<f64> {
        match self.content_length {
            Some(total) if total > 0 => {
                Some((self.bytes_downloaded as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

impl StatusSnapshot for TransferRecord {
    fn is_running_transfer(&self) -> bool {
        self.is_running
    }

    fn display_status(&self) -> DisplayStatus {
        self.status()
    }

    fn last_progress_at(&self) -> i64 {
        self.last_progress_at
    }

    fn retry_attempt(&self) -> u32 {
        u32::try_from(self.retry_attempt_count).unwrap_or(0)
    }

    fn last_error_reason(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TransferRecord {{ id: {}, kind: {}, key: {}, status: {} }}",
            self.id,
            self.media_kind_str,
            self.item_key,
            self.status()
        )
    }
}
