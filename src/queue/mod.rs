//! `SQLite`-backed store for transfer snapshots.
//!
//! The download engine writes the snapshot fields here as transfers move;
//! observers (the CLI, widgets) read them back and run the status helpers over
//! the rows, since [`TransferRecord`] implements
//! [`StatusSnapshot`](crate::status::StatusSnapshot).
//!
//! # Example
//!
//! ```no_run
//! use aniqueue_core::{Database, MediaKind, NewTransfer, TransferQueue};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("transfers.db")).await?;
//! let queue = TransferQueue::new(db);
//!
//! let id = queue.add(&NewTransfer::new(MediaKind::Anime, "ep-3", "Episode 3")).await?;
//! queue.record_progress(id, 4096, Some(1 << 20), 1_700_000_000_000).await?;
//! let summary = queue.summary(None).await?;
//! assert_eq!(summary.downloading, 1);
//! # Ok(())
//! # }
//! ```

mod error;
mod item;

pub use error::QueueError;
pub use item::{NewTransfer, TransferRecord};

use sqlx::Row;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::download::{FailureOutcome, RetryPolicy, TransferFailure, plan_failure};
use crate::status::{
    DisplayStatus, MediaKind, QueueStatusSummary, StatusSnapshot, should_mark_stalled, summarize,
};

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Returns `Ok(())` if at least one row was affected; otherwise [`QueueError::TransferNotFound`].
fn check_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(QueueError::TransferNotFound(id))
    } else {
        Ok(())
    }
}

/// Trims a failure cause; blank causes become absent.
fn normalize_reason(reason: Option<&str>) -> Option<&str> {
    reason.map(str::trim).filter(|r| !r.is_empty())
}

/// Statuses during which the engine holds a worker on the transfer.
fn is_running_status(status: DisplayStatus) -> bool {
    matches!(status, DisplayStatus::Downloading | DisplayStatus::Stalled)
}

/// Transfer snapshot store.
#[derive(Debug, Clone)]
pub struct TransferQueue {
    db: Database,
}

impl TransferQueue {
    /// Creates a store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Registers a transfer in `WaitingForSlot`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::DuplicateTransfer`] when the item key already exists
    /// for the media kind.
    /// Returns [`QueueError::Database`] if the insert fails otherwise.
    #[instrument(skip(self, transfer), fields(kind = %transfer.media_kind, key = %transfer.item_key))]
    pub async fn add(&self, transfer: &NewTransfer) -> Result<i64> {
        let row = sqlx::query(
            r"INSERT INTO transfers (media_kind, item_key, title, display_status)
              VALUES (?, ?, ?, ?)
              RETURNING id",
        )
        .bind(transfer.media_kind.as_str())
        .bind(&transfer.item_key)
        .bind(&transfer.title)
        .bind(DisplayStatus::WaitingForSlot.as_str())
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| QueueError::from_insert(err, transfer.media_kind, &transfer.item_key))?;

        Ok(row.get("id"))
    }

    /// Gets a transfer by ID.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Option<TransferRecord>> {
        let record = sqlx::query_as::<_, TransferRecord>(r"SELECT * FROM transfers WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(record)
    }

    /// Lists transfers in insertion order, optionally restricted to one media kind.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self, kind: Option<MediaKind>) -> Result<Vec<TransferRecord>> {
        let records = match kind {
            Some(kind) => {
                sqlx::query_as::<_, TransferRecord>(
                    r"SELECT * FROM transfers WHERE media_kind = ? ORDER BY created_at ASC, id ASC",
                )
                .bind(kind.as_str())
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, TransferRecord>(
                    r"SELECT * FROM transfers ORDER BY created_at ASC, id ASC",
                )
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(records)
    }

    /// Moves a transfer to `status`.
    ///
    /// Leaving `Failed` clears the recorded error; reaching `Completed` resets
    /// the retry counter. Use [`mark_failed`](Self::mark_failed) to record a cause.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TransferNotFound`] if no transfer exists with the given ID.
    /// Returns [`QueueError::Database`] if the update fails.
    #[instrument(skip(self), fields(status = %status))]
    pub async fn set_status(&self, id: i64, status: DisplayStatus) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE transfers
              SET display_status = ?,
                  is_running = ?,
                  last_error = CASE WHEN ? = 'failed' THEN last_error ELSE NULL END,
                  retry_attempt = CASE WHEN ? = 'completed' THEN 0 ELSE retry_attempt END,
                  updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(is_running_status(status))
        .bind(status.as_str())
        .bind(status.as_str())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Records byte progress observed at `now_millis`.
    ///
    /// The transfer becomes a running `Downloading` transfer; a stalled one
    /// recovers on the next progress report.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TransferNotFound`] if no transfer exists with the given ID.
    /// Returns [`QueueError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn record_progress(
        &self,
        id: i64,
        bytes_downloaded: i64,
        content_length: Option<i64>,
        now_millis: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE transfers
              SET display_status = ?,
                  is_running = 1,
                  last_progress_at = ?,
                  bytes_downloaded = ?,
                  content_length = COALESCE(?, content_length),
                  last_error = NULL,
                  updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(DisplayStatus::Downloading.as_str())
        .bind(now_millis)
        .bind(bytes_downloaded.max(0))
        .bind(content_length)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Applies `policy` to a failed attempt and persists the outcome.
    ///
    /// The failed attempt is the stored retry count plus one. A retry leaves the
    /// transfer `Retrying` with the new retry number; giving up marks it
    /// `Failed` with the failure text as the cause. The write only lands if the
    /// retry count is unchanged since the read, so concurrent reports for the
    /// same transfer each consume their own attempt.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TransferNotFound`] if no transfer exists with the given ID.
    /// Returns [`QueueError::Database`] if a query fails.
    #[instrument(skip(self, policy), fields(failure = %failure))]
    pub async fn record_failure(
        &self,
        id: i64,
        policy: &RetryPolicy,
        failure: &TransferFailure,
    ) -> Result<FailureOutcome> {
        loop {
            let record = self
                .get(id)
                .await?
                .ok_or(QueueError::TransferNotFound(id))?;
            let failed_attempt = StatusSnapshot::retry_attempt(&record).saturating_add(1);
            let outcome = plan_failure(policy, failure, failed_attempt);

            let (status, retry_attempt, last_error) = match &outcome {
                FailureOutcome::Retry { attempt, delay } => {
                    debug!(id, attempt, delay_ms = delay.as_millis(), "Scheduling retry");
                    (DisplayStatus::Retrying, i64::from(*attempt), None)
                }
                FailureOutcome::GiveUp { reason } => {
                    debug!(id, reason = %reason, "Giving up on transfer");
                    (
                        DisplayStatus::Failed,
                        record.retry_attempt_count,
                        normalize_reason(Some(reason)),
                    )
                }
            };

            let result = sqlx::query(
                r"UPDATE transfers
                  SET display_status = ?,
                      is_running = 0,
                      retry_attempt = ?,
                      last_error = ?,
                      updated_at = datetime('now')
                  WHERE id = ? AND retry_attempt = ?",
            )
            .bind(status.as_str())
            .bind(retry_attempt)
            .bind(last_error)
            .bind(id)
            .bind(record.retry_attempt_count)
            .execute(self.db.pool())
            .await?;

            if result.rows_affected() > 0 {
                return Ok(outcome);
            }
            debug!(id, "Retry count moved since read, re-planning");
        }
    }

    /// Marks a transfer failed with an optional cause.
    ///
    /// A blank cause is stored as absent so the generic failure text is shown.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TransferNotFound`] if no transfer exists with the given ID.
    /// Returns [`QueueError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, id: i64, reason: Option<&str>) -> Result<()> {
        let reason = normalize_reason(reason);
        let result = sqlx::query(
            r"UPDATE transfers
              SET display_status = ?,
                  is_running = 0,
                  last_error = ?,
                  updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(DisplayStatus::Failed.as_str())
        .bind(reason)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Removes a transfer by ID.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TransferNotFound`] if no transfer exists with the given ID.
    /// Returns [`QueueError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: i64) -> Result<()> {
        let result = sqlx::query(r"DELETE FROM transfers WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        check_affected(id, result.rows_affected())
    }

    /// Summarizes the stored transfers, optionally for one media kind.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn summary(&self, kind: Option<MediaKind>) -> Result<QueueStatusSummary> {
        let records = self.list(kind).await?;
        Ok(summarize(&records))
    }

    /// Marks running `Downloading` transfers without recent progress as `Stalled`.
    ///
    /// Returns the number of transfers reclassified.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if a query fails.
    #[instrument(skip(self))]
    pub async fn reclassify_stalled(&self, now_millis: i64) -> Result<u64> {
        let candidates = sqlx::query_as::<_, TransferRecord>(
            r"SELECT * FROM transfers WHERE display_status = ? AND is_running = 1",
        )
        .bind(DisplayStatus::Downloading.as_str())
        .fetch_all(self.db.pool())
        .await?;

        let mut stalled = 0;
        for record in candidates
            .iter()
            .filter(|record| should_mark_stalled(*record, now_millis))
        {
            // Progress may have landed since the read; only flip the row we judged.
            let result = sqlx::query(
                r"UPDATE transfers
                  SET display_status = ?, updated_at = datetime('now')
                  WHERE id = ? AND display_status = ? AND last_progress_at = ?",
            )
            .bind(DisplayStatus::Stalled.as_str())
            .bind(record.id)
            .bind(DisplayStatus::Downloading.as_str())
            .bind(record.last_progress_at)
            .execute(self.db.pool())
            .await?;
            stalled += result.rows_affected();
        }

        if stalled > 0 {
            debug!(stalled, "Reclassified stalled transfers");
        }
        Ok(stalled)
    }
}
