//! Error types for transfer queue operations.

use thiserror::Error;

use crate::status::MediaKind;

/// `SQLite` primary and extended result codes for busy/locked conditions.
const BUSY_OR_LOCKED_CODES: [&str; 5] = ["5", "6", "261", "262", "517"];

/// Errors that can occur during transfer queue operations.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The item key is already queued under the same media kind.
    #[error(
        "transfer already queued for {kind}: {item_key}\n  Suggestion: Remove the existing transfer first or use a different item key"
    )]
    DuplicateTransfer {
        /// Media kind of the rejected transfer.
        kind: MediaKind,
        /// Item key that collided.
        item_key: String,
    },

    /// Another connection held the database past the busy timeout.
    #[error(
        "transfer database is busy: {0}\n  Suggestion: Another aniqueue process is writing to the queue; retry the command"
    )]
    Busy(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Transfer not found.
    #[error(
        "transfer not found: id {0}\n  Suggestion: The transfer may have been removed or the ID is incorrect"
    )]
    TransferNotFound(i64),
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        if is_busy_or_locked(&err) {
            Self::Busy(err.to_string())
        } else {
            Self::Database(err.to_string())
        }
    }
}

impl QueueError {
    /// Maps an insert failure, turning a unique-key collision into
    /// [`QueueError::DuplicateTransfer`].
    pub(crate) fn from_insert(err: sqlx::Error, kind: MediaKind, item_key: &str) -> Self {
        let duplicate = err
            .as_database_error()
            .is_some_and(|db_error| db_error.is_unique_violation());
        if duplicate {
            Self::DuplicateTransfer {
                kind,
                item_key: item_key.to_string(),
            }
        } else {
            err.into()
        }
    }

    /// Returns true when retrying the same operation later may succeed.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

fn is_busy_or_locked(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_error) => {
            if db_error
                .code()
                .is_some_and(|code| BUSY_OR_LOCKED_CODES.contains(&&*code))
            {
                return true;
            }
            let message = db_error.message().to_ascii_lowercase();
            message.contains("database is locked") || message.contains("database is busy")
        }
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_busy() {
        let err = QueueError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_busy());
        assert!(err.to_string().contains("retry the command"));
    }

    #[test]
    fn test_other_sqlx_error_is_plain_database_error() {
        let err = QueueError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_busy());
        assert!(err.to_string().starts_with("database error"));
    }

    #[test]
    fn test_insert_error_without_constraint_is_not_duplicate() {
        let err = QueueError::from_insert(sqlx::Error::PoolClosed, MediaKind::Anime, "ep-1");
        assert!(matches!(err, QueueError::Database(_)));
    }

    #[test]
    fn test_duplicate_transfer_message() {
        let err = QueueError::DuplicateTransfer {
            kind: MediaKind::Manga,
            item_key: "ch-1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("already queued for manga: ch-1"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_queue_error_not_found_message() {
        let msg = QueueError::TransferNotFound(42).to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("42"));
        assert!(msg.contains("Suggestion"));
    }
}
