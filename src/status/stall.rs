//! Stall detection for running transfers.

use super::{DisplayStatus, StatusSnapshot};

/// A running transfer with no progress for this long is considered stalled.
pub const STALL_THRESHOLD_MS: i64 = 10_000;

/// Decides whether a running transfer should be shown as stalled.
///
/// Returns `false` when the transfer is not running, when a retry is in
/// progress (so the item never flaps between `Retrying` and `Stalled`), or when
/// no progress baseline exists yet. Otherwise the transfer is stalled once
/// [`STALL_THRESHOLD_MS`] have elapsed since its last progress.
///
/// Pure and idempotent; safe to call on every UI tick.
///
/// # Example
///
/// ```
/// use aniqueue_core::status::{DisplayStatus, TransferSnapshot, should_mark_stalled};
///
/// let snapshot = TransferSnapshot::running(DisplayStatus::Downloading, 1_000);
/// assert!(!should_mark_stalled(&snapshot, 10_999));
/// assert!(should_mark_stalled(&snapshot, 11_000));
/// ```
#[must_use]
pub fn should_mark_stalled<S: StatusSnapshot + ?Sized>(snapshot: &S, now_millis: i64) -> bool {
    if !snapshot.is_running_transfer() {
        return false;
    }
    if snapshot.display_status() == DisplayStatus::Retrying {
        return false;
    }

    let last_progress_at = snapshot.last_progress_at();
    if last_progress_at <= 0 {
        return false;
    }

    now_millis.saturating_sub(last_progress_at) >= STALL_THRESHOLD_MS
}
