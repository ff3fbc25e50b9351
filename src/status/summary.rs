//! Queue-wide status counts.

use serde::{Deserialize, Serialize};

use super::{DisplayStatus, StatusSnapshot};

/// Counts of transfers per summary bucket.
///
/// Created fresh by [`summarize`]; never updated in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatusSummary {
    /// Transfers currently in `Downloading`.
    pub downloading: u32,
    /// Transfers in `WaitingForSlot`.
    pub waiting_for_slot: u32,
    /// Transfers in `Stalled`.
    pub stalled: u32,
}

impl QueueStatusSummary {
    /// Total number of transfers counted in any bucket.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.downloading + self.waiting_for_slot + self.stalled
    }

    /// Returns true when no transfer falls in any bucket.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.total() == 0
    }
}

/// Aggregates snapshots into per-bucket counts in a single pass.
///
/// Statuses other than `Downloading`, `WaitingForSlot` and `Stalled` are not
/// counted. The fold is commutative, so input order never affects the result.
///
/// # Example
///
/// ```
/// use aniqueue_core::status::{DisplayStatus, TransferSnapshot, summarize};
///
/// let snapshots = [
///     TransferSnapshot::idle(DisplayStatus::Downloading),
///     TransferSnapshot::idle(DisplayStatus::WaitingForSlot),
///     TransferSnapshot::idle(DisplayStatus::Completed),
/// ];
/// let summary = summarize(&snapshots);
/// assert_eq!((summary.downloading, summary.waiting_for_slot, summary.stalled), (1, 1, 0));
/// ```
#[must_use]
pub fn summarize<I, S>(snapshots: I) -> QueueStatusSummary
where
    I: IntoIterator<Item = S>,
    S: StatusSnapshot,
{
    snapshots
        .into_iter()
        .fold(QueueStatusSummary::default(), |mut summary, snapshot| {
            match snapshot.display_status() {
                DisplayStatus::Downloading => summary.downloading += 1,
                DisplayStatus::WaitingForSlot => summary.waiting_for_slot += 1,
                DisplayStatus::Stalled => summary.stalled += 1,
                _ => {}
            }
            summary
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TransferSnapshot;

    fn snapshots(statuses: &[DisplayStatus]) -> Vec<TransferSnapshot> {
        statuses.iter().copied().map(TransferSnapshot::idle).collect()
    }

    #[test]
    fn test_summarize_empty_is_all_zero() {
        let summary = summarize(Vec::<TransferSnapshot>::new());
        assert_eq!(summary, QueueStatusSummary::default());
        assert!(summary.is_idle());
    }

    #[test]
    fn test_summarize_counts_buckets() {
        let input = snapshots(&[
            DisplayStatus::Downloading,
            DisplayStatus::Downloading,
            DisplayStatus::WaitingForSlot,
            DisplayStatus::Stalled,
        ]);
        let summary = summarize(&input);
        assert_eq!(
            summary,
            QueueStatusSummary {
                downloading: 2,
                waiting_for_slot: 1,
                stalled: 1,
            }
        );
    }

    #[test]
    fn test_summarize_ignores_other_statuses() {
        let input = snapshots(&DisplayStatus::ALL);
        let summary = summarize(&input);
        assert_eq!(summary.total(), 3);
        assert!(summary.total() as usize <= input.len());
    }

    #[test]
    fn test_summarize_is_order_independent() {
        let mut input = snapshots(&[
            DisplayStatus::Stalled,
            DisplayStatus::Failed,
            DisplayStatus::Downloading,
            DisplayStatus::WaitingForSlot,
            DisplayStatus::Downloading,
            DisplayStatus::Retrying,
        ]);
        let expected = summarize(&input);

        for _ in 0..input.len() {
            input.rotate_left(1);
            assert_eq!(summarize(&input), expected);
        }
        input.reverse();
        assert_eq!(summarize(&input), expected);
    }
}
