//! Derivation of the display status from low-level engine signals.

use serde::{Deserialize, Serialize};

use super::{DisplayStatus, TransferSnapshot, should_mark_stalled};

/// Engine-side lifecycle phase of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    /// Accepted by the engine but not yet assigned a worker slot.
    Queued,
    /// Resolving sources before the first request.
    Preparing,
    /// Connection being established.
    Connecting,
    /// Worker is streaming bytes.
    Transferring,
    /// Post-download verification.
    Verifying,
    /// Finished successfully.
    Completed,
    /// Gave up.
    Failed,
}

/// Connectivity as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    /// No usable network.
    Unavailable,
    /// Cellular or otherwise metered connection.
    Metered,
    /// Wi-Fi / ethernet.
    Unmetered,
}

/// Low-level signals the engine exposes for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSignals {
    pub phase: TransferPhase,
    pub paused_by_user: bool,
    pub storage_low: bool,
    pub network: NetworkState,
    /// Downloads are restricted to unmetered networks.
    pub wifi_only: bool,
    /// Retry attempt scheduled after a transient failure, if any.
    pub pending_retry: Option<u32>,
    /// Epoch millis of the last observed progress; `<= 0` means none.
    pub last_progress_at: i64,
}

impl TransferSignals {
    /// Signals for a transfer in `phase` with nothing gating it.
    #[must_use]
    pub fn new(phase: TransferPhase) -> Self {
        Self {
            phase,
            paused_by_user: false,
            storage_low: false,
            network: NetworkState::Unmetered,
            wifi_only: false,
            pending_retry: None,
            last_progress_at: 0,
        }
    }
}

/// Collapses engine signals into the single display status shown to the user.
///
/// Terminal phases win, then user and storage pauses, then connectivity gates,
/// then a scheduled retry. Only a transferring worker can be `Downloading` or
/// `Stalled`, decided by [`should_mark_stalled`].
#[must_use]
pub fn resolve_display_status(signals: &TransferSignals, now_millis: i64) -> DisplayStatus {
    match signals.phase {
        TransferPhase::Completed => return DisplayStatus::Completed,
        TransferPhase::Failed => return DisplayStatus::Failed,
        _ => {}
    }

    if signals.paused_by_user {
        return DisplayStatus::PausedByUser;
    }
    if signals.storage_low {
        return DisplayStatus::PausedLowStorage;
    }
    if signals.network == NetworkState::Unavailable {
        return DisplayStatus::WaitingForNetwork;
    }
    if signals.wifi_only && signals.network == NetworkState::Metered {
        return DisplayStatus::WaitingForWifi;
    }
    if signals.pending_retry.is_some() {
        return DisplayStatus::Retrying;
    }

    match signals.phase {
        TransferPhase::Queued => DisplayStatus::WaitingForSlot,
        TransferPhase::Preparing => DisplayStatus::Preparing,
        TransferPhase::Connecting => DisplayStatus::Connecting,
        TransferPhase::Verifying => DisplayStatus::Verifying,
        TransferPhase::Transferring => {
            let running =
                TransferSnapshot::running(DisplayStatus::Downloading, signals.last_progress_at);
            if should_mark_stalled(&running, now_millis) {
                DisplayStatus::Stalled
            } else {
                DisplayStatus::Downloading
            }
        }
        TransferPhase::Completed => DisplayStatus::Completed,
        TransferPhase::Failed => DisplayStatus::Failed,
    }
}
