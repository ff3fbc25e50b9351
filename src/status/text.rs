//! Reason text shown under each transfer in the downloads list.

use std::fmt;

use super::{DisplayStatus, MediaKind, StatusSnapshot};

/// Semantic message keys for transfer reason text.
///
/// Each key maps to one resource per media kind, named
/// `{kind}_download_status_{suffix}` (see [`MessageKey::resource_name`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    WaitingForSlot,
    WaitingForNetwork,
    WaitingForWifi,
    Preparing,
    Connecting,
    Stalled,
    /// Templated with the retry attempt (`%1$d`).
    Retrying,
    PausedByUser,
    PausedLowStorage,
    Verifying,
    Completed,
    /// Generic fallback for failures without a recorded cause.
    UnknownError,
}

impl MessageKey {
    /// Every key, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::WaitingForSlot,
        Self::WaitingForNetwork,
        Self::WaitingForWifi,
        Self::Preparing,
        Self::Connecting,
        Self::Stalled,
        Self::Retrying,
        Self::PausedByUser,
        Self::PausedLowStorage,
        Self::Verifying,
        Self::Completed,
        Self::UnknownError,
    ];

    /// Resource suffix shared by all media kinds.
    #[must_use]
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::WaitingForSlot => "waiting_for_slot",
            Self::WaitingForNetwork => "waiting_for_network",
            Self::WaitingForWifi => "waiting_for_wifi",
            Self::Preparing => "preparing",
            Self::Connecting => "connecting",
            Self::Stalled => "stalled",
            Self::Retrying => "retrying",
            Self::PausedByUser => "paused_by_user",
            Self::PausedLowStorage => "paused_low_storage",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::UnknownError => "unknown_error",
        }
    }

    /// Full resource name for a media kind, e.g. `manga_download_status_retrying`.
    #[must_use]
    pub fn resource_name(&self, kind: MediaKind) -> String {
        format!("{}_download_status_{}", kind.as_str(), self.suffix())
    }
}

/// Positional argument substituted into a message template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg<'a> {
    /// Integer argument (`%d`).
    Int(i64),
    /// Text argument (`%s`).
    Str(&'a str),
}

impl fmt::Display for FormatArg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

/// Localized string lookup collaborator.
pub trait StringLookup {
    /// Returns the localized text for `key` with `args` substituted.
    fn get(&self, key: MessageKey, args: &[FormatArg<'_>]) -> String;
}

impl<F> StringLookup for F
where
    F: Fn(MessageKey, &[FormatArg<'_>]) -> String,
{
    fn get(&self, key: MessageKey, args: &[FormatArg<'_>]) -> String {
        self(key, args)
    }
}

/// Maps a transfer's display status to the reason text shown to the user.
///
/// `Downloading` has no reason text. `Retrying` is templated with the retry
/// attempt. `Failed` prefers the recorded cause verbatim and falls back to the
/// generic unknown-error text, so a failure is never left unexplained.
///
/// # Example
///
/// ```
/// use aniqueue_core::status::{
///     MediaKind, StringTable, TransferSnapshot, display_reason_text,
/// };
///
/// let strings = StringTable::english(MediaKind::Manga);
/// let text = display_reason_text(&TransferSnapshot::retrying(3), &strings);
/// assert_eq!(text.as_deref(), Some("Retrying (attempt 3)"));
/// ```
#[must_use]
pub fn display_reason_text<S, L>(snapshot: &S, lookup: &L) -> Option<String>
where
    S: StatusSnapshot + ?Sized,
    L: StringLookup + ?Sized,
{
    let key = match snapshot.display_status() {
        DisplayStatus::Downloading => return None,
        DisplayStatus::Retrying => {
            let attempt = i64::from(snapshot.retry_attempt());
            return Some(lookup.get(MessageKey::Retrying, &[FormatArg::Int(attempt)]));
        }
        DisplayStatus::Failed => {
            if let Some(reason) = snapshot
                .last_error_reason()
                .filter(|reason| !reason.is_empty())
            {
                return Some(reason.to_string());
            }
            MessageKey::UnknownError
        }
        DisplayStatus::WaitingForSlot => MessageKey::WaitingForSlot,
        DisplayStatus::WaitingForNetwork => MessageKey::WaitingForNetwork,
        DisplayStatus::WaitingForWifi => MessageKey::WaitingForWifi,
        DisplayStatus::Preparing => MessageKey::Preparing,
        DisplayStatus::Connecting => MessageKey::Connecting,
        DisplayStatus::Stalled => MessageKey::Stalled,
        DisplayStatus::PausedByUser => MessageKey::PausedByUser,
        DisplayStatus::PausedLowStorage => MessageKey::PausedLowStorage,
        DisplayStatus::Verifying => MessageKey::Verifying,
        DisplayStatus::Completed => MessageKey::Completed,
    };

    Some(lookup.get(key, &[]))
}
