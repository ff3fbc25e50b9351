//! Error types for tracker requests.
//!
//! Each authentication outcome is its own variant so callers can tell a
//! re-login prompt apart from a "try again later" message.

use thiserror::Error;

use super::Tracker;
use super::store::StorageError;

/// Failure to obtain any response from the tracker.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS resolution, TLS, reset while reading the body).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The connection could not be established.
    #[error("connection failed for {url}: {message}")]
    Connection {
        /// The URL that failed.
        url: String,
        /// Transport error text.
        message: String,
    },
}

impl TransportError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a connection error.
    pub fn connection(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by the tracker interceptors.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// No token is stored; the request was never sent.
    #[error("not logged in to {tracker}\n  Suggestion: Run `aniqueue auth login {tracker}`")]
    NotAuthenticated {
        /// Tracker the request was for.
        tracker: Tracker,
    },

    /// The stored AniList token expired; the session was logged out.
    #[error("{tracker} login expired\n  Suggestion: Run `aniqueue auth login {tracker}` again")]
    LoginExpired {
        /// Tracker the request was for.
        tracker: Tracker,
    },

    /// The refresh token was rejected; a new login is required.
    #[error("{tracker} token expired and cannot be refreshed\n  Suggestion: Run `aniqueue auth login {tracker}` again")]
    TokenExpired {
        /// Tracker the request was for.
        tracker: Tracker,
    },

    /// Refreshing the token failed for a reason other than rejection.
    #[error("failed to refresh {tracker} token: {reason}")]
    TokenRefreshFailed {
        /// Tracker the request was for.
        tracker: Tracker,
        /// What went wrong.
        reason: String,
    },

    /// The stored token cannot be sent as a header value.
    #[error("stored {tracker} token is not a valid header value\n  Suggestion: Run `aniqueue auth logout {tracker}` and log in again")]
    InvalidCredential {
        /// Tracker the request was for.
        tracker: Tracker,
    },

    /// The request could not be delivered.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The token store failed.
    #[error("token storage error: {0}")]
    Storage(#[from] StorageError),
}

impl TrackerError {
    /// Creates a refresh failure.
    pub fn refresh_failed(tracker: Tracker, reason: impl Into<String>) -> Self {
        Self::TokenRefreshFailed {
            tracker,
            reason: reason.into(),
        }
    }

    /// True when the user has to log in (again) before requests can succeed.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated { .. }
                | Self::LoginExpired { .. }
                | Self::TokenExpired { .. }
                | Self::InvalidCredential { .. }
        )
    }
}
