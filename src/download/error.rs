//! Failure reports produced by the download engine.
//!
//! The engine reports why a transfer attempt ended; this crate classifies the
//! report and decides whether the transfer is retried or marked failed.

use thiserror::Error;

/// Why a transfer attempt ended unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferFailure {
    /// The source answered with an HTTP error status.
    #[error("HTTP {status} from source")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
    },

    /// The source did not answer in time.
    #[error("connection timed out")]
    Timeout,

    /// Network-level failure (DNS, refused connection, reset, TLS).
    #[error("network error: {message}")]
    Network {
        /// Transport error text.
        message: String,
    },

    /// Local storage failure (create, write, rename).
    #[error("storage error: {message}")]
    Storage {
        /// Filesystem error text.
        message: String,
    },

    /// The written file does not match the announced size.
    #[error("integrity check failed: expected {expected_bytes} bytes, got {actual_bytes}")]
    Integrity {
        /// Size announced by the source.
        expected_bytes: u64,
        /// Size written to disk.
        actual_bytes: u64,
    },
}

impl TransferFailure {
    /// Creates an HTTP status failure.
    #[must_use]
    pub fn http_status(status: u16) -> Self {
        Self::HttpStatus { status }
    }

    /// Creates a network failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a storage failure.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
