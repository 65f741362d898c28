//! Error types for the download module.
//!
//! This module defines structured errors for all download operations,
//! providing context-rich error messages for debugging and user feedback.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while negotiating or transferring a download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The download was cancelled by the caller.
    #[error("download cancelled: {url}")]
    Cancelled {
        /// The URL whose download was cancelled.
        url: String,
    },

    /// A mid-stream read/write failure once the transfer had already
    /// started (reading the response body, or an incomplete transfer
    /// that did not meet the partial-completion threshold).
    #[error("transfer error downloading {url}: {message}")]
    Transfer {
        /// The URL being transferred.
        url: String,
        /// The underlying IO error's message.
        message: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates a mid-stream transfer error from a raw IO error.
    pub fn network_io(url: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transfer {
            url: url.into(),
            message: source.to_string(),
        }
    }

    /// Whether this error should be treated as transient and retried by
    /// the worker's retry policy, versus terminal.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::HttpStatus { .. }
                | Self::Io { .. }
                | Self::Transfer { .. }
        )
    }
}

/// Errors raised by the descriptor's control operations (`pause`, `resume`,
/// `retry`) when invoked from a status that does not permit them. `cancel`
/// never raises this: it is valid from any non-terminal state and a no-op
/// once terminal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot {operation} from status {status:?}")]
pub struct InvalidTransition {
    /// The operation that was rejected (`"pause"`, `"resume"`, `"retry"`).
    pub operation: &'static str,
    /// The status the descriptor was in at the time of the request.
    pub status: super::DownloadStatus,
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or `From<std::io::Error>`
// because our error variants require context (url, path) that the source errors
// don't provide. The helper constructor methods (network(), io(), etc.) are the
// correct pattern here as they allow callers to provide necessary context.
