//! Error types for queue operations.

use std::fmt;

use thiserror::Error;

/// Structured classification for queue/database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/foreign-key/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Expected row was not found.
    RowNotFound,
    /// Filesystem or transport IO failure.
    Io,
    /// SQL protocol/driver error.
    Protocol,
    /// Unclassified database failure.
    Other,
}

impl QueueDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Protocol(_) => Self::Protocol,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for QueueDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Protocol => "protocol",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> QueueDbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return QueueDbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_foreign_key_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return QueueDbErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("database is busy")
    {
        return QueueDbErrorKind::BusyOrLocked;
    }

    QueueDbErrorKind::Other
}

/// Errors that can occur during queue operations.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification used for failure handling and KPI gates.
        kind: QueueDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// The URL given to `add_url` could not be parsed as an absolute URI.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The raw string that failed to parse.
        url: String,
    },

    /// The URL parsed but uses a scheme other than `http`/`https`.
    #[error("unsupported URL scheme '{scheme}' in {url}")]
    UnsupportedScheme {
        /// The offending scheme, e.g. `"ftp"`.
        scheme: String,
        /// The full URL it came from.
        url: String,
    },

    /// A download for this URL is already tracked by the manager.
    #[error("URL already queued: {0}")]
    DuplicateUrl(String),

    /// No download is tracked under the given URL.
    #[error("no download tracked for URL: {0}")]
    NotFound(String),

    /// The requested operation does not apply to the download's current status.
    #[error("cannot {operation} {url}: {reason}")]
    WrongState {
        /// The operation that was rejected (`"pause"`, `"resume"`, ...).
        operation: &'static str,
        /// The URL of the download.
        url: String,
        /// Why the operation was rejected.
        reason: String,
    },
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: QueueDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl QueueError {
    /// Creates a `WrongState` error for a rejected control operation.
    #[must_use]
    pub fn wrong_state(operation: &'static str, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WrongState {
            operation,
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<QueueDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::InvalidUrl { .. }
            | Self::UnsupportedScheme { .. }
            | Self::DuplicateUrl(_)
            | Self::NotFound(_)
            | Self::WrongState { .. } => None,
        }
    }

    /// Returns true when this error is a database busy/locked condition.
    #[must_use]
    pub fn is_busy_or_locked(&self) -> bool {
        self.database_kind() == Some(QueueDbErrorKind::BusyOrLocked)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_database_message() {
        let err = QueueError::Database {
            kind: QueueDbErrorKind::Other,
            message: "connection failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("database error"));
        assert!(msg.contains("other"));
        assert!(msg.contains("connection failed"));
    }

    #[test]
    fn test_queue_error_database_busy_flag() {
        let err = QueueError::Database {
            kind: QueueDbErrorKind::BusyOrLocked,
            message: "database is locked".to_string(),
        };
        assert_eq!(err.database_kind(), Some(QueueDbErrorKind::BusyOrLocked));
        assert!(err.is_busy_or_locked());
    }

    #[test]
    fn test_queue_error_not_found_message() {
        let err = QueueError::NotFound("https://example.com/f".to_string());
        let msg = err.to_string();
        assert!(msg.contains("no download tracked"));
        assert!(msg.contains("https://example.com/f"));
    }

    #[test]
    fn test_queue_error_wrong_state_message() {
        let err = QueueError::wrong_state("pause", "https://example.com/f", "not downloading");
        let msg = err.to_string();
        assert!(msg.contains("cannot pause"));
        assert!(msg.contains("not downloading"));
    }

    #[test]
    fn test_queue_error_clone() {
        let err = QueueError::DuplicateUrl("https://example.com/f".to_string());
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
