//! Fixed-delay retry policy for transient download failures.
//!
//! Unlike exponential backoff, a [`Descriptor`](crate::download::Descriptor)
//! retries at the same fixed `retry_delay` every time, up to `max_retries`
//! attempts. This matches the error-handling table: transient network
//! errors pause the descriptor rather than retry immediately, HTTP
//! non-success and mid-stream I/O errors retry after the fixed delay, and
//! request-construction errors (invalid URL) never retry.
//!
//! # Example
//!
//! ```
//! use fetchqueue_core::download::{DownloadError, RetryPolicy, RetryDecision};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(5));
//! let error = DownloadError::http_status("https://example.com/file.pdf", 503);
//!
//! match policy.should_retry(&error, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::DownloadError;

/// Default maximum retry attempts (spec default for `max_retries`).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default fixed delay between retries (spec default for `retry_delay`).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Decision on whether to retry a failed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the download after the fixed delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry the download.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Fixed-delay retry policy: every retry waits the same `retry_delay`,
/// up to `max_attempts` total attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with the given max attempts and fixed delay.
    #[must_use]
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Creates a policy with a custom `max_attempts`, keeping the default delay.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// The maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The fixed delay applied before every retry.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Determines whether to retry after `error`, given the attempt number
    /// that just failed (1-indexed).
    #[instrument(skip(self, error), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, error: &DownloadError, attempt: u32) -> RetryDecision {
        if !error.is_retriable() {
            return RetryDecision::DoNotRetry {
                reason: "non-retriable error".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = self.retry_delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay: self.retry_delay,
            attempt: attempt + 1,
        }
    }
}
