//! Single-transfer download worker: HTTP negotiation, bandwidth shaping,
//! retry policy, and the descriptor state machine driving it.
//!
//! - [`HttpClient`] — HEAD/GET negotiation (`client.rs`).
//! - [`RateLimiter`] — per-download token-bucket bandwidth shaping
//!   (`rate_limiter.rs`).
//! - [`RetryPolicy`] — fixed-delay retry classification (`retry.rs`).
//! - [`Descriptor`] — the worker itself: identity, progress, status, and
//!   the control channels `pause`/`resume`/`cancel` signal through
//!   (`descriptor.rs`).

mod client;
mod constants;
mod descriptor;
mod error;
mod filename;
pub mod rate_limiter;
mod retry;

pub use client::{HttpClient, ProbeResult};
pub use constants::{DEFAULT_QUEUE_NAME, MAX_QUEUE_NAME_LEN};
pub use descriptor::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, Descriptor, DescriptorConfig, DescriptorSnapshot,
    DownloadStatus,
};
pub use error::{DownloadError, InvalidTransition};
pub use filename::{filename_from_target_path, normalize_queue_name, resolve_unique_path};
pub use rate_limiter::{RateLimiter, ThrottledReader};
pub use retry::{RetryDecision, RetryPolicy};
