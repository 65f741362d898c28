//! Fetchqueue Core Library
//!
//! A multi-queue HTTP download engine with bandwidth shaping and
//! time-windowed scheduling.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`download`] - Download descriptor state machine, HTTP negotiation,
//!   rate limiting and retry policy
//! - [`queue`] - Named queues, admission control and persistence
//! - [`network`] - Connectivity monitoring

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod db;
pub mod download;
pub mod network;
pub mod queue;

mod user_agent;

// Re-export commonly used types
pub use db::Database;
pub use download::{
    DEFAULT_MAX_RETRIES, Descriptor, DescriptorConfig, DescriptorSnapshot, DownloadError,
    DownloadStatus, HttpClient, RateLimiter, RetryPolicy, resolve_unique_path,
};
pub use network::NetworkMonitor;
pub use queue::{QueueConfig, QueueError, QueueManager, parse_hhmm};
