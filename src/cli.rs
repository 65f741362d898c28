//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use fetchqueue_core::{DEFAULT_MAX_RETRIES, queue::DEFAULT_MAX_CONCURRENT};

/// Multi-queue HTTP download engine with bandwidth shaping and
/// time-windowed scheduling.
///
/// Add one or more URLs to be queued and downloaded. A named queue's
/// concurrency ceiling and time window are enforced by the admission
/// loop running alongside the transfers themselves.
#[derive(Parser, Debug)]
#[command(name = "fetchqueue")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to enqueue (absolute http/https URIs). Read from stdin
    /// (one per line) if omitted and stdin is not a terminal.
    pub urls: Vec<String>,

    /// Path to the SQLite database backing descriptor/queue persistence.
    #[arg(long, default_value = "fetchqueue.db")]
    pub db: PathBuf,

    /// Directory downloaded files are written into.
    #[arg(short = 'o', long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Queue newly added URLs are admitted under.
    #[arg(short = 'Q', long, default_value = "default")]
    pub queue: String,

    /// Concurrency ceiling to set on `--queue` before adding URLs (only
    /// takes effect if provided; an existing queue's ceiling is otherwise
    /// left untouched).
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Daily time window start (`HH:MM`) to set on `--queue`.
    #[arg(long, requires = "window_end")]
    pub window_start: Option<String>,

    /// Daily time window end (`HH:MM`) to set on `--queue`.
    #[arg(long, requires = "window_start")]
    pub window_end: Option<String>,

    /// Per-download bandwidth cap in KB/s (0 = unlimited).
    #[arg(short = 'b', long, default_value_t = 0)]
    pub max_bandwidth_kbps: u64,

    /// Maximum retry attempts for transient failures (0-10).
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: u32,

    /// Fixed delay between retries, in seconds.
    #[arg(long, default_value_t = 5)]
    pub retry_delay_secs: u64,

    /// Exit immediately after enqueueing instead of waiting for the
    /// added downloads to reach a terminal status.
    #[arg(long)]
    pub no_wait: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["fetchqueue"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.queue, "default");
        assert_eq!(args.concurrency, None);
        assert_eq!(args.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(args.max_bandwidth_kbps, 0);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["fetchqueue", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["fetchqueue", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["fetchqueue", "--verbose", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["fetchqueue", "-q"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["fetchqueue", "--help"]);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let result = Args::try_parse_from(["fetchqueue", "--version"]);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let result = Args::try_parse_from(["fetchqueue", "--invalid-flag"]);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_urls_are_positional() {
        let args = Args::try_parse_from([
            "fetchqueue",
            "https://example.com/a.bin",
            "https://example.com/b.bin",
        ])
        .unwrap();
        assert_eq!(args.urls, vec!["https://example.com/a.bin", "https://example.com/b.bin"]);
    }

    #[test]
    fn test_cli_max_retries_over_max_rejected() {
        let result = Args::try_parse_from(["fetchqueue", "-r", "11"]);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_window_start_requires_window_end() {
        let result = Args::try_parse_from(["fetchqueue", "--window-start", "22:00"]);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_window_start_and_end_together() {
        let args = Args::try_parse_from([
            "fetchqueue",
            "--window-start",
            "22:00",
            "--window-end",
            "02:00",
        ])
        .unwrap();
        assert_eq!(args.window_start.as_deref(), Some("22:00"));
        assert_eq!(args.window_end.as_deref(), Some("02:00"));
    }

    #[test]
    fn test_cli_concurrency_flag() {
        let args = Args::try_parse_from(["fetchqueue", "--concurrency", "5"]).unwrap();
        assert_eq!(args.concurrency, Some(5));
    }

    #[test]
    fn test_cli_default_concurrency_constant_matches_queue_default() {
        // Sanity check that the CLI and core agree on what "no override"
        // falls back to when a new queue is created implicitly.
        assert_eq!(DEFAULT_MAX_CONCURRENT, 2);
    }
}
