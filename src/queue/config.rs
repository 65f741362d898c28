//! Queue configuration: name, concurrency ceiling, and daily time window.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Default concurrency ceiling for a newly created queue.
pub const DEFAULT_MAX_CONCURRENT: u32 = 2;

/// Named grouping of downloads with an independent concurrency ceiling
/// and a daily wall-clock window during which admission is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name; `"default"` is always present.
    pub name: String,
    /// Whether the queue is eligible for admission at all.
    pub enabled: bool,
    /// Maximum number of concurrently `downloading` descriptors.
    pub max_concurrent: u32,
    /// Window start, `HH:MM`.
    pub start_time: NaiveTime,
    /// Window end, `HH:MM`.
    pub end_time: NaiveTime,
}

impl QueueConfig {
    /// Creates a queue open around the clock with the given concurrency.
    #[must_use]
    pub fn new(name: impl Into<String>, max_concurrent: u32) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            max_concurrent: max_concurrent.max(1),
            start_time: midnight(),
            end_time: end_of_day(),
        }
    }

    /// The always-present fallback queue: enabled, open all day.
    #[must_use]
    pub fn default_queue() -> Self {
        Self::new("default", DEFAULT_MAX_CONCURRENT)
    }

    /// Whether `now`'s time-of-day lies within `[start_time, end_time]`.
    ///
    /// When `start_time <= end_time` the window is the ordinary same-day
    /// interval. When `start_time > end_time` the window straddles
    /// midnight and is the union of `[start_time, 24:00)` and
    /// `[00:00, end_time]` (spec.md §3, §9).
    #[must_use]
    pub fn is_time_allowed(&self, now: NaiveTime) -> bool {
        if self.start_time <= self.end_time {
            now >= self.start_time && now <= self.end_time
        } else {
            now >= self.start_time || now <= self.end_time
        }
    }
}

fn midnight() -> NaiveTime {
    #[allow(clippy::unwrap_used)]
    NaiveTime::from_hms_opt(0, 0, 0).unwrap()
}

fn end_of_day() -> NaiveTime {
    #[allow(clippy::unwrap_used)]
    NaiveTime::from_hms_opt(23, 59, 59).unwrap()
}

/// Parses a `"HH:MM"` string into a `NaiveTime`, defaulting to midnight on
/// a malformed input rather than failing the whole config load.
#[must_use]
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(h, m, 0)
}

/// Formats a `NaiveTime` back to `"HH:MM"`.
#[must_use]
pub fn format_hhmm(t: NaiveTime) -> String {
    format!("{:02}:{:02}", t.hour(), t.minute())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_same_day_window_allows_inside() {
        let q = QueueConfig {
            start_time: parse_hhmm("09:00").unwrap(),
            end_time: parse_hhmm("17:00").unwrap(),
            ..QueueConfig::new("work", 1)
        };
        assert!(q.is_time_allowed(parse_hhmm("12:00").unwrap()));
        assert!(!q.is_time_allowed(parse_hhmm("18:00").unwrap()));
    }

    #[test]
    fn test_same_day_window_includes_boundaries() {
        let q = QueueConfig {
            start_time: parse_hhmm("09:00").unwrap(),
            end_time: parse_hhmm("17:00").unwrap(),
            ..QueueConfig::new("work", 1)
        };
        assert!(q.is_time_allowed(parse_hhmm("09:00").unwrap()));
        assert!(q.is_time_allowed(parse_hhmm("17:00").unwrap()));
    }

    #[test]
    fn test_midnight_wrapping_window() {
        let q = QueueConfig {
            start_time: parse_hhmm("22:00").unwrap(),
            end_time: parse_hhmm("02:00").unwrap(),
            ..QueueConfig::new("nightly", 1)
        };
        assert!(q.is_time_allowed(parse_hhmm("23:30").unwrap()));
        assert!(q.is_time_allowed(parse_hhmm("01:30").unwrap()));
        assert!(!q.is_time_allowed(parse_hhmm("02:30").unwrap()));
        assert!(!q.is_time_allowed(parse_hhmm("12:00").unwrap()));
    }

    #[test]
    fn test_parse_hhmm_roundtrip() {
        let t = parse_hhmm("06:05").unwrap();
        assert_eq!(format_hhmm(t), "06:05");
    }

    #[test]
    fn test_parse_hhmm_rejects_garbage() {
        assert!(parse_hhmm("not-a-time").is_none());
        assert!(parse_hhmm("25:99").is_none());
    }

    #[test]
    fn test_default_queue_is_open_all_day() {
        let q = QueueConfig::default_queue();
        assert!(q.enabled);
        assert_eq!(q.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert!(q.is_time_allowed(parse_hhmm("03:00").unwrap()));
    }
}
