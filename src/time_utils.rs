// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for clocks and date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" for future-timestamp checks and ack stamping.
pub trait Clock: Send + Sync {
    /// Current time in unix seconds.
    fn now_secs(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock pinned to a settable instant, for tests and replays.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now_secs: i64) -> Self {
        Self(AtomicI64::new(now_secs))
    }

    pub fn set(&self, now_secs: i64) {
        self.0.store(now_secs, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now_secs(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format unix seconds with a `strftime` pattern (UTC). Out-of-range values
/// fall back to the raw number.
pub fn format_epoch(timestamp: i64, pattern: &str) -> String {
    match DateTime::<Utc>::from_timestamp(timestamp, 0) {
        Some(date) => date.format(pattern).to_string(),
        None => timestamp.to_string(),
    }
}

/// Format unix seconds as RFC3339 for log output.
pub fn epoch_rfc3339(timestamp: i64) -> String {
    match DateTime::<Utc>::from_timestamp(timestamp, 0) {
        Some(date) => format_utc_rfc3339(date),
        None => timestamp.to_string(),
    }
}
