//! Per-domain sliding-window admission.
//!
//! A domain admits at most `floor(window / crawl_delay) * max_concurrent`
//! requests per window. The counter restarts once the window start is at
//! least one window length in the past.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const DEFAULT_WINDOW_MS: i64 = 60_000;
pub const DEFAULT_CRAWL_DELAY_MS: i32 = 1_000;
pub const DEFAULT_MAX_CONCURRENT: i32 = 1;

/// Requests a domain may take within one window.
///
/// `crawl_delay_ms` is clamped to at least 1 ms and `max_concurrent` to at
/// least 0, so a misconfigured row can close a domain but never divide by
/// zero.
#[must_use]
pub fn window_cap(window_ms: i64, crawl_delay_ms: i32, max_concurrent: i32) -> i64 {
    let delay = i64::from(crawl_delay_ms.max(1));
    (window_ms / delay) * i64::from(max_concurrent.max(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// The domain's `allowed` flag is off.
    Blocked,
    /// The window already holds `cap` requests.
    WindowFull { cap: i64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Blocked => write!(f, "domain is blocked"),
            RejectReason::WindowFull { cap } => {
                write!(f, "window full ({cap} requests per window)")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Admission {
    Admitted { requests_in_window: i64 },
    Rejected(RejectReason),
}

impl Admission {
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// The admission-relevant slice of a domain row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainWindow {
    pub allowed: bool,
    pub crawl_delay_ms: i32,
    pub max_concurrent: i32,
    pub requests_in_window: i64,
    pub window_start: DateTime<Utc>,
}

impl DomainWindow {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            crawl_delay_ms: DEFAULT_CRAWL_DELAY_MS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            requests_in_window: 0,
            window_start: now,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, window_ms: i64) -> bool {
        now - self.window_start >= Duration::milliseconds(window_ms)
    }

    /// Check and count one request in a single step.
    ///
    /// Rejections leave the window untouched.
    pub fn try_admit(&mut self, now: DateTime<Utc>, window_ms: i64) -> Admission {
        if !self.allowed {
            return Admission::Rejected(RejectReason::Blocked);
        }

        if self.is_expired(now, window_ms) {
            self.window_start = now;
            self.requests_in_window = 1;
            return Admission::Admitted {
                requests_in_window: 1,
            };
        }

        let cap = window_cap(window_ms, self.crawl_delay_ms, self.max_concurrent);
        if self.requests_in_window >= cap {
            return Admission::Rejected(RejectReason::WindowFull { cap });
        }

        self.requests_in_window += 1;
        Admission::Admitted {
            requests_in_window: self.requests_in_window,
        }
    }
}
