//! Retry scheduling and dead-letter decisions for failed jobs.
//!
//! The attempt counter is incremented when a job is claimed, so by the time
//! a failure reaches [`on_failure`] it already counts the attempt that just
//! failed.
//!
//! | Attempts consumed | Delay before next claim |
//! |-------------------|-------------------------|
//! | 1                 | 2 s                     |
//! | 2                 | 4 s                     |
//! | 3                 | 8 s                     |
//!
//! Delays are capped at [`MAX_BACKOFF_SECS`].

use chrono::{DateTime, Duration, Utc};

pub const MAX_BACKOFF_SECS: i64 = 3_600;

/// How a job failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network errors, thin content, scorer outages. Retried with backoff.
    Transient,
    /// Domain admission was refused. Retried with backoff like a transient
    /// error, but reported separately.
    RateLimited,
    /// The resource will not change on retry (404, 410, 403). Dead-lettered
    /// immediately.
    Permanent,
}

/// What the job store should do with a job after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTransition {
    Retry {
        scheduled_at: DateTime<Utc>,
        delay_secs: i64,
    },
    DeadLetter,
}

/// Seconds to wait after the `attempts`-th failed attempt: `2^attempts`.
#[must_use]
pub fn backoff_delay_secs(attempts: i32) -> i64 {
    #[allow(clippy::cast_sign_loss)]
    let exponent = attempts.clamp(0, 62) as u32;
    (1_i64 << exponent).min(MAX_BACKOFF_SECS)
}

/// Decide between rescheduling and dead-lettering a failed job.
#[must_use]
pub fn on_failure(
    attempts: i32,
    max_attempts: i32,
    kind: FailureKind,
    now: DateTime<Utc>,
) -> FailureTransition {
    if kind == FailureKind::Permanent || attempts >= max_attempts {
        return FailureTransition::DeadLetter;
    }

    let delay_secs = backoff_delay_secs(attempts);
    FailureTransition::Retry {
        scheduled_at: now + Duration::seconds(delay_secs),
        delay_secs,
    }
}
