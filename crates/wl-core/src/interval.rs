//! Interval arithmetic between work sessions and query windows.
//!
//! Every seconds figure the engine reports comes from [`elapsed_seconds`] or
//! [`split_elapsed`], which agree exactly: the per-bucket figures returned by
//! [`split_elapsed`] always sum to [`elapsed_seconds`] for the same window.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ValidationError;

/// A half-open time window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    /// Creates a window, rejecting an end before the start.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, ValidationError> {
        if to < from {
            return Err(ValidationError::InvertedWindow {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            });
        }
        Ok(Self { from, to })
    }

    /// A window from the Unix epoch up to `to`.
    pub const fn until(to: DateTime<Utc>) -> Self {
        Self {
            from: DateTime::<Utc>::UNIX_EPOCH,
            to,
        }
    }

    /// Returns true if `instant` falls inside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }
}

/// Returns the part of a session that lies inside `window`, or `None` if the
/// overlap is empty.
///
/// An open session (`end == None`) runs until `now`.
pub fn clip(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    window: &Window,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let effective_start = start.max(window.from);
    let effective_end = end.unwrap_or(now).min(window.to);
    (effective_end > effective_start).then_some((effective_start, effective_end))
}

/// Whole seconds a session contributes to `window`. Never negative.
pub fn elapsed_seconds(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    window: &Window,
    now: DateTime<Utc>,
) -> i64 {
    clip(start, end, window, now).map_or(0, |(s, e)| whole_seconds(s, e))
}

/// Apportions a session's contribution to `window` across consecutive buckets.
///
/// Bucket `i` spans `[bucket_starts[i], bucket_starts[i + 1])`; the last bucket
/// ends at `window.to`. `bucket_starts` must be ascending and start at or
/// before `window.from`. Each piece is measured from the clipped session start
/// and floored cumulatively, so the pieces sum to [`elapsed_seconds`] exactly.
pub fn split_elapsed(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    window: &Window,
    now: DateTime<Utc>,
    bucket_starts: &[DateTime<Utc>],
) -> Vec<i64> {
    let mut pieces = vec![0; bucket_starts.len()];
    let Some((s, e)) = clip(start, end, window, now) else {
        return pieces;
    };

    for (i, bucket_start) in bucket_starts.iter().enumerate() {
        let bucket_end = bucket_starts.get(i + 1).copied().unwrap_or(window.to);
        let a = (*bucket_start).clamp(s, e);
        let b = bucket_end.clamp(s, e);
        if b > a {
            pieces[i] = whole_seconds(s, b) - whole_seconds(s, a);
        }
    }
    pieces
}

fn whole_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().max(0)
}
