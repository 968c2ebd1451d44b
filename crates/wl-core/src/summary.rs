//! Time aggregation: per-task totals and range summaries.
//!
//! # Reconciliation
//!
//! For any summary, `total_seconds` equals the sum of `by_task[].total_seconds`
//! and the sum of `days[].seconds`. All three are built from the same
//! per-session figures out of [`crate::interval`], so the equality is exact.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::calendar::{DayZone, SummaryRange};
use crate::clock::Clock;
use crate::error::Result;
use crate::interval::{Window, elapsed_seconds, split_elapsed};
use crate::store::Store;
use crate::tracker::Tracker;
use crate::types::{OwnerId, TaskFilter, TaskId, WorkSession};

/// Title reported for sessions whose task has been deleted.
pub const DELETED_TASK_TITLE: &str = "(deleted task)";

/// Time spent on one task within a summary window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTotal {
    pub id: TaskId,
    pub title: String,
    pub total_seconds: i64,
    pub session_count: u32,
    /// Latest `end_at`, or `start_at` for an open session, across the task's
    /// sessions in the window.
    pub last_worked_at: DateTime<Utc>,
}

/// Time spent on one calendar day within a summary window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayTotal {
    pub date: NaiveDate,
    pub seconds: i64,
}

/// Aggregated work over a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_seconds: i64,
    /// Longest first; ties by task ID.
    pub by_task: Vec<TaskTotal>,
    pub completed_count: u64,
    /// One entry per calendar day touched by the window, zeros included.
    pub days: Vec<DayTotal>,
}

/// A summary labelled with the range that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeSummary {
    pub range: &'static str,
    #[serde(flatten)]
    pub summary: Summary,
}

#[derive(Debug)]
struct TaskBucket {
    total_seconds: i64,
    session_count: u32,
    last_worked_at: DateTime<Utc>,
}

/// Builds a summary from the sessions overlapping `window`.
///
/// `titles` maps task IDs to titles; sessions of tasks missing from it are
/// reported under [`DELETED_TASK_TITLE`].
pub fn build_summary(
    window: &Window,
    now: DateTime<Utc>,
    zone: DayZone,
    sessions: &[WorkSession],
    titles: &HashMap<TaskId, String>,
    completed_count: u64,
) -> Summary {
    let days = zone.days_in(window);
    let day_starts: Vec<DateTime<Utc>> = days.iter().map(|(_, start)| *start).collect();
    let mut day_seconds = vec![0_i64; days.len()];
    let mut buckets: HashMap<&TaskId, TaskBucket> = HashMap::new();
    let mut total_seconds = 0;

    for session in sessions {
        let seconds = elapsed_seconds(session.start_at, session.end_at, window, now);
        total_seconds += seconds;

        let bucket = buckets.entry(&session.task_id).or_insert(TaskBucket {
            total_seconds: 0,
            session_count: 0,
            last_worked_at: session.last_seen_at(),
        });
        bucket.total_seconds += seconds;
        bucket.session_count += 1;
        bucket.last_worked_at = bucket.last_worked_at.max(session.last_seen_at());

        let pieces = split_elapsed(session.start_at, session.end_at, window, now, &day_starts);
        for (slot, piece) in day_seconds.iter_mut().zip(pieces) {
            *slot += piece;
        }
    }

    let mut by_task: Vec<TaskTotal> = buckets
        .into_iter()
        .map(|(id, bucket)| TaskTotal {
            id: id.clone(),
            title: titles
                .get(id)
                .cloned()
                .unwrap_or_else(|| DELETED_TASK_TITLE.to_string()),
            total_seconds: bucket.total_seconds,
            session_count: bucket.session_count,
            last_worked_at: bucket.last_worked_at,
        })
        .collect();
    by_task.sort_by(|a, b| {
        b.total_seconds
            .cmp(&a.total_seconds)
            .then_with(|| a.id.cmp(&b.id))
    });

    Summary {
        from: window.from,
        to: window.to,
        total_seconds,
        by_task,
        completed_count,
        days: days
            .into_iter()
            .zip(day_seconds)
            .map(|((date, _), seconds)| DayTotal { date, seconds })
            .collect(),
    }
}

impl<S: Store, C: Clock> Tracker<S, C> {
    /// Total whole seconds ever tracked on a task, counting an open session
    /// up to now.
    pub fn task_total_seconds(&self, owner: &OwnerId, task_id: &TaskId) -> Result<i64> {
        let now = self.clock.now();
        let lifetime = Window::until(now);
        let sessions = self.store.task_sessions(owner, task_id)?;
        Ok(sessions
            .iter()
            .map(|s| elapsed_seconds(s.start_at, s.end_at, &lifetime, now))
            .sum())
    }

    /// Summarises the owner's work inside `window`.
    pub fn summary(&self, owner: &OwnerId, window: Window) -> Result<Summary> {
        let now = self.clock.now();
        self.summary_at(owner, &window, now)
    }

    /// Summarises a named or custom range, resolved against the configured
    /// day zone.
    pub fn summary_for_range(&self, owner: &OwnerId, range: SummaryRange) -> Result<RangeSummary> {
        let now = self.clock.now();
        let window = range.window(self.day_zone, now);
        Ok(RangeSummary {
            range: range.name(),
            summary: self.summary_at(owner, &window, now)?,
        })
    }

    fn summary_at(&self, owner: &OwnerId, window: &Window, now: DateTime<Utc>) -> Result<Summary> {
        let sessions = self.store.sessions_in_window(owner, window)?;
        let titles: HashMap<TaskId, String> = self
            .store
            .list_tasks(owner, &TaskFilter::default())?
            .into_iter()
            .map(|task| (task.id, task.title))
            .collect();
        let completed_count = self.store.count_completed(owner, window)?;
        tracing::debug!(
            owner = %owner,
            sessions = sessions.len(),
            from = %window.from,
            to = %window.to,
            "building summary"
        );
        Ok(build_summary(
            window,
            now,
            self.day_zone,
            &sessions,
            &titles,
            completed_count,
        ))
    }
}
