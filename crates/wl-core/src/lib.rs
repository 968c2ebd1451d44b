//! Core domain logic for worklog.
//!
//! This crate contains the session-based time accounting engine:
//! - Interval arithmetic: seconds a session contributes to a window
//! - Session ledger: at most one open work session per owner
//! - Task store: owner-scoped task CRUD and completion
//! - Time aggregation: per-task totals and range summaries with day buckets
//!
//! Storage is abstracted behind [`Store`]; the `wl-db` and `wl-remote`
//! crates provide the two backends.

mod calendar;
mod clock;
mod error;
pub mod interval;
mod ledger;
mod store;
pub mod summary;
mod tasks;
mod tracker;
pub mod types;

pub use calendar::{DayZone, SummaryRange, WeekStart};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result, StoreError};
pub use interval::Window;
pub use store::Store;
pub use summary::{DELETED_TASK_TITLE, DayTotal, RangeSummary, Summary, TaskTotal};
pub use tracker::Tracker;
pub use types::{
    NewTask, OwnerId, SessionId, Task, TaskFilter, TaskId, TaskPatch, TaskPriority, TaskStatus,
    TaskWithMeta, ValidationError, WorkSession, task_list_order,
};
