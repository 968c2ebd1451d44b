//! Core type definitions with validation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Invalid task status value.
    #[error("invalid task status: {value}")]
    InvalidStatus { value: String },

    /// Invalid task priority value.
    #[error("invalid task priority: {value}")]
    InvalidPriority { value: String },

    /// A query window whose end precedes its start.
    #[error("window end {to} is before start {from}")]
    InvertedWindow { from: String, to: String },

    /// Unknown summary range name.
    #[error("invalid summary range: {value}")]
    InvalidRange { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// The identity every task and session is scoped to.
    OwnerId, "owner ID"
);

define_string_id!(
    /// A validated task identifier (UUID for tasks created here).
    TaskId, "task ID"
);

define_string_id!(
    /// A validated work session identifier.
    SessionId, "session ID"
);

impl TaskId {
    /// Generates a fresh random task ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl SessionId {
    /// Generates a fresh random session ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Canceled,
}

impl TaskStatus {
    pub const ALL: [Self; 4] = [Self::Todo, Self::InProgress, Self::Done, Self::Canceled];

    /// String representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Canceled => "canceled",
        }
    }

    /// Position in task listings.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Todo => 0,
            Self::InProgress => 1,
            Self::Done => 2,
            Self::Canceled => 3,
        }
    }

    /// Parses a status, falling back to the default for unknown values.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "canceled" => Ok(Self::Canceled),
            _ => Err(ValidationError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }
}

/// How urgent a task is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl TaskPriority {
    /// String representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Parses a priority, falling back to the default for unknown values.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(ValidationError::InvalidPriority {
                value: s.to_string(),
            }),
        }
    }
}

/// A unit of work owned by a single owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(skip)]
    pub owner: OwnerId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A contiguous stretch of work on one task.
///
/// A session without `end_at` is open. At most one open session exists per
/// owner; see [`crate::Tracker::start_work`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSession {
    pub id: SessionId,
    pub task_id: TaskId,
    pub owner: OwnerId,
    pub start_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
}

impl WorkSession {
    /// Returns true while the session has not been stopped.
    pub const fn is_open(&self) -> bool {
        self.end_at.is_none()
    }

    /// The most recent instant this session is known to cover.
    pub fn last_seen_at(&self) -> DateTime<Utc> {
        self.end_at.unwrap_or(self.start_at)
    }

    /// Rebuilds a session from stored RFC 3339 text.
    ///
    /// Corrupt timestamps never fail a read. An unreadable `start_at` leaves
    /// nothing to measure from, so the row is dropped (`None`). An unreadable
    /// `end_at` closes the session at its start: it still counts as a session
    /// but contributes zero seconds.
    pub fn from_stored(
        id: SessionId,
        task_id: TaskId,
        owner: OwnerId,
        start_at: &str,
        end_at: Option<&str>,
    ) -> Option<Self> {
        let Some(start) = parse_stored_timestamp(start_at) else {
            tracing::warn!(session = %id, value = start_at, "skipping session with unreadable start");
            return None;
        };
        let end = end_at.map(|value| {
            parse_stored_timestamp(value).unwrap_or_else(|| {
                tracing::warn!(session = %id, value, "treating unreadable session end as zero length");
                start
            })
        });
        Some(Self {
            id,
            task_id,
            owner,
            start_at: start,
            end_at: end,
        })
    }
}

fn parse_stored_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub note: Option<String>,
    /// Free-form priority; unknown values become [`TaskPriority::Normal`].
    pub priority: Option<String>,
    pub due: Option<DateTime<Utc>>,
}

/// Partial update for a task. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// A blank title keeps the current one.
    pub title: Option<String>,
    pub note: Option<String>,
    /// Unknown values are ignored.
    pub status: Option<String>,
    /// Unknown values are ignored.
    pub priority: Option<String>,
    /// `Some(None)` clears the due date.
    pub due: Option<Option<DateTime<Utc>>>,
}

/// Filters for task listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    /// Case-insensitive substring of title or note.
    pub query: Option<String>,
}

impl TaskFilter {
    /// Returns true if the task passes this filter.
    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|status| status != task.status) {
            return false;
        }
        match self.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => {
                let needle = query.to_lowercase();
                task.title.to_lowercase().contains(&needle)
                    || task
                        .note
                        .as_deref()
                        .is_some_and(|note| note.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

/// A task decorated with live session state for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithMeta {
    #[serde(flatten)]
    pub task: Task,
    pub is_active: bool,
    pub total_seconds: i64,
}

/// Listing order shared by every backend: status rank, due date ascending with
/// undated tasks last, most recently updated first, then ID.
pub fn task_list_order(a: &Task, b: &Task) -> std::cmp::Ordering {
    a.status
        .rank()
        .cmp(&b.status.rank())
        .then_with(|| match (a.due, b.due) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn task(id: &str, status: TaskStatus, due: Option<DateTime<Utc>>, updated_hour: u32) -> Task {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Task {
            id: TaskId::new(id).unwrap(),
            owner: OwnerId::new("alice").unwrap(),
            title: format!("task {id}"),
            note: None,
            status,
            priority: TaskPriority::Normal,
            due,
            created_at: created,
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, updated_hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn id_rejects_blank() {
        assert_eq!(
            TaskId::new("  "),
            Err(ValidationError::Empty { field: "task ID" })
        );
        assert!(OwnerId::new("alice").is_ok());
    }

    #[test]
    fn status_parses_known_values() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("paused".parse::<TaskStatus>().is_err());
        assert_eq!(TaskStatus::parse_or_default("paused"), TaskStatus::Todo);
    }

    #[test]
    fn priority_falls_back_to_normal() {
        assert_eq!(TaskPriority::parse_or_default("urgent"), TaskPriority::Urgent);
        assert_eq!(TaskPriority::parse_or_default("URGENT"), TaskPriority::Normal);
        assert_eq!(TaskPriority::parse_or_default(""), TaskPriority::Normal);
    }

    fn stored(start: &str, end: Option<&str>) -> Option<WorkSession> {
        WorkSession::from_stored(
            SessionId::new("s1").unwrap(),
            TaskId::new("t1").unwrap(),
            OwnerId::new("alice").unwrap(),
            start,
            end,
        )
    }

    #[test]
    fn stored_session_parses_offsets() {
        let session = stored("2025-03-10T11:00:00+02:00", Some("2025-03-10T09:30:00.000Z")).unwrap();
        assert_eq!(
            session.start_at,
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
        );
        assert_eq!(
            session.end_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap())
        );
        assert!(stored("2025-03-10T09:00:00Z", None).unwrap().is_open());
    }

    #[test]
    fn stored_session_with_corrupt_start_is_dropped() {
        assert!(stored("2025-03-10 09:00", Some("2025-03-10T09:30:00Z")).is_none());
        assert!(stored("", None).is_none());
    }

    #[test]
    fn stored_session_with_corrupt_end_has_zero_length() {
        let session = stored("2025-03-10T09:00:00Z", Some("garbage")).unwrap();
        assert!(!session.is_open());
        assert_eq!(session.end_at, Some(session.start_at));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn filter_matches_query_case_insensitively() {
        let mut t = task("a", TaskStatus::Todo, None, 1);
        t.title = "Write Report".to_string();
        t.note = Some("quarterly numbers".to_string());

        let by_title = TaskFilter {
            status: None,
            query: Some("report".to_string()),
        };
        let by_note = TaskFilter {
            status: None,
            query: Some("NUMBERS".to_string()),
        };
        let wrong_status = TaskFilter {
            status: Some(TaskStatus::Done),
            query: None,
        };
        assert!(by_title.matches(&t));
        assert!(by_note.matches(&t));
        assert!(!wrong_status.matches(&t));
        assert!(TaskFilter::default().matches(&t));
    }

    #[test]
    fn list_order_ranks_status_then_due_then_recency() {
        let due = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let mut tasks = vec![
            task("done", TaskStatus::Done, None, 9),
            task("todo-undated-old", TaskStatus::Todo, None, 1),
            task("todo-undated-new", TaskStatus::Todo, None, 5),
            task("todo-dated", TaskStatus::Todo, Some(due), 1),
            task("active", TaskStatus::InProgress, None, 1),
            task("canceled", TaskStatus::Canceled, Some(due), 1),
        ];
        tasks.sort_by(task_list_order);
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "todo-dated",
                "todo-undated-new",
                "todo-undated-old",
                "active",
                "done",
                "canceled",
            ]
        );
    }
}
