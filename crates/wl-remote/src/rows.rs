//! Wire rows exchanged with the remote tables.
//!
//! Column names are camelCase on the server (`userId`, `startAt`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wl_core::{
    OwnerId, SessionId, Task, TaskId, TaskPriority, TaskStatus, ValidationError, WorkSession,
};

use crate::RemoteError;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub note: Option<String>,
    pub status: String,
    pub priority: String,
    pub due: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            user_id: task.owner.to_string(),
            title: task.title.clone(),
            note: task.note.clone(),
            status: task.status.as_str().to_string(),
            priority: task.priority.as_str().to_string(),
            due: task.due,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = RemoteError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TaskId::new(row.id).map_err(|e| invalid_row("tasks", &e))?,
            owner: OwnerId::new(row.user_id).map_err(|e| invalid_row("tasks", &e))?,
            title: row.title,
            note: row.note,
            status: TaskStatus::parse_or_default(&row.status),
            priority: TaskPriority::parse_or_default(&row.priority),
            due: row.due,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Body of a task PATCH: every mutable column, `due` included as `null`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskChanges<'a> {
    pub title: &'a str,
    pub note: Option<&'a str>,
    pub status: &'static str,
    pub priority: &'static str,
    pub due: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a Task> for TaskChanges<'a> {
    fn from(task: &'a Task) -> Self {
        Self {
            title: &task.title,
            note: task.note.as_deref(),
            status: task.status.as_str(),
            priority: task.priority.as_str(),
            due: task.due,
            updated_at: task.updated_at,
        }
    }
}

/// Session timestamps stay as text until `into_session` so one unreadable
/// value drops or shortens that row instead of failing the whole response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionRow {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    #[serde(default)]
    pub start_at: Option<String>,
    pub end_at: Option<String>,
}

impl From<&WorkSession> for SessionRow {
    fn from(session: &WorkSession) -> Self {
        Self {
            id: session.id.to_string(),
            task_id: session.task_id.to_string(),
            user_id: session.owner.to_string(),
            start_at: Some(crate::format_timestamp(session.start_at)),
            end_at: session.end_at.map(crate::format_timestamp),
        }
    }
}

impl SessionRow {
    /// Converts a fetched row. `None` means the start was unreadable and the
    /// row is skipped; an unreadable end yields a zero-length session.
    pub fn into_session(self) -> Result<Option<WorkSession>, RemoteError> {
        let id = SessionId::new(self.id).map_err(|e| invalid_row("work_sessions", &e))?;
        let task_id = TaskId::new(self.task_id).map_err(|e| invalid_row("work_sessions", &e))?;
        let owner = OwnerId::new(self.user_id).map_err(|e| invalid_row("work_sessions", &e))?;
        Ok(WorkSession::from_stored(
            id,
            task_id,
            owner,
            self.start_at.as_deref().unwrap_or_default(),
            self.end_at.as_deref(),
        ))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionEnd {
    pub end_at: DateTime<Utc>,
}

fn invalid_row(table: &'static str, err: &ValidationError) -> RemoteError {
    RemoteError::InvalidRow {
        table,
        message: err.to_string(),
    }
}
