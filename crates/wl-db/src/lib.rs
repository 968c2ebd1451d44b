//! Local storage backend for worklog.
//!
//! Provides persistence for tasks and work sessions using `rusqlite`.
//!
//! # Thread Safety
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so [`Database`] keeps its
//! connection behind a `Mutex`. Every [`Store`] call locks it for the duration
//! of one statement or one transaction, which makes a `Database` shareable
//! across threads.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! and a `Z` suffix (e.g., `2024-01-15T10:30:00.000Z`). Because every value has
//! the same shape:
//! - Lexicographic ordering matches chronological ordering
//! - Range predicates can compare the TEXT columns directly
//!
//! A `work_sessions` row with an unreadable timestamp never fails a read; see
//! [`WorkSession::from_stored`]. Task rows report [`DbError::TimestampParse`].
//!
//! ## One Open Session Per Owner
//!
//! `idx_ws_one_open` is a partial unique index on `work_sessions(owner)` for
//! rows with `end_at IS NULL`. Starting work closes the open row and inserts
//! the new one inside a single `BEGIN IMMEDIATE` transaction, so the index is
//! never violated by the ledger itself; it exists to reject any other writer.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use thiserror::Error;
use wl_core::{
    OwnerId, SessionId, Store, StoreError, Task, TaskFilter, TaskId, TaskPriority, TaskStatus,
    Window, WorkSession,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp in {table} row {id}: {value}")]
    TimestampParse {
        table: &'static str,
        id: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row violates a domain rule (e.g., an empty ID).
    #[error("invalid {table} row: {message}")]
    InvalidRow {
        table: &'static str,
        message: String,
    },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::new("sqlite", err)
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::init(conn)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(
            "
            -- Sessions reference tasks by ID only: a deleted task keeps its
            -- sessions, which summaries report under a placeholder title.
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                title TEXT NOT NULL,
                note TEXT,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                due TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_owner_status ON tasks(owner, status);
            CREATE INDEX IF NOT EXISTS idx_tasks_owner_updated ON tasks(owner, updated_at);

            CREATE TABLE IF NOT EXISTS work_sessions (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                owner TEXT NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_ws_task ON work_sessions(task_id);
            CREATE INDEX IF NOT EXISTS idx_ws_owner_start ON work_sessions(owner, start_at);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_ws_one_open
                ON work_sessions(owner) WHERE end_at IS NULL;
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select_tasks(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT id, owner, title, note, status, priority, due, created_at, updated_at
            FROM tasks
            WHERE owner = ?1 AND (?2 IS NULL OR status = ?2)
            ORDER BY
                CASE status WHEN 'todo' THEN 0 WHEN 'in_progress' THEN 1 WHEN 'done' THEN 2 ELSE 3 END,
                due IS NULL, due ASC,
                updated_at DESC,
                id ASC
            ",
        )?;
        let status = filter.status.map(|s| s.as_str());
        let rows = stmt.query_map(params![owner.as_str(), status], TaskRow::from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            let task = row?.into_task()?;
            // Text search runs here rather than in SQL so matching is identical
            // to the remote backend, including non-ASCII case folding.
            if filter.matches(&task) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    fn select_task(&self, owner: &OwnerId, id: &TaskId) -> Result<Option<Task>, DbError> {
        let row = self
            .conn()
            .query_row(
                "
                SELECT id, owner, title, note, status, priority, due, created_at, updated_at
                FROM tasks
                WHERE id = ? AND owner = ?
                ",
                params![id.as_str(), owner.as_str()],
                TaskRow::from_row,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    fn insert_task_row(&self, task: &Task) -> Result<(), DbError> {
        self.conn().execute(
            "
            INSERT INTO tasks (id, owner, title, note, status, priority, due, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                task.id.as_str(),
                task.owner.as_str(),
                task.title,
                task.note,
                task.status.as_str(),
                task.priority.as_str(),
                task.due.map(format_timestamp),
                format_timestamp(task.created_at),
                format_timestamp(task.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_task_row(&self, task: &Task) -> Result<bool, DbError> {
        let changed = self.conn().execute(
            "
            UPDATE tasks
            SET title = ?, note = ?, status = ?, priority = ?, due = ?, updated_at = ?
            WHERE id = ? AND owner = ?
            ",
            params![
                task.title,
                task.note,
                task.status.as_str(),
                task.priority.as_str(),
                task.due.map(format_timestamp),
                format_timestamp(task.updated_at),
                task.id.as_str(),
                task.owner.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_task_row(&self, owner: &OwnerId, id: &TaskId) -> Result<bool, DbError> {
        let changed = self.conn().execute(
            "DELETE FROM tasks WHERE id = ? AND owner = ?",
            params![id.as_str(), owner.as_str()],
        )?;
        Ok(changed > 0)
    }

    fn select_open_session(&self, owner: &OwnerId) -> Result<Option<WorkSession>, DbError> {
        find_open_session(&self.conn(), owner)
    }

    fn open_session_tx(&self, session: &WorkSession) -> Result<Option<WorkSession>, DbError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let closed = close_open_session(&tx, &session.owner, session.start_at)?;
        tx.execute(
            "
            INSERT INTO work_sessions (id, task_id, owner, start_at, end_at)
            VALUES (?, ?, ?, ?, NULL)
            ",
            params![
                session.id.as_str(),
                session.task_id.as_str(),
                session.owner.as_str(),
                format_timestamp(session.start_at),
            ],
        )?;
        tx.commit()?;
        Ok(closed)
    }

    fn close_session_tx(
        &self,
        owner: &OwnerId,
        end_at: DateTime<Utc>,
    ) -> Result<Option<WorkSession>, DbError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let closed = close_open_session(&tx, owner, end_at)?;
        tx.commit()?;
        Ok(closed)
    }

    fn select_task_sessions(
        &self,
        owner: &OwnerId,
        task_id: &TaskId,
    ) -> Result<Vec<WorkSession>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT id, task_id, owner, start_at, end_at
            FROM work_sessions
            WHERE owner = ? AND task_id = ?
            ORDER BY start_at ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![owner.as_str(), task_id.as_str()],
            SessionRow::from_row,
        )?;
        let mut sessions = Vec::new();
        for row in rows {
            if let Some(session) = row?.into_session()? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    fn select_sessions_in_window(
        &self,
        owner: &OwnerId,
        window: &Window,
    ) -> Result<Vec<WorkSession>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT id, task_id, owner, start_at, end_at
            FROM work_sessions
            WHERE owner = ?1 AND start_at < ?3 AND COALESCE(end_at, ?3) > ?2
            ORDER BY start_at ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![
                owner.as_str(),
                format_timestamp(window.from),
                format_timestamp(window.to)
            ],
            SessionRow::from_row,
        )?;
        let mut sessions = Vec::new();
        for row in rows {
            if let Some(session) = row?.into_session()? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    fn count_done(&self, owner: &OwnerId, window: &Window) -> Result<u64, DbError> {
        let count: i64 = self.conn().query_row(
            "
            SELECT COUNT(*) FROM tasks
            WHERE owner = ? AND status = 'done' AND updated_at >= ? AND updated_at < ?
            ",
            params![
                owner.as_str(),
                format_timestamp(window.from),
                format_timestamp(window.to)
            ],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl Store for Database {
    fn list_tasks(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        Ok(self.select_tasks(owner, filter)?)
    }

    fn get_task(&self, owner: &OwnerId, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.select_task(owner, id)?)
    }

    fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        Ok(self.insert_task_row(task)?)
    }

    fn update_task(&self, task: &Task) -> Result<bool, StoreError> {
        Ok(self.update_task_row(task)?)
    }

    fn delete_task(&self, owner: &OwnerId, id: &TaskId) -> Result<bool, StoreError> {
        Ok(self.delete_task_row(owner, id)?)
    }

    fn active_session(&self, owner: &OwnerId) -> Result<Option<WorkSession>, StoreError> {
        Ok(self.select_open_session(owner)?)
    }

    fn open_session(&self, session: &WorkSession) -> Result<Option<WorkSession>, StoreError> {
        Ok(self.open_session_tx(session)?)
    }

    fn close_session(
        &self,
        owner: &OwnerId,
        end_at: DateTime<Utc>,
    ) -> Result<Option<WorkSession>, StoreError> {
        Ok(self.close_session_tx(owner, end_at)?)
    }

    fn task_sessions(
        &self,
        owner: &OwnerId,
        task_id: &TaskId,
    ) -> Result<Vec<WorkSession>, StoreError> {
        Ok(self.select_task_sessions(owner, task_id)?)
    }

    fn sessions_in_window(
        &self,
        owner: &OwnerId,
        window: &Window,
    ) -> Result<Vec<WorkSession>, StoreError> {
        Ok(self.select_sessions_in_window(owner, window)?)
    }

    fn count_completed(&self, owner: &OwnerId, window: &Window) -> Result<u64, StoreError> {
        Ok(self.count_done(owner, window)?)
    }
}

fn find_open_session(conn: &Connection, owner: &OwnerId) -> Result<Option<WorkSession>, DbError> {
    let row = conn
        .query_row(
            "
            SELECT id, task_id, owner, start_at, end_at
            FROM work_sessions
            WHERE owner = ? AND end_at IS NULL
            LIMIT 1
            ",
            [owner.as_str()],
            SessionRow::from_row,
        )
        .optional()?;
    Ok(row.map(SessionRow::into_session).transpose()?.flatten())
}

/// Closes the owner's open session, if any, and returns it as closed.
///
/// The session never ends before it started: `end_at` is raised to its
/// `start_at` when needed. An open row with an unreadable start is closed as
/// well but not returned.
fn close_open_session(
    conn: &Connection,
    owner: &OwnerId,
    end_at: DateTime<Utc>,
) -> Result<Option<WorkSession>, DbError> {
    let open = find_open_session(conn, owner)?;
    let end_at = open.as_ref().map_or(end_at, |open| end_at.max(open.start_at));
    let changed = conn.execute(
        "UPDATE work_sessions SET end_at = ? WHERE owner = ? AND end_at IS NULL",
        params![format_timestamp(end_at), owner.as_str()],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    Ok(open.map(|mut open| {
        open.end_at = Some(end_at);
        tracing::debug!(owner = %owner, session = %open.id, "closed open session");
        open
    }))
}

#[derive(Debug)]
struct TaskRow {
    id: String,
    owner: String,
    title: String,
    note: Option<String>,
    status: String,
    priority: String,
    due: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner: row.get(1)?,
            title: row.get(2)?,
            note: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            due: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_task(self) -> Result<Task, DbError> {
        let due = self
            .due
            .as_deref()
            .map(|due| parse_timestamp("tasks", &self.id, due))
            .transpose()?;
        let created_at = parse_timestamp("tasks", &self.id, &self.created_at)?;
        let updated_at = parse_timestamp("tasks", &self.id, &self.updated_at)?;
        Ok(Task {
            owner: OwnerId::new(self.owner).map_err(|e| invalid_row("tasks", &e))?,
            title: self.title,
            note: self.note,
            status: TaskStatus::parse_or_default(&self.status),
            priority: TaskPriority::parse_or_default(&self.priority),
            due,
            created_at,
            updated_at,
            id: TaskId::new(self.id).map_err(|e| invalid_row("tasks", &e))?,
        })
    }
}

#[derive(Debug)]
struct SessionRow {
    id: String,
    task_id: String,
    owner: String,
    start_at: String,
    end_at: Option<String>,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            owner: row.get(2)?,
            start_at: row.get(3)?,
            end_at: row.get(4)?,
        })
    }

    /// `None` for a row whose start cannot be read; see
    /// [`WorkSession::from_stored`].
    fn into_session(self) -> Result<Option<WorkSession>, DbError> {
        Ok(WorkSession::from_stored(
            SessionId::new(self.id).map_err(|e| invalid_row("work_sessions", &e))?,
            TaskId::new(self.task_id).map_err(|e| invalid_row("work_sessions", &e))?,
            OwnerId::new(self.owner).map_err(|e| invalid_row("work_sessions", &e))?,
            &self.start_at,
            self.end_at.as_deref(),
        ))
    }
}

fn invalid_row(table: &'static str, err: &impl std::fmt::Display) -> DbError {
    DbError::InvalidRow {
        table,
        message: err.to_string(),
    }
}

fn parse_timestamp(table: &'static str, id: &str, value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            id: id.to_string(),
            value: value.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
