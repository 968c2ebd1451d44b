//! Session ledger: starting and stopping work.
//!
//! Per owner the ledger is either idle or has exactly one open session.
//! Starting work while a session is open closes that session at the same
//! instant the new one opens; there is no paused state.

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::tracker::Tracker;
use crate::types::{OwnerId, SessionId, Task, TaskId, TaskStatus, WorkSession};

impl<S: Store, C: Clock> Tracker<S, C> {
    /// The owner's open session, if any.
    pub fn active_session(&self, owner: &OwnerId) -> Result<Option<WorkSession>> {
        Ok(self.store.active_session(owner)?)
    }

    /// Starts work on `task_id`, closing whatever session the owner had open.
    ///
    /// Fails with [`Error::NotFound`] if the task does not belong to `owner`.
    pub fn start_work(&self, owner: &OwnerId, task_id: &TaskId) -> Result<WorkSession> {
        self.locks.serialize(owner, || {
            let now = self.clock.now();
            let task = self
                .store
                .get_task(owner, task_id)?
                .ok_or(Error::NotFound)?;

            let session = WorkSession {
                id: SessionId::generate(),
                task_id: task.id.clone(),
                owner: owner.clone(),
                start_at: now,
                end_at: None,
            };
            if let Some(closed) = self.store.open_session(&session)? {
                tracing::debug!(
                    owner = %owner,
                    closed = %closed.id,
                    task = %closed.task_id,
                    "closed previous session"
                );
            }
            tracing::debug!(owner = %owner, session = %session.id, task = %task_id, "started work");

            self.mark_in_progress(task, now);
            Ok(session)
        })
    }

    /// Stops the owner's open session and returns it, or `None` if nothing
    /// was running. Calling it again is harmless.
    pub fn stop_work(&self, owner: &OwnerId) -> Result<Option<WorkSession>> {
        self.locks.serialize(owner, || {
            let now = self.clock.now();
            let closed = self.store.close_session(owner, now)?;
            match &closed {
                Some(session) => {
                    tracing::debug!(owner = %owner, session = %session.id, "stopped work");
                }
                None => tracing::debug!(owner = %owner, "no active session to stop"),
            }
            Ok(closed)
        })
    }

    /// Closes the owner's open session if it belongs to `task_id`.
    ///
    /// Callers must already hold the owner's lock.
    pub(crate) fn close_if_running(
        &self,
        owner: &OwnerId,
        task_id: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkSession>> {
        match self.store.active_session(owner)? {
            Some(active) if active.task_id == *task_id => Ok(self.store.close_session(owner, now)?),
            _ => Ok(None),
        }
    }

    /// Attempts to move a task to `in_progress` and ignores failure.
    ///
    /// The session row is the authoritative record of work, so a failed
    /// status write is logged and otherwise dropped.
    fn mark_in_progress(&self, mut task: Task, now: DateTime<Utc>) {
        task.status = TaskStatus::InProgress;
        task.updated_at = now;
        match self.store.update_task(&task) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(task = %task.id, "task vanished before status update"),
            Err(err) => tracing::warn!(task = %task.id, error = %err, "failed to mark task in progress"),
        }
    }
}
