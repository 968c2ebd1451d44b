//! Task store: owner-scoped CRUD and completion.

use std::collections::HashMap;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::interval::{Window, elapsed_seconds};
use crate::store::Store;
use crate::tracker::Tracker;
use crate::types::{
    NewTask, OwnerId, Task, TaskFilter, TaskId, TaskPatch, TaskPriority, TaskStatus,
    TaskWithMeta, ValidationError,
};

impl<S: Store, C: Clock> Tracker<S, C> {
    pub fn list_tasks(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self.store.list_tasks(owner, filter)?)
    }

    /// Lists tasks together with whether each is being worked on and its
    /// total tracked seconds so far.
    pub fn list_tasks_with_meta(
        &self,
        owner: &OwnerId,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskWithMeta>> {
        let now = self.clock.now();
        let tasks = self.store.list_tasks(owner, filter)?;
        let active = self.store.active_session(owner)?;

        let lifetime = Window::until(now);
        let mut totals: HashMap<TaskId, i64> = HashMap::new();
        for session in self.store.sessions_in_window(owner, &lifetime)? {
            *totals.entry(session.task_id).or_insert(0) +=
                elapsed_seconds(session.start_at, session.end_at, &lifetime, now);
        }

        Ok(tasks
            .into_iter()
            .map(|task| TaskWithMeta {
                is_active: active.as_ref().is_some_and(|s| s.task_id == task.id),
                total_seconds: totals.get(&task.id).copied().unwrap_or(0),
                task,
            })
            .collect())
    }

    pub fn get_task(&self, owner: &OwnerId, id: &TaskId) -> Result<Task> {
        self.store.get_task(owner, id)?.ok_or(Error::NotFound)
    }

    /// Creates a task in `todo`. An unknown priority becomes `normal`.
    pub fn create_task(&self, owner: &OwnerId, input: NewTask) -> Result<Task> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ValidationError::Empty { field: "title" }.into());
        }

        let now = self.clock.now();
        let task = Task {
            id: TaskId::generate(),
            owner: owner.clone(),
            title: title.to_string(),
            note: input.note,
            status: TaskStatus::Todo,
            priority: input
                .priority
                .as_deref()
                .map(TaskPriority::parse_or_default)
                .unwrap_or_default(),
            due: input.due,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_task(&task)?;
        tracing::debug!(owner = %owner, task = %task.id, "created task");
        Ok(task)
    }

    /// Applies a partial update.
    ///
    /// Unknown status or priority values are ignored and a blank title keeps
    /// the current one. Moving a task to `done` stops its running session
    /// first, exactly as [`Self::complete_task`] does.
    pub fn update_task(&self, owner: &OwnerId, id: &TaskId, patch: TaskPatch) -> Result<Task> {
        self.locks.serialize(owner, || {
            let now = self.clock.now();
            let mut task = self.get_task(owner, id)?;
            let was_done = task.status == TaskStatus::Done;

            if let Some(title) = patch
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
            {
                task.title = title.to_string();
            }
            if let Some(note) = patch.note {
                task.note = Some(note);
            }
            if let Some(status) = patch
                .status
                .as_deref()
                .and_then(|s| s.parse::<TaskStatus>().ok())
            {
                task.status = status;
            }
            if let Some(priority) = patch
                .priority
                .as_deref()
                .and_then(|p| p.parse::<TaskPriority>().ok())
            {
                task.priority = priority;
            }
            if let Some(due) = patch.due {
                task.due = due;
            }
            task.updated_at = now;

            if task.status == TaskStatus::Done && !was_done {
                self.close_if_running(owner, id, now)?;
            }
            self.write_task(&task)?;
            Ok(task)
        })
    }

    /// Deletes a task. Its sessions stay and are summarised under a
    /// placeholder title.
    pub fn delete_task(&self, owner: &OwnerId, id: &TaskId) -> Result<()> {
        if !self.store.delete_task(owner, id)? {
            return Err(Error::NotFound);
        }
        tracing::debug!(owner = %owner, task = %id, "deleted task");
        Ok(())
    }

    /// Marks a task done, stopping its session first so the task's total is
    /// frozen before the status changes.
    pub fn complete_task(&self, owner: &OwnerId, id: &TaskId) -> Result<Task> {
        self.locks.serialize(owner, || {
            let now = self.clock.now();
            let mut task = self.get_task(owner, id)?;

            if let Some(stopped) = self.close_if_running(owner, id, now)? {
                tracing::debug!(
                    owner = %owner,
                    session = %stopped.id,
                    "stopped session of completed task"
                );
            }
            task.status = TaskStatus::Done;
            task.updated_at = now;
            self.write_task(&task)?;
            Ok(task)
        })
    }

    fn write_task(&self, task: &Task) -> Result<()> {
        if self.store.update_task(task)? {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }
}
