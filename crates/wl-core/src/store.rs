//! The storage capability every backend provides.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::interval::Window;
use crate::types::{OwnerId, Task, TaskFilter, TaskId, WorkSession};

/// Persistence for tasks and work sessions.
///
/// Every method is scoped to one owner; rows belonging to another owner must
/// be indistinguishable from missing rows. Implementations must return
/// identical results for identical data, including list order.
pub trait Store: Send + Sync {
    /// Lists the owner's tasks matching `filter`, in [`crate::task_list_order`].
    fn list_tasks(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    fn get_task(&self, owner: &OwnerId, id: &TaskId) -> Result<Option<Task>, StoreError>;

    fn insert_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Overwrites the mutable fields of `task`. Returns `false` if no task
    /// with that ID belongs to `task.owner`.
    fn update_task(&self, task: &Task) -> Result<bool, StoreError>;

    /// Returns `false` if no task with that ID belongs to `owner`.
    fn delete_task(&self, owner: &OwnerId, id: &TaskId) -> Result<bool, StoreError>;

    /// The owner's open session, if any.
    fn active_session(&self, owner: &OwnerId) -> Result<Option<WorkSession>, StoreError>;

    /// Closes the owner's open session at `session.start_at`, then inserts
    /// `session` as the new open session, as one atomic step.
    ///
    /// Returns the session that was closed. A failure part-way must never
    /// leave two open sessions behind.
    fn open_session(&self, session: &WorkSession) -> Result<Option<WorkSession>, StoreError>;

    /// Closes the owner's open session at `end_at` and returns it.
    fn close_session(
        &self,
        owner: &OwnerId,
        end_at: DateTime<Utc>,
    ) -> Result<Option<WorkSession>, StoreError>;

    /// All sessions recorded against one task, oldest first.
    fn task_sessions(&self, owner: &OwnerId, task_id: &TaskId)
    -> Result<Vec<WorkSession>, StoreError>;

    /// Sessions with `start_at < window.to` and `(end_at ?? window.to) > window.from`,
    /// oldest first.
    fn sessions_in_window(
        &self,
        owner: &OwnerId,
        window: &Window,
    ) -> Result<Vec<WorkSession>, StoreError>;

    /// Number of done tasks whose `updated_at` falls inside `window`.
    fn count_completed(&self, owner: &OwnerId, window: &Window) -> Result<u64, StoreError>;
}
