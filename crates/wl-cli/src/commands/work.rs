//! Session commands: start, stop, status.

use std::io::Write;

use anyhow::Result;
use wl_core::{Clock, DELETED_TASK_TITLE, Error, OwnerId, Store, TaskId, Tracker};

use crate::commands::tasks::resolve_task_id;
use crate::commands::util::{format_duration, short_id};

pub fn start<S: Store, C: Clock, W: Write>(
    writer: &mut W,
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
    id: &str,
) -> Result<()> {
    let id = resolve_task_id(tracker, owner, id)?;
    let previous = tracker.active_session(owner)?;
    let session = tracker.start_work(owner, &id)?;

    if let Some(previous) = previous.filter(|p| p.task_id != session.task_id) {
        writeln!(
            writer,
            "Stopped {}",
            title_of(tracker, owner, &previous.task_id)?
        )?;
    }
    writeln!(
        writer,
        "Started {} ({})",
        title_of(tracker, owner, &session.task_id)?,
        short_id(session.task_id.as_str())
    )?;
    Ok(())
}

pub fn stop<S: Store, C: Clock, W: Write>(
    writer: &mut W,
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
) -> Result<()> {
    let Some(session) = tracker.stop_work(owner)? else {
        writeln!(writer, "Nothing to stop.")?;
        return Ok(());
    };
    let elapsed = session
        .end_at
        .map_or(0, |end| (end - session.start_at).num_seconds());
    writeln!(
        writer,
        "Stopped {} after {}",
        title_of(tracker, owner, &session.task_id)?,
        format_duration(elapsed)
    )?;
    Ok(())
}

pub fn status<S: Store, C: Clock, W: Write>(
    writer: &mut W,
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
) -> Result<()> {
    let Some(session) = tracker.active_session(owner)? else {
        writeln!(writer, "Not working on anything.")?;
        return Ok(());
    };
    let now = tracker.clock().now();
    let elapsed = (now - session.start_at).num_seconds();
    let total = tracker.task_total_seconds(owner, &session.task_id)?;
    writeln!(
        writer,
        "Working on {} ({})",
        title_of(tracker, owner, &session.task_id)?,
        short_id(session.task_id.as_str())
    )?;
    writeln!(writer, "Session:  {}", format_duration(elapsed))?;
    writeln!(writer, "Task:     {}", format_duration(total))?;
    Ok(())
}

/// A task's title, or the placeholder if it has been deleted.
fn title_of<S: Store, C: Clock>(
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
    id: &TaskId,
) -> Result<String> {
    match tracker.get_task(owner, id) {
        Ok(task) => Ok(task.title),
        Err(Error::NotFound) => Ok(DELETED_TASK_TITLE.to_string()),
        Err(err) => Err(err.into()),
    }
}
