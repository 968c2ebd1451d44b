//! Task commands: add, list, edit, delete, complete.

use std::io::Write;

use anyhow::{Context, Result};
use wl_core::{
    Clock, NewTask, OwnerId, Store, TaskFilter, TaskId, TaskPatch, TaskStatus, TaskWithMeta,
    Tracker,
};

use crate::cli::{AddArgs, EditArgs, ListArgs};
use crate::commands::util::{format_duration, parse_datetime, short_id};

pub fn add<S: Store, C: Clock, W: Write>(
    writer: &mut W,
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
    args: &AddArgs,
) -> Result<()> {
    let due = args
        .due
        .as_deref()
        .map(|due| parse_datetime(due, tracker.clock().now()))
        .transpose()?;
    let task = tracker.create_task(
        owner,
        NewTask {
            title: args.title.clone(),
            note: args.note.clone(),
            priority: args.priority.clone(),
            due,
        },
    )?;
    writeln!(writer, "Created task {}: {}", task.id, task.title)?;
    Ok(())
}

pub fn list<S: Store, C: Clock, W: Write>(
    writer: &mut W,
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
    args: &ListArgs,
) -> Result<()> {
    let status = args
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()?;
    let filter = TaskFilter {
        status,
        query: args.query.clone(),
    };
    let tasks = tracker.list_tasks_with_meta(owner, &filter)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&tasks)?)?;
    } else {
        write!(writer, "{}", format_task_list(&tasks, tracker))?;
    }
    Ok(())
}

fn format_task_list<S: Store, C: Clock>(tasks: &[TaskWithMeta], tracker: &Tracker<S, C>) -> String {
    use std::fmt::Write;

    if tasks.is_empty() {
        return "No tasks.\n".to_string();
    }

    let mut output = String::new();
    writeln!(
        output,
        "  {:<8}  {:<11}  {:<8}  {:<10}  {:>7}  TITLE",
        "ID", "STATUS", "PRIORITY", "DUE", "TRACKED"
    )
    .unwrap();
    for entry in tasks {
        let task = &entry.task;
        let marker = if entry.is_active { '*' } else { ' ' };
        let due = task.due.map_or_else(
            || "-".to_string(),
            |due| tracker.day_zone().date_of(due).to_string(),
        );
        writeln!(
            output,
            "{marker} {:<8}  {:<11}  {:<8}  {:<10}  {:>7}  {}",
            short_id(task.id.as_str()),
            task.status.as_str(),
            task.priority.as_str(),
            due,
            format_duration(entry.total_seconds),
            task.title
        )
        .unwrap();
    }
    output
}

pub fn edit<S: Store, C: Clock, W: Write>(
    writer: &mut W,
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
    args: &EditArgs,
) -> Result<()> {
    let id = resolve_task_id(tracker, owner, &args.id)?;
    let due = if args.clear_due {
        Some(None)
    } else {
        args.due
            .as_deref()
            .map(|due| parse_datetime(due, tracker.clock().now()))
            .transpose()?
            .map(Some)
    };
    if let Some(status) = args.status.as_deref() {
        if status.parse::<TaskStatus>().is_err() {
            tracing::warn!(status, "ignoring unknown status");
        }
    }

    let task = tracker.update_task(
        owner,
        &id,
        TaskPatch {
            title: args.title.clone(),
            note: args.note.clone(),
            status: args.status.clone(),
            priority: args.priority.clone(),
            due,
        },
    )?;
    writeln!(
        writer,
        "Updated task {}: {} [{}]",
        short_id(task.id.as_str()),
        task.title,
        task.status
    )?;
    Ok(())
}

pub fn delete<S: Store, C: Clock, W: Write>(
    writer: &mut W,
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
    id: &str,
) -> Result<()> {
    let id = resolve_task_id(tracker, owner, id)?;
    tracker.delete_task(owner, &id)?;
    writeln!(writer, "Deleted task {}", short_id(id.as_str()))?;
    Ok(())
}

pub fn complete<S: Store, C: Clock, W: Write>(
    writer: &mut W,
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
    id: &str,
) -> Result<()> {
    let id = resolve_task_id(tracker, owner, id)?;
    let task = tracker.complete_task(owner, &id)?;
    let total = tracker.task_total_seconds(owner, &id)?;
    writeln!(
        writer,
        "Completed {}. Total tracked: {}",
        task.title,
        format_duration(total)
    )?;
    Ok(())
}

/// Accepts a full task ID or an unambiguous prefix of one.
pub fn resolve_task_id<S: Store, C: Clock>(
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
    input: &str,
) -> Result<TaskId> {
    let input = input.trim();
    let tasks = tracker.list_tasks(owner, &TaskFilter::default())?;
    if let Some(task) = tasks.iter().find(|t| t.id.as_str() == input) {
        return Ok(task.id.clone());
    }

    let mut matches = tasks.iter().filter(|t| t.id.as_str().starts_with(input));
    match (matches.next(), matches.next()) {
        (Some(task), None) if !input.is_empty() => Ok(task.id.clone()),
        (Some(_), Some(_)) => anyhow::bail!("task ID prefix '{input}' is ambiguous"),
        _ => Err(wl_core::Error::NotFound).with_context(|| format!("no task matches '{input}'")),
    }
}
