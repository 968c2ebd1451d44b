//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Task list with session-based time tracking.
///
/// Start work on a task, switch between tasks, and summarise where the time
/// went by task and by day.
#[derive(Debug, Parser)]
#[command(name = "wl", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as this owner instead of the configured one.
    #[arg(long, global = true)]
    pub owner: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a task.
    Add(AddArgs),

    /// List tasks with tracked time.
    List(ListArgs),

    /// Change fields of a task.
    Edit(EditArgs),

    /// Delete a task. Its tracked time stays in summaries.
    Delete {
        /// Task ID.
        id: String,
    },

    /// Start working on a task, stopping whatever was running.
    Start {
        /// Task ID.
        id: String,
    },

    /// Stop the running session.
    Stop,

    /// Mark a task done, stopping its session if it is running.
    Complete {
        /// Task ID.
        id: String,
    },

    /// Show what is being worked on right now.
    Status,

    /// Summarise tracked time over a range.
    Summary(SummaryArgs),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Task title.
    pub title: String,

    /// Free-form note.
    #[arg(long)]
    pub note: Option<String>,

    /// low, normal, high or urgent.
    #[arg(long)]
    pub priority: Option<String>,

    /// Due date (ISO 8601 or relative, e.g. "in 2 days").
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Debug, Default, Args)]
pub struct ListArgs {
    /// Only tasks with this status.
    #[arg(long)]
    pub status: Option<String>,

    /// Only tasks whose title or note contains this text.
    #[arg(long, short)]
    pub query: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Default, Args)]
pub struct EditArgs {
    /// Task ID.
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub note: Option<String>,

    /// todo, in_progress, done or canceled.
    #[arg(long)]
    pub status: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,

    /// Remove the due date.
    #[arg(long)]
    pub clear_due: bool,
}

#[derive(Debug, Default, Args)]
pub struct SummaryArgs {
    /// today, week or month.
    #[arg(long, conflicts_with = "from")]
    pub range: Option<String>,

    /// First day of the week for `--range week` (mon or sun).
    #[arg(long)]
    pub week_start: Option<String>,

    /// Start of a custom window (ISO 8601 or relative).
    #[arg(long)]
    pub from: Option<String>,

    /// End of a custom window; defaults to now.
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}
