//! Summary command: tracked time per task and per day over a range.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use wl_core::{
    Clock, DayZone, OwnerId, RangeSummary, Store, SummaryRange, Tracker, WeekStart, Window,
};

use crate::cli::SummaryArgs;
use crate::commands::util::{format_duration, parse_datetime};

pub fn run<S: Store, C: Clock, W: Write>(
    writer: &mut W,
    tracker: &Tracker<S, C>,
    owner: &OwnerId,
    args: &SummaryArgs,
    default_week_start: WeekStart,
) -> Result<()> {
    let range = resolve_range(tracker.clock().now(), args, default_week_start)?;
    let summary = tracker.summary_for_range(owner, range)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&summary)?)?;
    } else {
        let timezone = timezone_label(tracker.day_zone());
        write!(writer, "{}", format_summary(&summary, &timezone))?;
    }
    Ok(())
}

fn resolve_range(
    now: DateTime<Utc>,
    args: &SummaryArgs,
    default_week_start: WeekStart,
) -> Result<SummaryRange> {
    if let Some(from) = args.from.as_deref() {
        let from = parse_datetime(from, now).context("invalid --from")?;
        let to = args
            .to
            .as_deref()
            .map(|to| parse_datetime(to, now).context("invalid --to"))
            .transpose()?
            .unwrap_or(now);
        return Ok(SummaryRange::Custom(Window::new(from, to)?));
    }

    let week_start = args
        .week_start
        .as_deref()
        .map(str::parse::<WeekStart>)
        .transpose()?
        .unwrap_or(default_week_start);
    let name = args.range.as_deref().unwrap_or("today");
    Ok(SummaryRange::parse(name, week_start)?)
}

fn timezone_label(zone: DayZone) -> String {
    match zone {
        DayZone::Utc => "UTC".to_string(),
        DayZone::Local => iana_time_zone::get_timezone().unwrap_or_else(|_| "local".to_string()),
    }
}

/// Formats the human-readable summary.
pub fn format_summary(data: &RangeSummary, timezone: &str) -> String {
    let summary = &data.summary;
    let mut output = String::new();

    writeln!(output, "SUMMARY: {}", data.range).unwrap();
    writeln!(
        output,
        "From:      {}",
        summary.from.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
    .unwrap();
    writeln!(
        output,
        "To:        {}",
        summary.to.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
    .unwrap();
    writeln!(output, "Timezone:  {timezone}").unwrap();

    writeln!(output).unwrap();
    writeln!(output, "BY TASK").unwrap();
    writeln!(output, "───────").unwrap();
    if summary.by_task.is_empty() {
        writeln!(output, "No work recorded.").unwrap();
    }
    for task in &summary.by_task {
        let plural = if task.session_count == 1 { "" } else { "s" };
        writeln!(
            output,
            "{:>7}  {} ({} session{plural})",
            format_duration(task.total_seconds),
            task.title,
            task.session_count
        )
        .unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "BY DAY").unwrap();
    writeln!(output, "──────").unwrap();
    for day in &summary.days {
        writeln!(output, "{}  {:>7}", day.date, format_duration(day.seconds)).unwrap();
    }

    writeln!(output).unwrap();
    writeln!(
        output,
        "Total tracked:  {}",
        format_duration(summary.total_seconds)
    )
    .unwrap();
    writeln!(output, "Completed:      {}", summary.completed_count).unwrap();
    output
}
