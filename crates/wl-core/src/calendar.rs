//! Calendar boundaries: day buckets and named summary ranges.

use std::fmt;

use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

use crate::interval::Window;
use crate::types::ValidationError;

/// Time zone whose calendar defines day boundaries.
///
/// Chosen once in configuration and applied to every summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayZone {
    /// The host's local time zone.
    #[default]
    Local,
    Utc,
}

impl DayZone {
    /// The instant the calendar day `date` begins.
    pub fn day_start(self, date: NaiveDate) -> DateTime<Utc> {
        match self {
            Self::Local => midnight_to_utc(&Local, date),
            Self::Utc => midnight_to_utc(&Utc, date),
        }
    }

    /// The calendar date containing `instant`.
    pub fn date_of(self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => instant.with_timezone(&Local).date_naive(),
            Self::Utc => instant.date_naive(),
        }
    }

    /// Every calendar day from the day containing `window.from` up to, but
    /// not including, `window.to`, paired with the instant it starts.
    pub fn days_in(self, window: &Window) -> Vec<(NaiveDate, DateTime<Utc>)> {
        match self {
            Self::Local => days_in_zone(&Local, window),
            Self::Utc => days_in_zone(&Utc, window),
        }
    }
}

fn days_in_zone<Tz: TimeZone>(tz: &Tz, window: &Window) -> Vec<(NaiveDate, DateTime<Utc>)> {
    let mut days = Vec::new();
    let mut date = window.from.with_timezone(tz).date_naive();
    loop {
        let start = midnight_to_utc(tz, date);
        if start >= window.to {
            break;
        }
        days.push((date, start));
        let Some(next) = date.succ_opt() else {
            break;
        };
        date = next;
    }
    days
}

impl fmt::Display for DayZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Utc => write!(f, "utc"),
        }
    }
}

/// Converts a calendar date at midnight in `tz` to UTC.
///
/// An ambiguous midnight (DST fall-back) resolves to the earlier instant; a
/// midnight skipped by DST resolves to the first valid hour of the day.
fn midnight_to_utc<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => (1..24)
            .find_map(|hour| {
                tz.from_local_datetime(&date.and_hms_opt(hour, 0, 0)?)
                    .earliest()
            })
            .map_or_else(
                || Utc.from_utc_datetime(&midnight),
                |dt| dt.with_timezone(&Utc),
            ),
    }
}

/// First day of the week for `week` summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Mon,
    Sun,
}

impl std::str::FromStr for WeekStart {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mon" => Ok(Self::Mon),
            "sun" => Ok(Self::Sun),
            _ => Err(ValidationError::InvalidRange {
                value: format!("week start {s}"),
            }),
        }
    }
}

/// The period a summary covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryRange {
    /// Since the start of today.
    Today,
    /// Since the start of the current week.
    Week(WeekStart),
    /// Since the first of the current month.
    Month,
    /// An explicit window.
    Custom(Window),
}

impl SummaryRange {
    /// Parses `today`, `week` or `month`.
    pub fn parse(name: &str, week_start: WeekStart) -> Result<Self, ValidationError> {
        match name {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week(week_start)),
            "month" => Ok(Self::Month),
            _ => Err(ValidationError::InvalidRange {
                value: name.to_string(),
            }),
        }
    }

    /// Name reported in the summary payload.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week(_) => "week",
            Self::Month => "month",
            Self::Custom(_) => "custom",
        }
    }

    /// Resolves the range to a concrete window ending at `now`.
    pub fn window(&self, zone: DayZone, now: DateTime<Utc>) -> Window {
        let today = zone.date_of(now);
        let first_day = match self {
            Self::Custom(window) => return *window,
            Self::Today => today,
            Self::Week(WeekStart::Mon) => {
                today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
            }
            Self::Week(WeekStart::Sun) => {
                today - Duration::days(i64::from(today.weekday().num_days_from_sunday()))
            }
            Self::Month => today.with_day(1).unwrap_or(today),
        };
        Window {
            from: zone.day_start(first_day),
            to: now,
        }
    }
}
