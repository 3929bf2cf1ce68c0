use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};

/// Timezone events are displayed, grouped and annotated in unless the config overrides it.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

/// A sprint covers the start date plus this many days, both ends inclusive.
pub const SPRINT_LENGTH_DAYS: i64 = 13;

pub const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M";

/// One VEVENT as read from the calendar document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEventRecord {
    pub description: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub rrule: Option<String>,
    pub exdates: Vec<DateTime<Utc>>,
}

impl RawEventRecord {
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.with_timezone(&Utc)
    }

    pub fn duration(&self) -> Duration {
        self.end_utc() - self.start_utc()
    }

    pub fn is_recurring(&self) -> bool {
        self.rrule.as_deref().is_some_and(|rule| !rule.trim().is_empty())
    }
}

/// A concrete, time-bounded instance of a calendar event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: String,
}

impl Occurrence {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, description: impl Into<String>) -> Self {
        Occurrence {
            start,
            end,
            description: description.into(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// A maximal chain of overlapping same-day occurrences collapsed into one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: String,
}

impl From<ConsolidatedEvent> for Occurrence {
    fn from(event: ConsolidatedEvent) -> Self {
        Occurrence {
            start: event.start,
            end: event.end,
            description: event.description,
        }
    }
}

/// A manually entered event. Times are naive wall-clock values in the display timezone.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LocalEvent {
    pub description: String,
    #[serde(with = "local_datetime")]
    pub start: NaiveDateTime,
    #[serde(with = "local_datetime")]
    pub end: NaiveDateTime,
    #[serde(default)]
    pub excess_minutes: u32,
}

impl LocalEvent {
    pub fn new(
        description: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        excess_minutes: u32,
    ) -> TrackerResult<Self> {
        let description = description.trim();
        if description.is_empty() {
            return Err(TrackerError::Validation(
                "event description must not be empty".to_string(),
            ));
        }
        if end <= start {
            return Err(TrackerError::Validation(format!(
                "event end {} must be after its start {}",
                end.format(LOCAL_DATETIME_FORMAT),
                start.format(LOCAL_DATETIME_FORMAT)
            )));
        }
        Ok(LocalEvent {
            description: description.to_string(),
            start,
            end,
            excess_minutes,
        })
    }

    /// Same event as `other`, ignoring the excess minutes.
    pub fn same_slot(&self, other: &LocalEvent) -> bool {
        self.start == other.start && self.end == other.end && self.description == other.description
    }
}

/// Parse a user supplied `HH:MM` time of day.
pub fn parse_time_of_day(value: &str) -> TrackerResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
        TrackerError::Validation(format!("invalid time '{value}', expected HH:MM"))
    })
}

mod local_datetime {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::LOCAL_DATETIME_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(LOCAL_DATETIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, LOCAL_DATETIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Inclusive planning range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SprintWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SprintWindow {
    /// The fixed two-week sprint beginning on `start`.
    pub fn sprint(start: NaiveDate) -> Self {
        SprintWindow {
            start,
            end: start + Duration::days(SPRINT_LENGTH_DAYS),
        }
    }

    pub fn new(start: NaiveDate, end: NaiveDate) -> TrackerResult<Self> {
        if end < start {
            return Err(TrackerError::Validation(format!(
                "window end {end} is before its start {start}"
            )));
        }
        Ok(SprintWindow { start, end })
    }

    /// Window bounds as UTC instants: first day at midnight through the last
    /// microsecond of the final day. The dates are read as UTC dates regardless
    /// of the display timezone.
    pub fn utc_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start.and_time(NaiveTime::MIN).and_utc();
        let end = self
            .end
            .and_hms_micro_opt(23, 59, 59, 999_999)
            .unwrap_or_else(|| self.end.and_time(NaiveTime::MIN))
            .and_utc();
        (start, end)
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Identity of a calendar event for excess-minute annotations: the start as
/// display-timezone wall time at minute resolution plus the exact description.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub start: NaiveDateTime,
    pub description: String,
}

impl EventKey {
    pub fn new(start: DateTime<Utc>, description: &str, tz: Tz) -> Self {
        let local = start.with_timezone(&tz).naive_local();
        EventKey {
            start: truncate_to_minute(local),
            description: description.to_string(),
        }
    }
}

fn truncate_to_minute(value: NaiveDateTime) -> NaiveDateTime {
    value
        .with_second(0)
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(value)
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.start.format(KEY_TIMESTAMP_FORMAT),
            self.description
        )
    }
}

impl FromStr for EventKey {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (stamp, description) = s
            .split_once('_')
            .ok_or_else(|| TrackerError::Format(format!("annotation key '{s}' has no separator")))?;
        let start = NaiveDateTime::parse_from_str(stamp, KEY_TIMESTAMP_FORMAT)
            .map_err(|e| TrackerError::Format(format!("annotation key '{s}': {e}")))?;
        Ok(EventKey {
            start,
            description: description.to_string(),
        })
    }
}

/// Where a tracked event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Calendar(EventKey),
    Local,
}

impl Origin {
    pub fn tag(&self) -> &'static str {
        match self {
            Origin::Calendar(_) => "Calendar",
            Origin::Local => "Local",
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Origin::Local)
    }
}

/// View-model row of the final event list: what a display layer reads and edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEvent {
    pub origin: Origin,
    pub description: String,
    /// Display-timezone wall time.
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub base_minutes: i64,
    pub excess_minutes: u32,
    pub selected: bool,
}

impl TrackedEvent {
    pub fn from_calendar(event: &ConsolidatedEvent, tz: Tz, excess_minutes: u32) -> Self {
        TrackedEvent {
            origin: Origin::Calendar(EventKey::new(event.start, &event.description, tz)),
            description: event.description.clone(),
            start: event.start.with_timezone(&tz).naive_local(),
            end: event.end.with_timezone(&tz).naive_local(),
            base_minutes: whole_minutes(event.end - event.start),
            excess_minutes,
            selected: true,
        }
    }

    pub fn from_local(event: &LocalEvent) -> Self {
        TrackedEvent {
            origin: Origin::Local,
            description: event.description.clone(),
            start: event.start,
            end: event.end,
            base_minutes: whole_minutes(event.end - event.start),
            excess_minutes: event.excess_minutes,
            selected: true,
        }
    }

    pub fn total_minutes(&self) -> i64 {
        self.base_minutes + i64::from(self.excess_minutes)
    }
}

/// Floor of a duration in minutes.
pub fn whole_minutes(duration: Duration) -> i64 {
    duration.num_seconds().div_euclid(60)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub base_minutes: i64,
    pub excess_minutes: i64,
    pub total_minutes: i64,
    pub selected_count: usize,
}

/// Render minutes as `2h05m`, or `45m` below an hour.
pub fn format_minutes(minutes: i64) -> String {
    let hours = minutes.div_euclid(60);
    let rest = minutes.rem_euclid(60);
    if hours > 0 {
        format!("{hours}h{rest:02}m")
    } else {
        format!("{rest}m")
    }
}
