use std::io::Write;

use chrono::{NaiveDate, NaiveTime};

use crate::error::TrackerResult;
use crate::models::TrackedEvent;

pub const CSV_DELIMITER: &str = ";";

const HEADER: [&str; 8] = [
    "Date",
    "Start",
    "End",
    "Duration (minutes)",
    "Excess Minutes",
    "Total Duration",
    "Description",
    "Type (Local/Calendar)",
];

/// One exported line, in display-timezone wall time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub base_minutes: i64,
    pub excess_minutes: u32,
    pub total_minutes: i64,
    pub description: String,
    pub origin: &'static str,
}

impl From<&TrackedEvent> for ExportRow {
    fn from(event: &TrackedEvent) -> Self {
        ExportRow {
            date: event.start.date(),
            start_time: event.start.time(),
            end_time: event.end.time(),
            base_minutes: event.base_minutes,
            excess_minutes: event.excess_minutes,
            total_minutes: event.total_minutes(),
            description: event.description.clone(),
            origin: event.origin.tag(),
        }
    }
}

/// Rows for the selected events, by start.
pub fn rows(events: &[TrackedEvent]) -> Vec<ExportRow> {
    let mut selected: Vec<&TrackedEvent> = events.iter().filter(|e| e.selected).collect();
    selected.sort_by_key(|e| e.start);
    selected.into_iter().map(ExportRow::from).collect()
}

fn field(value: &str) -> String {
    if value.contains(CSV_DELIMITER) || value.contains(['"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_line<W: Write>(writer: &mut W, fields: &[String]) -> TrackerResult<()> {
    let line = fields.join(CSV_DELIMITER);
    writeln!(writer, "{line}")?;
    Ok(())
}

/// Write `rows` as `;`-separated values with a header line.
pub fn write_csv<W: Write>(rows: &[ExportRow], mut writer: W) -> TrackerResult<()> {
    let header: Vec<String> = HEADER.iter().map(|h| field(h)).collect();
    write_line(&mut writer, &header)?;

    for row in rows {
        write_line(
            &mut writer,
            &[
                row.date.format("%Y-%m-%d").to_string(),
                row.start_time.format("%H:%M").to_string(),
                row.end_time.format("%H:%M").to_string(),
                row.base_minutes.to_string(),
                row.excess_minutes.to_string(),
                row.total_minutes.to_string(),
                field(&row.description),
                row.origin.to_string(),
            ],
        )?;
    }
    writer.flush()?;
    Ok(())
}
