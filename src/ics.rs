//! Decoding of calendar documents into raw event records.

use std::io::Cursor;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use ical::parser::ical::component::IcalEvent;
use ical::property::Property;
use ical::IcalParser;
use tracing::{debug, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::models::RawEventRecord;

pub const MISSING_SUMMARY: &str = "Sem descrição";

/// Parse a calendar document into its VEVENT records, in document order.
///
/// Date-only values become midnight UTC; values carrying a TZID keep that zone.
pub fn parse_calendar(bytes: &[u8]) -> TrackerResult<Vec<RawEventRecord>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| TrackerError::Format(format!("calendar is not valid UTF-8: {e}")))?;

    let parser = IcalParser::new(Cursor::new(text.as_bytes()));
    let mut records = Vec::new();
    let mut calendars = 0;

    for calendar in parser {
        let calendar = calendar.map_err(|e| TrackerError::Format(e.to_string()))?;
        calendars += 1;
        for ical_event in calendar.events {
            if let Some(record) = record_from_event(ical_event)? {
                records.push(record);
            }
        }
    }

    if calendars == 0 {
        return Err(TrackerError::Format(
            "no VCALENDAR component found".to_string(),
        ));
    }

    debug!(events = records.len(), "parsed calendar");
    Ok(records)
}

fn record_from_event(ical_event: IcalEvent) -> TrackerResult<Option<RawEventRecord>> {
    let mut description = None;
    let mut start = None;
    let mut end = None;
    let mut rrule = None;
    let mut exdates = Vec::new();

    for property in &ical_event.properties {
        match property.name.as_str() {
            "SUMMARY" => {
                description = property.value.as_deref().map(|v| unescape_text(v).trim().to_string())
            }
            "DTSTART" => start = Some(parse_date_time(property)?),
            "DTEND" => end = Some(parse_date_time(property)?),
            "RRULE" => rrule = property.value.clone().filter(|v| !v.trim().is_empty()),
            "EXDATE" => exdates.extend(parse_exdates(property)),
            _ => {}
        }
    }

    let description = description.unwrap_or_else(|| MISSING_SUMMARY.to_string());

    let Some((start, date_only)) = start else {
        warn!(%description, "skipping event without DTSTART");
        return Ok(None);
    };

    let end = match end {
        Some((end, _)) => end,
        None if date_only => start + Duration::days(1),
        None => start,
    };

    Ok(Some(RawEventRecord {
        description,
        start,
        end,
        rrule,
        exdates,
    }))
}

fn param<'a>(property: &'a Property, name: &str) -> Option<&'a str> {
    property.params.as_ref().and_then(|params| {
        params.iter().find_map(|(key, values)| {
            if key.eq_ignore_ascii_case(name) {
                values.first().map(|v| v.trim_matches('"'))
            } else {
                None
            }
        })
    })
}

/// Returns the instant and whether the value was a bare DATE.
fn parse_date_time(property: &Property) -> TrackerResult<(DateTime<Tz>, bool)> {
    let value = property.value.as_deref().unwrap_or_default().trim();
    parse_value(&property.name, value, property_timezone(property))
}

fn property_timezone(property: &Property) -> Option<Tz> {
    let name = param(property, "TZID")?;
    resolve_timezone(name).or_else(|| {
        warn!(tzid = name, property = %property.name, "unknown TZID, reading value as UTC");
        None
    })
}

/// Exception instants of one EXDATE property. Unreadable values are skipped.
fn parse_exdates(property: &Property) -> Vec<DateTime<Utc>> {
    let tz = property_timezone(property);
    property
        .value
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .filter_map(|v| match parse_value(&property.name, v, tz) {
            Ok((dt, _)) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                warn!("ignoring exception date: {e}");
                None
            }
        })
        .collect()
}

fn parse_value(name: &str, value: &str, tz: Option<Tz>) -> TrackerResult<(DateTime<Tz>, bool)> {
    let invalid = || TrackerError::Format(format!("invalid {name} value '{value}'"));

    if !value.contains('T') {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|_| invalid())?;
        let midnight = date.and_time(NaiveTime::MIN).and_utc();
        return Ok((midnight.with_timezone(&Tz::UTC), true));
    }

    if let Some(utc_value) = value.strip_suffix('Z') {
        let naive =
            NaiveDateTime::parse_from_str(utc_value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
        return Ok((Tz::UTC.from_utc_datetime(&naive), false));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
    let tz = tz.unwrap_or(Tz::UTC);
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        // Wall time skipped by a DST jump: take the instant just after the gap.
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .ok_or_else(invalid)?;
    Ok((local, false))
}

/// Resolve an IANA zone name, falling back to the Windows names Outlook feeds use.
pub fn resolve_timezone(tz_name: &str) -> Option<Tz> {
    if let Ok(tz) = tz_name.parse::<Tz>() {
        return Some(tz);
    }
    match tz_name {
        "Central America Standard Time" => Some(Tz::America__Guatemala),
        "Central Europe Standard Time" => Some(Tz::Europe__Budapest),
        "Central Standard Time" => Some(Tz::America__Chicago),
        "E. South America Standard Time" => Some(Tz::America__Sao_Paulo),
        "Eastern Standard Time" => Some(Tz::America__New_York),
        "GMT Standard Time" => Some(Tz::Europe__London),
        "Greenwich Standard Time" => Some(Tz::Etc__GMT),
        "Mountain Standard Time" => Some(Tz::America__Denver),
        "Pacific Standard Time" => Some(Tz::America__Los_Angeles),
        "Romance Standard Time" => Some(Tz::Europe__Paris),
        "SA Pacific Standard Time" => Some(Tz::America__Bogota),
        "US Mountain Standard Time" => Some(Tz::America__Phoenix),
        "UTC" => Some(Tz::UTC),
        "W. Europe Standard Time" => Some(Tz::Europe__Berlin),
        _ => None,
    }
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
