//! RRULE expansion for recurring calendar records.
//!
//! Expands a record into the concrete occurrences whose start lies inside an
//! inclusive UTC window, dropping any that sit on an exception date.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use tracing::warn;

use crate::error::{TrackerError, TrackerResult};
use crate::models::{Occurrence, RawEventRecord};

/// Exception instants closer than this to a rule instant cancel it.
pub const EXDATE_TOLERANCE_SECONDS: i64 = 60;

const MAX_OCCURRENCES: u16 = 5000;

/// Rewrite any UNTIL bound without a `Z` marker as a UTC date-time.
///
/// Date-only bounds become midnight UTC. Values that cannot be read are left
/// untouched for the rule parser to reject.
pub fn normalize_until(rule: &str) -> String {
    rule.split(';')
        .map(|part| match part.split_once('=') {
            Some((name, value)) if name.eq_ignore_ascii_case("UNTIL") => {
                match parse_until(value.trim_end_matches('Z')) {
                    Some(until) => format!("{name}={}", until.format("%Y%m%dT%H%M%SZ")),
                    None => part.to_string(),
                }
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn parse_until(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y%m%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Build an iCalendar-format rule for the rrule crate, anchored at the record's start.
fn build_rrule_string(start: &DateTime<Tz>, rule: &str) -> String {
    let dtstart = if start.timezone() == Tz::UTC {
        format!("DTSTART:{}", start.format("%Y%m%dT%H%M%SZ"))
    } else {
        format!(
            "DTSTART;TZID={}:{}",
            start.timezone().name(),
            start.format("%Y%m%dT%H%M%S")
        )
    };
    format!("{dtstart}\nRRULE:{}", normalize_until(rule))
}

fn is_excluded(instant: DateTime<Utc>, exdates: &[DateTime<Utc>]) -> bool {
    exdates
        .iter()
        .any(|exdate| (instant - *exdate).num_seconds().abs() < EXDATE_TOLERANCE_SECONDS)
}

/// Expand a recurring record into occurrences starting within `[window_start, window_end]`.
///
/// Each occurrence keeps the base record's duration. A record without a rule
/// yields nothing; a rule that cannot be parsed is a `Recurrence` error.
pub fn expand(
    record: &RawEventRecord,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> TrackerResult<Vec<Occurrence>> {
    let rule = match record.rrule.as_deref() {
        Some(rule) if !rule.trim().is_empty() => rule,
        _ => return Ok(Vec::new()),
    };

    let rrule_str = build_rrule_string(&record.start, rule);
    let rrule_set: RRuleSet = rrule_str.parse().map_err(|e| {
        TrackerError::Recurrence(format!("'{}' ({rule}): {e}", record.description))
    })?;

    // Widen by a second on each side so the crate's range bounds never cut an
    // instant sitting exactly on the window edge; the exact check follows.
    let tz: rrule::Tz = Utc.into();
    let after = (window_start - Duration::seconds(1)).with_timezone(&tz);
    let before = (window_end + Duration::seconds(1)).with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);
    if result.limited {
        warn!(
            description = %record.description,
            "recurrence produced more than {MAX_OCCURRENCES} instants in the window, truncating"
        );
    }

    let duration = record.duration();
    let occurrences = result
        .dates
        .iter()
        .map(|instant| instant.with_timezone(&Utc))
        .filter(|start| window_start <= *start && *start <= window_end)
        .filter(|start| !is_excluded(*start, &record.exdates))
        .filter_map(|start| {
            let end = start + duration;
            (end > start).then(|| Occurrence::new(start, end, record.description.clone()))
        })
        .collect();

    Ok(occurrences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn daily_record(rule: &str) -> RawEventRecord {
        RawEventRecord {
            description: "Standup".to_string(),
            start: utc(2024, 1, 1, 9, 0).with_timezone(&Tz::UTC),
            end: utc(2024, 1, 1, 10, 0).with_timezone(&Tz::UTC),
            rrule: Some(rule.to_string()),
            exdates: Vec::new(),
        }
    }

    fn window_end(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 23, 59, 59).unwrap() + Duration::microseconds(999_999)
    }

    #[test]
    fn test_daily_rule_is_clipped_to_window() {
        let record = daily_record("FREQ=DAILY;COUNT=5");
        let occurrences = expand(&record, utc(2024, 1, 1, 0, 0), window_end(2024, 1, 3)).unwrap();

        assert_eq!(occurrences.len(), 3);
        for (day, occurrence) in occurrences.iter().enumerate() {
            assert_eq!(occurrence.start, utc(2024, 1, 1 + day as u32, 9, 0));
            assert_eq!(occurrence.duration(), Duration::minutes(60));
            assert_eq!(occurrence.description, "Standup");
        }
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let record = daily_record("FREQ=DAILY;COUNT=5");
        let occurrences = expand(&record, utc(2024, 1, 2, 9, 0), utc(2024, 1, 4, 9, 0)).unwrap();
        let starts: Vec<_> = occurrences.iter().map(|o| o.start).collect();
        assert_eq!(
            starts,
            vec![utc(2024, 1, 2, 9, 0), utc(2024, 1, 3, 9, 0), utc(2024, 1, 4, 9, 0)]
        );
    }

    #[test]
    fn test_exdates_within_tolerance_are_skipped() {
        let mut record = daily_record("FREQ=DAILY;COUNT=5");
        record.exdates = vec![
            utc(2024, 1, 2, 9, 0) + Duration::seconds(30),
            utc(2024, 1, 3, 9, 0) - Duration::seconds(90),
        ];
        let occurrences = expand(&record, utc(2024, 1, 1, 0, 0), window_end(2024, 1, 5)).unwrap();
        let starts: Vec<_> = occurrences.iter().map(|o| o.start).collect();
        assert_eq!(starts.len(), 4);
        assert!(!starts.contains(&utc(2024, 1, 2, 9, 0)));
        assert!(starts.contains(&utc(2024, 1, 3, 9, 0)));
    }

    #[test]
    fn test_exdate_tolerance_edge_is_exclusive() {
        let mut record = daily_record("FREQ=DAILY;COUNT=3");
        record.exdates = vec![
            utc(2024, 1, 2, 9, 0) + Duration::seconds(59),
            utc(2024, 1, 3, 9, 0) - Duration::seconds(60),
        ];
        let occurrences = expand(&record, utc(2024, 1, 1, 0, 0), window_end(2024, 1, 5)).unwrap();
        let starts: Vec<_> = occurrences.iter().map(|o| o.start).collect();
        assert_eq!(starts, vec![utc(2024, 1, 1, 9, 0), utc(2024, 1, 3, 9, 0)]);
    }

    #[test]
    fn test_floating_until_is_read_as_utc() {
        let record = daily_record("FREQ=DAILY;UNTIL=20240103T090000");
        let occurrences = expand(&record, utc(2024, 1, 1, 0, 0), window_end(2024, 1, 14)).unwrap();
        assert_eq!(occurrences.len(), 3);
        assert_eq!(occurrences[2].start, utc(2024, 1, 3, 9, 0));
    }

    #[test]
    fn test_floating_until_is_read_as_utc_for_zoned_start() {
        // 22:00 in Sao Paulo is 01:00Z the next day. The bound 2024-01-03 23:00 read
        // as UTC stops after the 01-03 instant; read as local time it would admit 01-04.
        let tz = Tz::America__Sao_Paulo;
        let start = tz.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap();
        let record = RawEventRecord {
            description: "Late sync".to_string(),
            start,
            end: start + Duration::minutes(30),
            rrule: Some("FREQ=DAILY;UNTIL=20240103T230000".to_string()),
            exdates: Vec::new(),
        };
        let occurrences = expand(&record, utc(2024, 1, 1, 0, 0), window_end(2024, 1, 14)).unwrap();
        let starts: Vec<_> = occurrences.iter().map(|o| o.start).collect();
        assert_eq!(starts, vec![utc(2024, 1, 2, 1, 0), utc(2024, 1, 3, 1, 0)]);
    }

    #[test]
    fn test_normalize_until() {
        assert_eq!(
            normalize_until("FREQ=WEEKLY;UNTIL=20240103T090000;BYDAY=MO"),
            "FREQ=WEEKLY;UNTIL=20240103T090000Z;BYDAY=MO"
        );
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20240110"),
            "FREQ=DAILY;UNTIL=20240110T000000Z"
        );
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20240110T120000Z"),
            "FREQ=DAILY;UNTIL=20240110T120000Z"
        );
        assert_eq!(normalize_until("FREQ=DAILY;COUNT=2"), "FREQ=DAILY;COUNT=2");
    }

    #[test]
    fn test_malformed_rule_is_recurrence_error() {
        let record = daily_record("FREQ=SOMETIMES");
        let result = expand(&record, utc(2024, 1, 1, 0, 0), window_end(2024, 1, 14));
        assert!(matches!(result, Err(TrackerError::Recurrence(_))));
    }

    #[test]
    fn test_zero_duration_instances_are_dropped() {
        let mut record = daily_record("FREQ=DAILY;COUNT=3");
        record.end = record.start;
        let occurrences = expand(&record, utc(2024, 1, 1, 0, 0), window_end(2024, 1, 14)).unwrap();
        assert!(occurrences.is_empty());
    }

    #[test]
    fn test_zoned_rule_follows_local_wall_time_across_dst() {
        let tz = Tz::America__New_York;
        let start = tz.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let record = RawEventRecord {
            description: "Weekly".to_string(),
            start,
            end: start + Duration::minutes(30),
            rrule: Some("FREQ=WEEKLY;COUNT=2".to_string()),
            exdates: Vec::new(),
        };
        let occurrences = expand(&record, utc(2024, 3, 1, 0, 0), window_end(2024, 3, 14)).unwrap();
        let starts: Vec<_> = occurrences.iter().map(|o| o.start).collect();
        assert_eq!(starts, vec![utc(2024, 3, 4, 15, 0), utc(2024, 3, 11, 14, 0)]);
    }
}
