use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::models::{LocalEvent, Occurrence, RawEventRecord, SprintWindow};
use crate::recurrence;

/// Case-insensitive marker identifying a cancelled event.
pub const CANCELLATION_MARKER: &str = "cancelado";

pub fn is_cancelled(description: &str) -> bool {
    description.to_lowercase().contains(CANCELLATION_MARKER)
}

/// Window test for single events: only the start instant counts.
pub fn in_window(start: DateTime<Utc>, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> bool {
    window_start <= start && start <= window_end
}

/// Local events are kept when their start date falls inside the window.
pub fn local_in_window(event: &LocalEvent, window: &SprintWindow) -> bool {
    window.contains_date(event.start.date())
}

/// Turn parsed records into the occurrences that belong to `window`.
///
/// Cancelled records are dropped before expansion and cancelled occurrences
/// again afterwards. A record whose rule fails to expand is logged and skipped.
pub fn collect_occurrences(records: &[RawEventRecord], window: &SprintWindow) -> Vec<Occurrence> {
    let (window_start, window_end) = window.utc_bounds();
    let mut occurrences = Vec::new();

    for record in records.iter().filter(|r| !is_cancelled(&r.description)) {
        if record.is_recurring() {
            match recurrence::expand(record, window_start, window_end) {
                Ok(expanded) => occurrences.extend(expanded),
                Err(e) => error!(description = %record.description, "skipping recurrence: {e}"),
            }
        } else if in_window(record.start_utc(), window_start, window_end) {
            occurrences.push(Occurrence::new(
                record.start_utc(),
                record.end_utc(),
                record.description.clone(),
            ));
        }
    }

    occurrences.retain(|o| !is_cancelled(&o.description));
    debug!(count = occurrences.len(), "collected occurrences");
    occurrences
}
