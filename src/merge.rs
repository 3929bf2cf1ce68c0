//! Per-day consolidation of overlapping calendar occurrences.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::models::{ConsolidatedEvent, Occurrence};

struct Chain {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    description: String,
    best: Duration,
}

impl Chain {
    fn open(occurrence: Occurrence) -> Self {
        Chain {
            start: occurrence.start,
            end: occurrence.end,
            best: occurrence.duration(),
            description: occurrence.description,
        }
    }

    fn absorb(&mut self, occurrence: Occurrence) {
        self.end = self.end.max(occurrence.end);
        let duration = occurrence.duration();
        if duration > self.best {
            self.best = duration;
            self.description = occurrence.description;
        }
    }

    fn close(self) -> ConsolidatedEvent {
        ConsolidatedEvent {
            start: self.start,
            end: self.end,
            description: self.description,
        }
    }
}

/// Collapse overlapping occurrences that start on the same local date in `tz`.
///
/// A chain keeps the description of its longest member (first one wins a tie).
/// Chains never cross days: grouping is by the start's local date, even when an
/// extended end runs past midnight. Output is ordered by day, then start.
pub fn merge_by_day(occurrences: Vec<Occurrence>, tz: Tz) -> Vec<ConsolidatedEvent> {
    let mut by_day: BTreeMap<NaiveDate, Vec<Occurrence>> = BTreeMap::new();
    for occurrence in occurrences {
        let day = occurrence.start.with_timezone(&tz).date_naive();
        by_day.entry(day).or_default().push(occurrence);
    }

    let mut merged = Vec::new();
    for (_, mut day) in by_day {
        day.sort_by_key(|o| o.start);
        merged.extend(merge_day(day));
    }
    merged
}

/// Sweep one day's occurrences, already sorted by start.
fn merge_day(day: Vec<Occurrence>) -> Vec<ConsolidatedEvent> {
    let mut merged = Vec::new();
    let mut current: Option<Chain> = None;

    for occurrence in day {
        current = match current.take() {
            Some(mut chain) if occurrence.start < chain.end => {
                chain.absorb(occurrence);
                Some(chain)
            }
            Some(chain) => {
                merged.push(chain.close());
                Some(Chain::open(occurrence))
            }
            None => Some(Chain::open(occurrence)),
        };
    }

    if let Some(chain) = current {
        merged.push(chain.close());
    }
    merged
}
