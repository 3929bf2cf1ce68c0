//! End-to-end aggregation of calendar and local events for a sprint.

use chrono_tz::Tz;
use tracing::info;

use crate::error::{TrackerError, TrackerResult};
use crate::filter::collect_occurrences;
use crate::ics::parse_calendar;
use crate::merge::merge_by_day;
use crate::models::{ConsolidatedEvent, LocalEvent, Origin, SprintWindow, Totals, TrackedEvent};
use crate::source::CalendarSource;
use crate::store::{AnnotationStore, LocalEventStore};

/// Parse, expand, filter and merge a calendar document for `window`.
pub fn consolidate(bytes: &[u8], window: &SprintWindow, tz: Tz) -> TrackerResult<Vec<ConsolidatedEvent>> {
    let records = parse_calendar(bytes)?;
    let occurrences = collect_occurrences(&records, window);
    Ok(merge_by_day(occurrences, tz))
}

/// Count `events` and sum their base and excess minutes.
pub fn totals<'a>(events: impl IntoIterator<Item = &'a TrackedEvent>) -> Totals {
    events.into_iter().fold(Totals::default(), |mut acc, event| {
        acc.selected_count += 1;
        acc.base_minutes += event.base_minutes;
        acc.excess_minutes += i64::from(event.excess_minutes);
        acc.total_minutes = acc.base_minutes + acc.excess_minutes;
        acc
    })
}

/// Owns the stores and the current event list a display layer works against.
#[derive(Debug)]
pub struct Tracker {
    tz: Tz,
    annotations: AnnotationStore,
    local_events: LocalEventStore,
    window: Option<SprintWindow>,
    calendar_events: Vec<ConsolidatedEvent>,
    events: Vec<TrackedEvent>,
}

impl Tracker {
    pub fn new(tz: Tz, annotations: AnnotationStore, local_events: LocalEventStore) -> Self {
        Tracker {
            tz,
            annotations,
            local_events,
            window: None,
            calendar_events: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn window(&self) -> Option<SprintWindow> {
        self.window
    }

    /// The merged, sorted event list.
    pub fn events(&self) -> &[TrackedEvent] {
        &self.events
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn local_events(&self) -> &LocalEventStore {
        &self.local_events
    }

    /// Load `window`, optionally from a calendar source.
    ///
    /// Fails without touching the current list when the source cannot be read
    /// or parsed. Without a source only local events are listed.
    pub fn load(&mut self, source: Option<&CalendarSource>, window: SprintWindow) -> TrackerResult<()> {
        let calendar_events = match source {
            Some(source) => {
                let bytes = source.fetch()?;
                consolidate(&bytes, &window, self.tz)?
            }
            None => Vec::new(),
        };
        self.replace(calendar_events, window);
        Ok(())
    }

    /// Same as [`Tracker::load`] for calendar bytes already in hand.
    pub fn load_bytes(&mut self, bytes: &[u8], window: SprintWindow) -> TrackerResult<()> {
        let calendar_events = consolidate(bytes, &window, self.tz)?;
        self.replace(calendar_events, window);
        Ok(())
    }

    fn replace(&mut self, calendar_events: Vec<ConsolidatedEvent>, window: SprintWindow) {
        info!(
            calendar = calendar_events.len(),
            start = %window.start,
            end = %window.end,
            "loaded sprint"
        );
        self.calendar_events = calendar_events;
        self.window = Some(window);
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let Some(window) = self.window else {
            self.events.clear();
            return;
        };

        let mut events: Vec<TrackedEvent> = self
            .calendar_events
            .iter()
            .map(|event| {
                let mut tracked = TrackedEvent::from_calendar(event, self.tz, 0);
                if let Origin::Calendar(key) = &tracked.origin {
                    tracked.excess_minutes = self.annotations.get(key);
                }
                tracked
            })
            .collect();
        events.extend(
            self.local_events
                .in_window(&window)
                .into_iter()
                .map(TrackedEvent::from_local),
        );
        events.sort_by_key(|event| event.start);
        self.events = events;
    }

    fn event_mut(&mut self, index: usize) -> TrackerResult<&mut TrackedEvent> {
        self.events
            .get_mut(index)
            .ok_or_else(|| TrackerError::Validation(format!("no event at index {index}")))
    }

    pub fn set_selected(&mut self, index: usize, selected: bool) -> TrackerResult<()> {
        self.event_mut(index)?.selected = selected;
        Ok(())
    }

    /// Record excess minutes for one listed event and persist them.
    pub fn set_excess(&mut self, index: usize, minutes: u32) -> TrackerResult<()> {
        let event = self.event_mut(index)?.clone();

        match &event.origin {
            Origin::Calendar(key) => self.annotations.set(key.clone(), minutes),
            Origin::Local => {
                let slot = local_slot(&event);
                if !self.local_events.set_excess(&slot, minutes) {
                    return Err(TrackerError::Validation(format!(
                        "local event '{}' is no longer stored",
                        event.description
                    )));
                }
            }
        }
        self.events[index].excess_minutes = minutes;
        Ok(())
    }

    /// Store a new local event, listing it when it falls in the loaded window.
    pub fn add_local(&mut self, event: LocalEvent) {
        self.local_events.add(event);
        self.rebuild();
    }

    /// Delete the local event at `index` from the list and the store.
    pub fn remove_local(&mut self, index: usize) -> TrackerResult<LocalEvent> {
        let event = self.event_mut(index)?.clone();
        if !event.origin.is_local() {
            return Err(TrackerError::Validation(format!(
                "'{}' comes from the calendar and cannot be removed",
                event.description
            )));
        }
        let slot = local_slot(&event);
        if !self.local_events.remove(&slot) {
            return Err(TrackerError::Validation(format!(
                "local event '{}' is no longer stored",
                event.description
            )));
        }
        self.events.remove(index);
        Ok(slot)
    }

    pub fn selected(&self) -> impl Iterator<Item = &TrackedEvent> {
        self.events.iter().filter(|event| event.selected)
    }

    pub fn selected_totals(&self) -> Totals {
        totals(self.selected())
    }
}

fn local_slot(event: &TrackedEvent) -> LocalEvent {
    LocalEvent {
        description: event.description.clone(),
        start: event.start,
        end: event.end,
        excess_minutes: event.excess_minutes,
    }
}
