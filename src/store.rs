//! JSON-file backed persistence.
//!
//! Every store is read in full once and rewritten in full after each mutation.
//! Read failures fall back to an empty store, write failures are logged and the
//! in-memory state stays usable.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::ics::resolve_timezone;
use crate::models::{EventKey, LocalEvent, SprintWindow, DEFAULT_TIMEZONE};

pub const CONFIG_FILE: &str = "config.json";
pub const EXCESS_MINUTES_FILE: &str = "excess_minutes.json";
pub const LOCAL_EVENTS_FILE: &str = "local_events.json";
pub const TASKS_FILE: &str = "tasks.json";

/// Locations of the four store files inside one data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub config: PathBuf,
    pub annotations: PathBuf,
    pub local_events: PathBuf,
    pub tasks: PathBuf,
}

impl DataPaths {
    pub fn in_dir(dir: &Path) -> Self {
        DataPaths {
            config: dir.join(CONFIG_FILE),
            annotations: dir.join(EXCESS_MINUTES_FILE),
            local_events: dir.join(LOCAL_EVENTS_FILE),
            tasks: dir.join(TASKS_FILE),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let loaded = fs::read_to_string(path)
        .map_err(TrackerError::from)
        .and_then(|text| serde_json::from_str(&text).map_err(TrackerError::from));
    match loaded {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), "could not load, starting empty: {e}");
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> TrackerResult<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)?;
    debug!(path = %path.display(), "saved");
    Ok(())
}

fn persist<T: Serialize>(path: &Path, value: &T) {
    if let Err(e) = write_json(path, value) {
        warn!(path = %path.display(), "could not save: {e}");
    }
}

/// Persisted application settings.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_date: Option<NaiveDate>,
    /// IANA name of the display timezone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Self {
        read_json(path).unwrap_or_default()
    }

    pub fn save(&self, path: &Path) {
        persist(path, self);
    }

    pub fn display_timezone(&self) -> Tz {
        match self.timezone.as_deref() {
            Some(name) => resolve_timezone(name).unwrap_or_else(|| {
                warn!(timezone = name, "unknown timezone in config, using {DEFAULT_TIMEZONE}");
                DEFAULT_TIMEZONE
            }),
            None => DEFAULT_TIMEZONE,
        }
    }
}

/// Excess minutes keyed by calendar event identity.
#[derive(Debug)]
pub struct AnnotationStore {
    path: PathBuf,
    entries: BTreeMap<EventKey, u32>,
    // Keys that do not parse are carried through rewrites untouched.
    unparsed: BTreeMap<String, u32>,
}

impl AnnotationStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let raw: BTreeMap<String, u32> = read_json(&path).unwrap_or_default();

        let mut entries = BTreeMap::new();
        let mut unparsed = BTreeMap::new();
        for (key, minutes) in raw {
            match key.parse::<EventKey>() {
                Ok(parsed) => {
                    entries.insert(parsed, minutes);
                }
                Err(e) => {
                    warn!("keeping unrecognised annotation key as is: {e}");
                    unparsed.insert(key, minutes);
                }
            }
        }

        AnnotationStore {
            path,
            entries,
            unparsed,
        }
    }

    /// Excess minutes for `key`, 0 when never annotated.
    pub fn get(&self, key: &EventKey) -> u32 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    pub fn set(&mut self, key: EventKey, minutes: u32) {
        self.entries.insert(key, minutes);
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.unparsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn persist(&self) {
        let mut raw = self.unparsed.clone();
        raw.extend(self.entries.iter().map(|(k, v)| (k.to_string(), *v)));
        persist(&self.path, &raw);
    }
}

/// Manually entered events, independent of any calendar feed.
#[derive(Debug)]
pub struct LocalEventStore {
    path: PathBuf,
    events: Vec<LocalEvent>,
}

impl LocalEventStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let events = read_json(&path).unwrap_or_default();
        LocalEventStore { path, events }
    }

    pub fn events(&self) -> &[LocalEvent] {
        &self.events
    }

    pub fn add(&mut self, event: LocalEvent) {
        self.events.push(event);
        self.persist();
    }

    /// Remove the first event in the same slot. Returns whether one was found.
    pub fn remove(&mut self, event: &LocalEvent) -> bool {
        match self.events.iter().position(|e| e.same_slot(event)) {
            Some(index) => {
                self.events.remove(index);
                self.persist();
                true
            }
            None => false,
        }
    }

    pub fn set_excess(&mut self, event: &LocalEvent, minutes: u32) -> bool {
        match self.events.iter_mut().find(|e| e.same_slot(event)) {
            Some(found) => {
                found.excess_minutes = minutes;
                self.persist();
                true
            }
            None => false,
        }
    }

    /// Events starting inside `window`, by start.
    pub fn in_window(&self, window: &SprintWindow) -> Vec<&LocalEvent> {
        let mut events: Vec<_> = self
            .events
            .iter()
            .filter(|e| crate::filter::local_in_window(e, window))
            .collect();
        events.sort_by_key(|e| e.start);
        events
    }

    pub fn persist(&self) {
        persist(&self.path, &self.events);
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub text: String,
    pub date: NaiveDate,
}

/// Sprint deliverables, kept alongside the events but never aggregated.
#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    tasks: Vec<Task>,
}

impl TaskStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tasks = read_json(&path).unwrap_or_default();
        TaskStore { path, tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn add(&mut self, text: &str, date: NaiveDate) -> TrackerResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TrackerError::Validation("task text must not be empty".to_string()));
        }
        self.tasks.push(Task {
            text: text.to_string(),
            date,
        });
        persist(&self.path, &self.tasks);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> TrackerResult<Task> {
        if index >= self.tasks.len() {
            return Err(TrackerError::Validation(format!("no task at index {index}")));
        }
        let task = self.tasks.remove(index);
        persist(&self.path, &self.tasks);
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone, Utc};

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_annotation_round_trip_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EXCESS_MINUTES_FILE);
        let key = EventKey::new(
            Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
            "Review",
            DEFAULT_TIMEZONE,
        );

        let mut store = AnnotationStore::load(&path);
        assert_eq!(store.get(&key), 0);
        store.set(key.clone(), 15);
        assert_eq!(store.get(&key), 15);

        let reloaded = AnnotationStore::load(&path);
        assert_eq!(reloaded.get(&key), 15);

        let raw: BTreeMap<String, u32> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.get("202403100900_Review"), Some(&15));
    }

    #[test]
    fn test_annotation_lookup_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AnnotationStore::load(dir.path().join(EXCESS_MINUTES_FILE));
        let start = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        store.set(EventKey::new(start, "Review", DEFAULT_TIMEZONE), 15);

        assert_eq!(store.get(&EventKey::new(start, "review", DEFAULT_TIMEZONE)), 0);
        assert_eq!(store.get(&EventKey::new(start, "Review ", DEFAULT_TIMEZONE)), 0);
    }

    #[test]
    fn test_unrecognised_annotation_keys_survive_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EXCESS_MINUTES_FILE);
        fs::write(&path, r#"{"legacy key": 7, "202403100900_Review": 3}"#).unwrap();

        let mut store = AnnotationStore::load(&path);
        assert_eq!(store.len(), 2);
        store.set("202403110900_Retro".parse().unwrap(), 4);

        let raw: BTreeMap<String, u32> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw.get("legacy key"), Some(&7));
    }

    #[test]
    fn test_corrupt_files_degrade_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::in_dir(dir.path());
        for path in [&paths.config, &paths.annotations, &paths.local_events, &paths.tasks] {
            fs::write(path, "{not json").unwrap();
        }

        assert_eq!(AppConfig::load(&paths.config), AppConfig::default());
        assert!(AnnotationStore::load(&paths.annotations).is_empty());
        assert!(LocalEventStore::load(&paths.local_events).events().is_empty());
        assert!(TaskStore::load(&paths.tasks).tasks().is_empty());
    }

    #[test]
    fn test_write_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join(LOCAL_EVENTS_FILE);
        let mut store = LocalEventStore::load(&path);
        store.add(LocalEvent::new("Planning", at(1, 9, 0), at(1, 10, 0), 0).unwrap());
        assert_eq!(store.events().len(), 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_local_events_persist_and_mutate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_EVENTS_FILE);
        let planning = LocalEvent::new("Planning", at(4, 9, 0), at(4, 10, 0), 0).unwrap();
        let demo = LocalEvent::new("Demo", at(20, 14, 0), at(20, 15, 0), 5).unwrap();

        let mut store = LocalEventStore::load(&path);
        store.add(planning.clone());
        store.add(demo.clone());
        assert!(store.set_excess(&planning, 20));

        let mut reloaded = LocalEventStore::load(&path);
        assert_eq!(reloaded.events().len(), 2);
        assert_eq!(reloaded.events()[0].excess_minutes, 20);

        let window = SprintWindow::sprint(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let visible: Vec<_> = reloaded.in_window(&window).into_iter().cloned().collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].description, "Planning");

        assert!(reloaded.remove(&demo));
        assert!(!reloaded.remove(&demo));
        assert_eq!(LocalEventStore::load(&path).events().len(), 1);
    }

    #[test]
    fn test_config_round_trip_and_timezone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = AppConfig {
            url: "calendar.example.com/feed.ics".to_string(),
            last_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            timezone: None,
        };
        config.save(&path);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"url": "calendar.example.com/feed.ics", "last_date": "2024-01-01"})
        );

        let loaded = AppConfig::load(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.display_timezone(), DEFAULT_TIMEZONE);

        let zoned = AppConfig {
            timezone: Some("Europe/Lisbon".to_string()),
            ..loaded
        };
        assert_eq!(zoned.display_timezone(), Tz::Europe__Lisbon);
    }

    #[test]
    fn test_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TASKS_FILE);
        let date = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();

        let mut store = TaskStore::load(&path);
        assert!(matches!(store.add("  ", date), Err(TrackerError::Validation(_))));
        store.add("Ship release notes", date).unwrap();
        store.add("Update roadmap", date).unwrap();

        let mut reloaded = TaskStore::load(&path);
        assert_eq!(reloaded.tasks().len(), 2);
        let removed = reloaded.remove(0).unwrap();
        assert_eq!(removed.text, "Ship release notes");
        assert!(reloaded.remove(5).is_err());
        assert_eq!(TaskStore::load(&path).tasks().len(), 1);
    }
}
