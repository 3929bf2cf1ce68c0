pub mod cli;
pub mod error;
pub mod export;
pub mod filter;
pub mod ics;
pub mod merge;
pub mod models;
pub mod recurrence;
pub mod source;
pub mod store;
pub mod tracker;

use std::fs::File;
use std::io::BufWriter;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

use crate::cli::{Cli, Command, LoadArgs, TaskCommand};
pub use crate::error::{TrackerError, TrackerResult};
use crate::models::{format_minutes, parse_time_of_day, LocalEvent, SprintWindow};
use crate::source::CalendarSource;
use crate::store::{AnnotationStore, AppConfig, DataPaths, LocalEventStore, TaskStore};
pub use crate::tracker::Tracker;

/// Decide the calendar source and window for a load from the arguments and saved config.
pub fn resolve_load(args: &LoadArgs, config: &AppConfig, tz: Tz) -> TrackerResult<(Option<CalendarSource>, SprintWindow)> {
    let source = match (&args.file, &args.url) {
        (Some(path), _) => Some(CalendarSource::File(path.clone())),
        (None, Some(url)) if !url.trim().is_empty() => Some(CalendarSource::Url(url.trim().to_string())),
        (None, _) if !config.url.trim().is_empty() => Some(CalendarSource::Url(config.url.trim().to_string())),
        _ => None,
    };

    let start = args
        .date
        .or(config.last_date)
        .unwrap_or_else(|| today(tz));
    let window = match args.end {
        Some(end) => SprintWindow::new(start, end)?,
        None => SprintWindow::sprint(start),
    };
    Ok((source, window))
}

fn today(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

fn load_sprint(tracker: &mut Tracker, config: &mut AppConfig, paths: &DataPaths, args: &LoadArgs) -> TrackerResult<()> {
    let (source, window) = resolve_load(args, config, tracker.timezone())?;
    tracker.load(source.as_ref(), window)?;

    if let Some(CalendarSource::Url(url)) = &source {
        config.url = url.clone();
    }
    config.last_date = Some(window.start);
    config.save(&paths.config);
    Ok(())
}

fn print_events(tracker: &Tracker) {
    if let Some(window) = tracker.window() {
        println!("Sprint {} .. {}", window.start, window.end);
    }
    for (index, event) in tracker.events().iter().enumerate() {
        println!(
            "{index:>3} [{}] {} {}-{} {:>6} +{:<3} {:<8} {}",
            if event.selected { "x" } else { " " },
            event.start.format("%Y-%m-%d"),
            event.start.format("%H:%M"),
            event.end.format("%H:%M"),
            format_minutes(event.base_minutes),
            event.excess_minutes,
            event.origin.tag(),
            event.description
        );
    }
    let totals = tracker.selected_totals();
    println!(
        "Selected: {} | Total: {} | Excess: {} | Total with excess: {}",
        totals.selected_count,
        format_minutes(totals.base_minutes),
        format_minutes(totals.excess_minutes),
        format_minutes(totals.total_minutes)
    );
}

pub fn run(cli: Cli) -> TrackerResult<()> {
    let paths = DataPaths::in_dir(&cli.data_dir);
    let mut config = AppConfig::load(&paths.config);
    let mut tracker = Tracker::new(
        config.display_timezone(),
        AnnotationStore::load(&paths.annotations),
        LocalEventStore::load(&paths.local_events),
    );

    match cli.command {
        Command::List { load } => {
            load_sprint(&mut tracker, &mut config, &paths, &load)?;
            print_events(&tracker);
        }
        Command::Excess {
            load,
            index,
            minutes,
        } => {
            load_sprint(&mut tracker, &mut config, &paths, &load)?;
            tracker.set_excess(index, minutes)?;
            print_events(&tracker);
        }
        Command::Add {
            description,
            date,
            start,
            end,
            end_date,
            excess,
        } => {
            let start = date.and_time(parse_time_of_day(&start)?);
            let end = end_date.unwrap_or(date).and_time(parse_time_of_day(&end)?);
            let event = LocalEvent::new(&description, start, end, excess)?;
            println!("Added local event '{}'", event.description);
            tracker.add_local(event);
        }
        Command::Remove { load, index } => {
            load_sprint(&mut tracker, &mut config, &paths, &load)?;
            let removed = tracker.remove_local(index)?;
            println!("Removed local event '{}'", removed.description);
        }
        Command::Export { load, output, only } => {
            load_sprint(&mut tracker, &mut config, &paths, &load)?;
            if !only.is_empty() {
                for index in 0..tracker.events().len() {
                    tracker.set_selected(index, only.contains(&index))?;
                }
            }
            let rows = export::rows(tracker.events());
            if rows.is_empty() {
                return Err(TrackerError::Validation("no events selected for export".to_string()));
            }
            export::write_csv(&rows, BufWriter::new(File::create(&output)?))?;
            println!("Exported {} events to {}", rows.len(), output.display());
        }
        Command::Tasks { command } => {
            let mut tasks = TaskStore::load(&paths.tasks);
            match command {
                TaskCommand::List => {
                    for (index, task) in tasks.tasks().iter().enumerate() {
                        println!("{index:>3} {} {}", task.date, task.text);
                    }
                }
                TaskCommand::Add { text, date } => tasks.add(&text, date)?,
                TaskCommand::Remove { index } => {
                    let task = tasks.remove(index)?;
                    println!("Removed task '{}'", task.text);
                }
            }
        }
    }

    Ok(())
}
