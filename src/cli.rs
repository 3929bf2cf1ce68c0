use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sprint_tracker",
    version,
    about = "Track time spent in calendar and local events over a sprint"
)]
pub struct Cli {
    /// Directory holding config.json and the event stores
    #[arg(long, global = true, default_value = ".")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Where and which sprint to load. Unset values fall back to the saved config.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadArgs {
    /// Calendar feed URL (https:// is assumed when no scheme is given)
    #[arg(long, conflicts_with = "file")]
    pub url: Option<String>,

    /// Read the calendar from a local .ics file instead of a URL
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// First day of the sprint (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Last day of the sprint; defaults to 13 days after the first
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the sprint and list its events with totals
    List {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Set the excess minutes of a listed event
    Excess {
        #[command(flatten)]
        load: LoadArgs,
        index: usize,
        minutes: u32,
    },
    /// Add a local event
    Add {
        description: String,
        /// Day of the event (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Start time (HH:MM)
        #[arg(long, default_value = "09:00")]
        start: String,
        /// End time (HH:MM)
        #[arg(long, default_value = "10:00")]
        end: String,
        /// Day the event ends, when not the same day
        #[arg(long)]
        end_date: Option<NaiveDate>,
        #[arg(long, default_value_t = 0)]
        excess: u32,
    },
    /// Remove a listed local event
    Remove {
        #[command(flatten)]
        load: LoadArgs,
        index: usize,
    },
    /// Export events to a semicolon separated CSV file
    Export {
        #[command(flatten)]
        load: LoadArgs,
        #[arg(long, short)]
        output: PathBuf,
        /// Comma separated list indices to export; all events when omitted
        #[arg(long, value_delimiter = ',')]
        only: Vec<usize>,
    },
    /// Manage sprint deliverables
    Tasks {
        #[command(subcommand)]
        command: TaskCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    List,
    Add {
        text: String,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },
    Remove {
        index: usize,
    },
}
