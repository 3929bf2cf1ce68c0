use clap::Parser;
use sprint_tracker::cli::Cli;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = sprint_tracker::run(cli) {
        eprintln!("Application error: {e}");
        process::exit(1);
    }
}
