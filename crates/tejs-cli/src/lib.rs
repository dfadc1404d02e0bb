pub mod cli;
pub mod commands;

use clap::Parser;
use cli::Tejs;
use commands::handle_command;
use std::process;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter, e.g. `TEJS_LOG=debug`.
pub const LOG_ENV: &str = "TEJS_LOG";

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    // Logs go to stderr; stdout carries expansion output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the tejs CLI application
pub fn run_main() {
    let args = Tejs::parse();
    init_logging(args.verbose);

    if let Err(e) = handle_command(args) {
        // Already shown to the user by the reporter.
        if !e.is_already_reported() {
            eprintln!("Error: {}", e);
        }
        process::exit(1);
    }
}
