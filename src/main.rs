use std::env::consts::{ARCH, FAMILY, OS};
use std::path::Path;

use anyhow::Error;
use clap::Parser;
use tracing::trace;
use tracing_appender::non_blocking::WorkerGuard;

use crate::config_loader::{init_config, AppConfig};
use crate::program::{Cli, Program};

mod config_loader;
mod download_engine;
mod hash_ledger;
mod logger;
mod program;
mod reddit;
mod viewer;

#[cfg(test)]
mod tests;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    let config_manager = init_config(&cli.config_dir)?;
    let app_config = config_manager.get_app_config();

    // Dropping the guard flushes the log file
    let _guard = initialize_logger(&app_config);
    for notice in config_manager.notices() {
        notice.log();
    }
    log_system_information();

    let program = Program::new(cli, app_config);
    program.run().await
}

/// Initializes logging, continuing without a log file if it cannot be set up.
fn initialize_logger(app_config: &AppConfig) -> Option<WorkerGuard> {
    let log_dir = Path::new(&app_config.paths.log_directory);
    match logger::init_logger(&app_config.logging, log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logger: {}. Continuing without logs.", e);
            None
        }
    }
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
