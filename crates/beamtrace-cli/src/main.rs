mod cli;
mod commands;
mod error;
mod logging;

use clap::Parser;
use tracing::{debug, error, info};

use crate::cli::{Cli, Commands};
use crate::error::Result;

fn main() {
    if let Err(e) = run_app() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone())?;

    info!("beamtrace v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let command_result = match cli.command {
        Commands::Show(args) => {
            info!("Dispatching to 'show' command.");
            commands::show::run(args)
        }
        Commands::Track(args) => {
            info!("Dispatching to 'track' command.");
            commands::track::run(args)
        }
    };

    if let Err(e) = &command_result {
        error!("Command failed: {e}");
    }
    command_result
}
