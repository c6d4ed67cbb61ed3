use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "beamtrace CLI - Propagate the statistical moments of a particle bunch through an accelerator beamline lattice.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a lattice description and print the assembled machine.
    Show(ShowArgs),
    /// Track a bunch state through a lattice and print the final state.
    Track(TrackArgs),
}

/// Arguments for the `show` subcommand.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Path to the lattice description file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub lattice: PathBuf,
}

/// Arguments for the `track` subcommand.
#[derive(Args, Debug)]
pub struct TrackArgs {
    /// Path to the lattice description file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub lattice: PathBuf,

    /// Path to an initial-state description in TOML format.
    /// Defaults to the simulation family's built-in initial state.
    #[arg(short, long, value_name = "PATH")]
    pub initial: Option<PathBuf>,

    /// Index of the first element to track through.
    #[arg(long, value_name = "INT", default_value_t = 0)]
    pub start: usize,

    /// Maximum number of propagation steps. Unbounded when omitted.
    #[arg(long, value_name = "INT")]
    pub max: Option<usize>,
}
