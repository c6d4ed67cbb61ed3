use beamtrace::Machine;
use tracing::info;

use crate::cli::ShowArgs;
use crate::commands::load_config;
use crate::error::Result;

pub fn run(args: ShowArgs) -> Result<()> {
    info!("Loading lattice from {:?}", &args.lattice);
    let config = load_config(&args.lattice)?;
    let machine = Machine::from_config(&config)?;
    print!("{machine}");
    Ok(())
}
