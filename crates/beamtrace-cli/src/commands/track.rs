use beamtrace::{ArrayView, BunchState, Config, Machine};
use tracing::{debug, info};

use crate::cli::TrackArgs;
use crate::commands::load_config;
use crate::error::Result;

pub fn run(args: TrackArgs) -> Result<()> {
    info!("Loading lattice from {:?}", &args.lattice);
    let config = load_config(&args.lattice)?;
    let machine = Machine::from_config(&config)?;

    let initial = match &args.initial {
        Some(path) => {
            info!("Loading initial state from {:?}", path);
            load_config(path)?
        }
        None => Config::new(),
    };
    let mut state = machine.alloc_state(&initial)?;

    let max = args.max.unwrap_or(usize::MAX);
    info!(
        "Tracking through {} element(s), starting at {}.",
        machine.len(),
        args.start
    );
    machine.propagate_observed(&mut *state, args.start, max, |index, _state| {
        debug!(index, "element advanced");
    })?;

    println!("Final state:");
    print_state(&*state);
    Ok(())
}

/// Renders every introspectable field of a state, in its stable order.
fn print_state(state: &dyn BunchState) {
    let mut index = 0;
    while let Some(array) = state.get_array(index) {
        match array.view {
            ArrayView::Scalar(value) => println!("{} = {}", array.name, value),
            ArrayView::Vector(values) => println!("{} = {}", array.name, render_row(values)),
            ArrayView::Matrix { rows, cols, data } => {
                println!("{} =", array.name);
                // column-major data, printed row by row
                for r in 0..rows {
                    let row: Vec<f64> = (0..cols).map(|c| data[c * rows + r]).collect();
                    println!("  {}", render_row(&row));
                }
            }
        }
        index += 1;
    }
}

fn render_row(values: &[f64]) -> String {
    let rendered: Vec<String> = values.iter().map(|v| format!("{v:.6e}")).collect();
    format!("[{}]", rendered.join(", "))
}
