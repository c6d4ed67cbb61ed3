//! # Moment Module
//!
//! The moment-matrix simulation family: a bunch is represented by the first
//! and second statistical moments of its phase-space distribution (a mean
//! vector and a covariance matrix), and each lattice element transports both
//! through a linear transfer matrix.
//!
//! ## Overview
//!
//! The family registers itself under the simulation-type name
//! [`SIM_TYPE`] (`"MomentMatrix"`) with ten element kinds: `source`, `marker`,
//! `drift`, `sbend`, `quadrupole`, `solenoid`, `rfcavity`, `stripper`,
//! `edipole`, and `generic`. The phase space is seven-dimensional: the six
//! canonical coordinates plus a homogeneous column that lets misalignment
//! offsets act through the same matrix product.
//!
//! - **State** ([`state`]) - [`state::MomentState`]: position, kinetic energy,
//!   synchronous phase, relativistic γ/β, mean vector, covariance matrix.
//! - **Element core** ([`element`]) - [`element::MomentElementBase`]: shared
//!   transfer-matrix application, misalignment correction, and the
//!   energy-keyed recompute cache.
//! - **Element kinds** ([`elements`]) - one type per physical component, each
//!   deriving its raw transfer matrix at construction.

pub mod element;
pub mod elements;
pub mod state;

use std::sync::Once;

use nalgebra::{SMatrix, SVector};

use crate::engine::error::EngineError;

pub use element::MomentElementBase;
pub use state::MomentState;

/// Simulation-type name this family registers under.
pub const SIM_TYPE: &str = "MomentMatrix";

/// Number of phase-space coordinates: six canonical plus one homogeneous.
pub const PHASE_SPACE_DIM: usize = 7;

/// A transfer or misalignment matrix over the full phase space.
pub type TransferMatrix = SMatrix<f64, PHASE_SPACE_DIM, PHASE_SPACE_DIM>;

/// A covariance matrix over the full phase space.
pub type CovarianceMatrix = SMatrix<f64, PHASE_SPACE_DIM, PHASE_SPACE_DIM>;

/// A mean (first-moment) vector over the full phase space.
pub type MomentVector = SVector<f64, PHASE_SPACE_DIM>;

/// Phase-space coordinate indices.
pub mod coord {
    /// Horizontal position.
    pub const X: usize = 0;
    /// Horizontal momentum.
    pub const PX: usize = 1;
    /// Vertical position.
    pub const Y: usize = 2;
    /// Vertical momentum.
    pub const PY: usize = 3;
    /// Longitudinal position.
    pub const S: usize = 4;
    /// Longitudinal momentum.
    pub const PS: usize = 5;
}

static REGISTER: Once = Once::new();

/// Installs the moment-matrix family into the process-wide registry.
///
/// Idempotent; [`Machine::from_config`](crate::engine::machine::Machine::from_config)
/// calls it before resolving any lattice, so explicit calls are only needed
/// when talking to the registry directly.
pub fn register() {
    REGISTER.call_once(elements::register_family);
}

/// Copies `values` onto the leading entries of a mean vector.
pub(crate) fn overlay_vector(
    target: &mut MomentVector,
    values: &[f64],
    what: &'static str,
) -> Result<(), EngineError> {
    if values.len() > PHASE_SPACE_DIM {
        return Err(EngineError::TooLarge {
            what,
            got: values.len(),
            max: PHASE_SPACE_DIM,
        });
    }
    for (slot, value) in target.iter_mut().zip(values) {
        *slot = *value;
    }
    Ok(())
}

/// Copies `values`, interpreted row-major, onto the leading entries of a
/// phase-space matrix.
pub(crate) fn overlay_matrix(
    target: &mut TransferMatrix,
    values: &[f64],
    what: &'static str,
) -> Result<(), EngineError> {
    if values.len() > PHASE_SPACE_DIM * PHASE_SPACE_DIM {
        return Err(EngineError::TooLarge {
            what,
            got: values.len(),
            max: PHASE_SPACE_DIM * PHASE_SPACE_DIM,
        });
    }
    for (i, value) in values.iter().enumerate() {
        target[(i / PHASE_SPACE_DIM, i % PHASE_SPACE_DIM)] = *value;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_vector_fills_the_prefix() {
        let mut mean = MomentVector::zeros();
        overlay_vector(&mut mean, &[1.0, 2.0, 3.0], "moment0").unwrap();
        assert_eq!(mean[0], 1.0);
        assert_eq!(mean[2], 3.0);
        assert_eq!(mean[3], 0.0);
    }

    #[test]
    fn overlay_vector_rejects_oversize_input() {
        let mut mean = MomentVector::zeros();
        let err = overlay_vector(&mut mean, &[0.0; 8], "moment0").unwrap_err();
        assert!(matches!(
            err,
            EngineError::TooLarge {
                what: "moment0",
                got: 8,
                max: 7,
            }
        ));
    }

    #[test]
    fn overlay_matrix_is_row_major() {
        let mut matrix = TransferMatrix::identity();
        let mut values = vec![0.0; 9];
        values[8] = 5.0; // row 1, column 1
        overlay_matrix(&mut matrix, &values, "initial").unwrap();
        assert_eq!(matrix[(0, 0)], 0.0);
        assert_eq!(matrix[(0, 6)], 0.0);
        assert_eq!(matrix[(1, 0)], 0.0);
        assert_eq!(matrix[(1, 1)], 5.0);
        // untouched past the prefix
        assert_eq!(matrix[(2, 2)], 1.0);
    }

    #[test]
    fn overlay_matrix_rejects_oversize_input() {
        let mut matrix = TransferMatrix::identity();
        let err = overlay_matrix(&mut matrix, &[0.0; 50], "transfer").unwrap_err();
        assert!(matches!(
            err,
            EngineError::TooLarge {
                what: "transfer",
                got: 50,
                max: 49,
            }
        ));
    }
}
