use std::any::Any;
use std::fmt;

use crate::core::config::Config;
use crate::engine::error::EngineError;
use crate::engine::state::{ArrayView, BunchState, StateArray};
use crate::moment::{CovarianceMatrix, MomentVector, overlay_matrix, overlay_vector};

/// The statistical state of a bunch: first and second moments of its
/// phase-space distribution, plus the longitudinal bookkeeping the transport
/// elements advance alongside them.
///
/// γ and β are derived from the kinetic and rest energies at construction and
/// are not re-derived when an element changes the kinetic energy afterwards;
/// elements that need fresh values read them before applying their own energy
/// update.
#[derive(Debug, Clone)]
pub struct MomentState {
    /// Next-element cursor; maintained by the propagation loop.
    pub next_element: usize,
    /// Accumulated path length, in m.
    pub position: f64,
    /// Kinetic energy of the synchronous particle.
    pub kinetic_energy: f64,
    /// Synchronous phase.
    pub sync_phase: f64,
    /// Rest energy the relativistic factors were derived against.
    pub rest_energy: f64,
    /// Lorentz factor, `(kinetic + rest) / rest`.
    pub gamma: f64,
    /// Velocity fraction, `sqrt(1 + 1/gamma^2)`.
    pub beta: f64,
    /// First moment: the bunch centroid.
    pub mean: MomentVector,
    /// Second moment: the bunch covariance. Symmetric in valid physical
    /// states; the sandwich transform preserves this.
    pub covariance: CovarianceMatrix,
}

impl MomentState {
    /// Builds a state from configuration.
    ///
    /// Recognized keys, all optional: `L` (initial position, default 0),
    /// `IonEk` (kinetic energy, default 0), `IonFy` (synchronous phase,
    /// default 0), `Es` (rest energy, default 1), `moment0` (prefix of the
    /// mean vector, zeros beyond), and `initial` (row-major prefix of the
    /// covariance matrix, identity beyond).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TooLarge`] if `moment0` exceeds 7 entries or
    /// `initial` exceeds 49, and a wrong-type configuration error if either
    /// is present but not a double vector.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let mut mean = MomentVector::zeros();
        if config.has("moment0") {
            let values: Vec<f64> = config.get("moment0")?;
            overlay_vector(&mut mean, &values, "moment0")?;
        }

        let mut covariance = CovarianceMatrix::identity();
        if config.has("initial") {
            let values: Vec<f64> = config.get("initial")?;
            overlay_matrix(&mut covariance, &values, "initial")?;
        }

        let kinetic_energy = config.get_or("IonEk", 0.0);
        let rest_energy = config.get_or("Es", 1.0);
        let gamma = (kinetic_energy + rest_energy) / rest_energy;
        let beta = (1.0 + 1.0 / (gamma * gamma)).sqrt();

        Ok(Self {
            next_element: 0,
            position: config.get_or("L", 0.0),
            kinetic_energy,
            sync_phase: config.get_or("IonFy", 0.0),
            rest_energy,
            gamma,
            beta,
            mean,
            covariance,
        })
    }
}

impl BunchState for MomentState {
    fn next_element(&self) -> usize {
        self.next_element
    }

    fn set_next_element(&mut self, index: usize) {
        self.next_element = index;
    }

    fn clone_state(&self) -> Box<dyn BunchState> {
        Box::new(self.clone())
    }

    fn assign(&mut self, other: &dyn BunchState) -> Result<(), EngineError> {
        let other = other.as_any().downcast_ref::<MomentState>().ok_or(
            EngineError::IncompatibleState {
                expected: "moment state",
            },
        )?;
        self.position = other.position;
        self.kinetic_energy = other.kinetic_energy;
        self.sync_phase = other.sync_phase;
        self.rest_energy = other.rest_energy;
        self.gamma = other.gamma;
        self.beta = other.beta;
        self.mean = other.mean;
        self.covariance = other.covariance;
        Ok(())
    }

    fn get_array(&self, index: usize) -> Option<StateArray<'_>> {
        let array = match index {
            0 => StateArray {
                name: "covariance",
                view: ArrayView::Matrix {
                    rows: self.covariance.nrows(),
                    cols: self.covariance.ncols(),
                    data: self.covariance.as_slice(),
                },
            },
            1 => StateArray {
                name: "moment0",
                view: ArrayView::Vector(self.mean.as_slice()),
            },
            2 => StateArray {
                name: "position",
                view: ArrayView::Scalar(self.position),
            },
            3 => StateArray {
                name: "kinetic_energy",
                view: ArrayView::Scalar(self.kinetic_energy),
            },
            4 => StateArray {
                name: "sync_phase",
                view: ArrayView::Scalar(self.sync_phase),
            },
            5 => StateArray {
                name: "gamma",
                view: ArrayView::Scalar(self.gamma),
            },
            6 => StateArray {
                name: "beta",
                view: ArrayView::Scalar(self.beta),
            },
            _ => return None,
        };
        Some(array)
    }

    fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "State: pos={} energy={} phase={} gamma={} beta={}",
            self.position, self.kinetic_energy, self.sync_phase, self.gamma, self.beta
        )?;
        write!(out, "moment0: [")?;
        for (i, v) in self.mean.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            write!(out, "{v}")?;
        }
        writeln!(out, "]")?;
        writeln!(out, "covariance:")?;
        for row in self.covariance.row_iter() {
            write!(out, " ")?;
            for v in row.iter() {
                write!(out, " {v}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
