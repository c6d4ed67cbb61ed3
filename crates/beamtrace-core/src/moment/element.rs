use std::f64::consts::PI;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use nalgebra::linalg::LU;

use crate::core::config::Config;
use crate::core::constants::{M_TO_MM, SPEED_OF_LIGHT};
use crate::engine::element::ElementContext;
use crate::engine::error::EngineError;
use crate::engine::state::BunchState;
use crate::moment::state::MomentState;
use crate::moment::{TransferMatrix, coord, overlay_matrix};

/// Energy-dependent entries of an element's transfer matrix, recomputed only
/// when the incoming kinetic energy changes.
///
/// `last_energy_in` is seeded with NaN so the first `advance` always
/// recomputes. `recomputes` counts cache refills and exists for tests and
/// instrumentation.
#[derive(Debug, Clone)]
pub(crate) struct TransferCache {
    /// Transfer matrix before misalignment correction.
    pub raw: TransferMatrix,
    /// Effective transfer matrix, `misalign * raw * misalign^-1`.
    pub transfer: TransferMatrix,
    pub last_energy_in: f64,
    pub last_energy_out: f64,
    pub recomputes: u64,
}

/// Shared core of every moment-matrix element.
///
/// Holds the construction-time parameters (length, sampling length, phase
/// factor, rest energy), the misalignment pair, and the transfer cache. The
/// element kinds in [`super::elements`] wrap one of these, seed its raw
/// matrix at construction, and delegate `advance` here unless they override
/// the transport wholesale.
///
/// The cache is the only mutable part of an element after construction. The
/// mutex is held exactly for the recompute-and-copy, so sharing a machine
/// across threads serializes concurrent `advance` calls on one element only
/// during cache maintenance.
#[derive(Debug)]
pub struct MomentElementBase {
    name: String,
    index: usize,
    config: Config,
    /// Element length, in m.
    pub(crate) length: f64,
    /// RF sampling wavelength, in mm.
    pub(crate) sampling_length: f64,
    /// Per-pass synchronous-phase increment before the 1/β factor.
    pub(crate) phase_factor: f64,
    /// Rest energy used in the longitudinal phase-slip term.
    pub(crate) rest_energy: f64,
    pub(crate) misalign: TransferMatrix,
    pub(crate) misalign_inv: TransferMatrix,
    pub(crate) cache: Mutex<TransferCache>,
}

impl MomentElementBase {
    /// Builds the shared core from an element's construction context.
    ///
    /// Reads `L` (length in m, default 0), `Frf` (RF frequency, required),
    /// `IonEs` (rest energy, required), and the optional `misalign` key, a
    /// row-major prefix of the misalignment matrix overlaid onto identity.
    /// The misalignment inverse is computed once here, by LU factorization.
    ///
    /// # Errors
    ///
    /// Returns configuration errors for missing or mistyped keys,
    /// [`EngineError::TooLarge`] for an oversize `misalign`, and
    /// [`EngineError::SingularMatrix`] when the misalignment cannot be
    /// inverted.
    pub fn from_context(context: ElementContext) -> Result<Self, EngineError> {
        let ElementContext {
            name,
            index,
            config,
        } = context;

        let length = config.get_or("L", 0.0);
        let frequency: f64 = config.get("Frf")?;
        let sampling_length = SPEED_OF_LIGHT / frequency * M_TO_MM;
        let phase_factor = length * 2.0 * PI / sampling_length;
        let rest_energy: f64 = config.get("IonEs")?;

        let mut misalign = TransferMatrix::identity();
        if config.has("misalign") {
            let values: Vec<f64> = config.get("misalign")?;
            overlay_matrix(&mut misalign, &values, "misalign")?;
        }
        let misalign_inv =
            LU::new(misalign)
                .try_inverse()
                .ok_or(EngineError::SingularMatrix {
                    what: "misalignment",
                })?;

        Ok(Self {
            name,
            index,
            config,
            length,
            sampling_length,
            phase_factor,
            rest_energy,
            misalign,
            misalign_inv,
            cache: Mutex::new(TransferCache {
                raw: TransferMatrix::identity(),
                transfer: TransferMatrix::identity(),
                // NaN spoils the first energy comparison
                last_energy_in: f64::NAN,
                last_energy_out: f64::NAN,
                recomputes: 0,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Element length, in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Number of transfer-matrix recomputations performed so far.
    pub fn recompute_count(&self) -> u64 {
        self.lock_cache().recomputes
    }

    /// Mutates the raw transfer matrix; element constructors use this to seed
    /// their kind-specific entries before the element is shared.
    pub(crate) fn set_raw(&mut self, seed: impl FnOnce(&mut TransferMatrix)) {
        let cache = self
            .cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        seed(&mut cache.raw);
    }

    /// Zeroes the length-derived parameters; used by zero-extent elements.
    pub(crate) fn clear_length(&mut self) {
        self.length = 0.0;
        self.phase_factor = 0.0;
    }

    pub(crate) fn lock_cache(&self) -> std::sync::MutexGuard<'_, TransferCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The longitudinal phase-slip entry for the current relativistic factors.
    pub(crate) fn phase_slip(&self, beta: f64, gamma: f64) -> f64 {
        let bg = beta * gamma;
        -2.0 * PI / (self.sampling_length * self.rest_energy * bg.powi(3)) * self.length
    }

    /// Default transport: refresh the cached matrix if the incoming kinetic
    /// energy changed, then apply it to the state's moments and advance the
    /// longitudinal bookkeeping. Passive with respect to energy.
    pub fn advance(&self, state: &mut dyn BunchState) -> Result<(), EngineError> {
        let state = state_of(state)?;

        let (transfer, energy_out) = {
            let mut cache = self.lock_cache();
            if state.kinetic_energy != cache.last_energy_in {
                let slip = self.phase_slip(state.beta, state.gamma);
                cache.raw[(coord::S, coord::PS)] = slip;
                cache.transfer = self.misalign * cache.raw * self.misalign_inv;
                cache.last_energy_in = state.kinetic_energy;
                cache.last_energy_out = state.kinetic_energy;
                cache.recomputes += 1;
            }
            (cache.transfer, cache.last_energy_out)
        };

        state.position += self.length;
        state.kinetic_energy = energy_out;
        state.sync_phase += self.phase_factor / state.beta;
        state.mean = transfer * state.mean;
        state.covariance = transfer * state.covariance * transfer.transpose();
        Ok(())
    }

    /// Element description used by the kinds' `show` implementations.
    pub(crate) fn show(&self, type_name: &'static str, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Element {}: {} ({})", self.index, self.name, type_name)?;
        writeln!(out, "  Length: {}", self.length)?;
        writeln!(out, "  SamplingLength: {}", self.sampling_length)?;
        writeln!(out, "  PhaseFactor: {}", self.phase_factor)?;
        writeln!(out, "  RestEnergy: {}", self.rest_energy)
    }
}

/// Downcasts a type-erased state to the moment family's state.
pub(crate) fn state_of(state: &mut dyn BunchState) -> Result<&mut MomentState, EngineError> {
    state
        .as_any_mut()
        .downcast_mut::<MomentState>()
        .ok_or(EngineError::IncompatibleState {
            expected: "moment state",
        })
}
