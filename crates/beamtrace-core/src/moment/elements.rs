//! The concrete element kinds of the moment-matrix family.
//!
//! Each kind wraps a [`MomentElementBase`], seeds its raw transfer matrix at
//! construction, and delegates transport to the base unless it overrides the
//! whole `advance` step (`source` re-injects a configured state, `rfcavity`
//! carries a placeholder acceleration model).

use std::fmt;

use crate::core::config::Config;
use crate::core::constants::M_TO_MM;
use crate::engine::element::{Element, ElementContext};
use crate::engine::error::EngineError;
use crate::engine::registry::SimTypeRegistration;
use crate::engine::state::BunchState;
use crate::moment::element::{MomentElementBase, state_of};
use crate::moment::state::MomentState;
use crate::moment::{SIM_TYPE, TransferMatrix, coord, overlay_matrix};

/// Implements [`Element`] for a kind whose transport is exactly the base's.
macro_rules! delegate_to_base {
    ($element:ty, $type_name:literal) => {
        impl Element for $element {
            fn type_name(&self) -> &'static str {
                $type_name
            }

            fn name(&self) -> &str {
                self.base.name()
            }

            fn index(&self) -> usize {
                self.base.index()
            }

            fn config(&self) -> &Config {
                self.base.config()
            }

            fn advance(&self, state: &mut dyn BunchState) -> Result<(), EngineError> {
                self.base.advance(state)
            }

            fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
                self.base.show($type_name, out)
            }
        }
    };
}

/// Fills one transverse plane's 2x2 block of a quadrupole-like element.
///
/// `k > 0` focuses the plane (trigonometric block), `k <= 0` defocuses it
/// (hyperbolic block); `k == 0` degenerates to the drift block in either
/// branch. `plane` is the position index; the momentum index is `plane + 1`.
/// `length` and `k` are in mm units.
fn focusing_block(length: f64, k: f64, plane: usize, raw: &mut TransferMatrix) {
    if k > 0.0 {
        let sqrt_k = k.sqrt();
        let psi = sqrt_k * length;
        let (sn, cs) = psi.sin_cos();
        raw[(plane, plane)] = cs;
        raw[(plane + 1, plane + 1)] = cs;
        raw[(plane, plane + 1)] = if sqrt_k != 0.0 { sn / sqrt_k } else { length };
        raw[(plane + 1, plane)] = -sqrt_k * sn;
    } else {
        let sqrt_k = (-k).sqrt();
        let psi = sqrt_k * length;
        let cs = psi.cosh();
        let sn = psi.sinh();
        raw[(plane, plane)] = cs;
        raw[(plane + 1, plane + 1)] = cs;
        raw[(plane, plane + 1)] = if sqrt_k != 0.0 { sn / sqrt_k } else { length };
        raw[(plane + 1, plane)] = sqrt_k * sn;
    }
}

/// Re-injects a preconfigured bunch state, discarding the incoming moments.
pub struct Source {
    base: MomentElementBase,
    internal: MomentState,
}

impl Source {
    fn new(context: ElementContext) -> Result<Self, EngineError> {
        let base = MomentElementBase::from_context(context)?;
        let internal = MomentState::from_config(base.config())?;
        Ok(Self { base, internal })
    }

    fn build(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(Self::new(context)?))
    }
}

impl Element for Source {
    fn type_name(&self) -> &'static str {
        "source"
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn index(&self) -> usize {
        self.base.index()
    }

    fn config(&self) -> &Config {
        self.base.config()
    }

    fn advance(&self, state: &mut dyn BunchState) -> Result<(), EngineError> {
        let state = state_of(state)?;
        state.assign(&self.internal)
    }

    fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.base.show("source", out)?;
        writeln!(out, "Initial:")?;
        self.internal.show(out)
    }
}

/// Zero-extent no-op placeholder.
pub struct Marker {
    base: MomentElementBase,
}

impl Marker {
    fn new(context: ElementContext) -> Result<Self, EngineError> {
        let mut base = MomentElementBase::from_context(context)?;
        base.clear_length();
        Ok(Self { base })
    }

    fn build(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(Self::new(context)?))
    }
}

delegate_to_base!(Marker, "marker");

/// Field-free straight section.
pub struct Drift {
    base: MomentElementBase,
}

impl Drift {
    fn new(context: ElementContext) -> Result<Self, EngineError> {
        let mut base = MomentElementBase::from_context(context)?;
        let length = base.length() * M_TO_MM;
        base.set_raw(|raw| {
            raw[(coord::X, coord::PX)] = length;
            raw[(coord::Y, coord::PY)] = length;
        });
        Ok(Self { base })
    }

    fn build(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(Self::new(context)?))
    }
}

delegate_to_base!(Drift, "drift");

/// Gradient sector bend, in cylindrical coordinates.
pub struct SBend {
    base: MomentElementBase,
}

impl SBend {
    fn new(context: ElementContext) -> Result<Self, EngineError> {
        let mut base = MomentElementBase::from_context(context)?;
        let length = base.config().get::<f64>("L")? * M_TO_MM;
        let phi: f64 = base.config().get("phi")?; // bend angle [rad]
        let rho = length / phi;
        let k = base.config().get_or("K", 0.0) / (M_TO_MM * M_TO_MM);
        let kx = k + 1.0 / (rho * rho);
        let ky = -k;
        base.set_raw(|raw| {
            focusing_block(length, kx, coord::X, raw);
            focusing_block(length, ky, coord::Y, raw);
        });
        Ok(Self { base })
    }

    fn build(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(Self::new(context)?))
    }
}

delegate_to_base!(SBend, "sbend");

/// Magnetic quadrupole; `K = B2/Brho`.
pub struct Quadrupole {
    base: MomentElementBase,
}

impl Quadrupole {
    fn new(context: ElementContext) -> Result<Self, EngineError> {
        let mut base = MomentElementBase::from_context(context)?;
        let length = base.config().get::<f64>("L")? * M_TO_MM;
        let k = base.config().get_or("K", 0.0) / (M_TO_MM * M_TO_MM);
        base.set_raw(|raw| {
            focusing_block(length, k, coord::X, raw);
            focusing_block(length, -k, coord::Y, raw);
        });
        Ok(Self { base })
    }

    fn build(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(Self::new(context)?))
    }
}

delegate_to_base!(Quadrupole, "quadrupole");

/// Solenoid; `K = B0/(2 Brho)`. Couples the two transverse planes.
pub struct Solenoid {
    base: MomentElementBase,
}

impl Solenoid {
    fn new(context: ElementContext) -> Result<Self, EngineError> {
        let mut base = MomentElementBase::from_context(context)?;
        let length = base.config().get::<f64>("L")? * M_TO_MM;
        let k = base.config().get_or("K", 0.0) / M_TO_MM;
        let (s, c) = (k * length).sin_cos();
        base.set_raw(|raw| {
            raw[(coord::X, coord::X)] = c * c;
            raw[(coord::PX, coord::PX)] = c * c;
            raw[(coord::Y, coord::Y)] = c * c;
            raw[(coord::PY, coord::PY)] = c * c;

            raw[(coord::X, coord::PX)] = if k != 0.0 { s * c / k } else { length };
            raw[(coord::X, coord::Y)] = s * c;
            raw[(coord::X, coord::PY)] = if k != 0.0 { s * s / k } else { 0.0 };

            raw[(coord::PX, coord::X)] = -k * s * c;
            raw[(coord::PX, coord::Y)] = -k * s * s;
            raw[(coord::PX, coord::PY)] = s * c;

            raw[(coord::Y, coord::X)] = -s * c;
            raw[(coord::Y, coord::PX)] = if k != 0.0 { -s * s / k } else { 0.0 };
            raw[(coord::Y, coord::PY)] = if k != 0.0 { s * c / k } else { length };

            raw[(coord::PY, coord::X)] = k * s * s;
            raw[(coord::PY, coord::PX)] = -s * c;
            raw[(coord::PY, coord::Y)] = -k * s * c;
        });
        Ok(Self { base })
    }

    fn build(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(Self::new(context)?))
    }
}

delegate_to_base!(Solenoid, "solenoid");

/// RF accelerating cavity.
///
/// Placeholder model: `advance` applies the raw matrix without the
/// misalignment sandwich and adds a flat unit kinetic-energy gain per pass.
/// Because the outgoing energy differs from the incoming one, the cache
/// recomputes on every pass of a forward-propagating bunch.
pub struct RfCavity {
    base: MomentElementBase,
    cavity_type: String,
}

impl RfCavity {
    fn new(context: ElementContext) -> Result<Self, EngineError> {
        let cavity_type: String = context.config.get("cavtype")?;
        let mut base = MomentElementBase::from_context(context)?;
        let length = base.config().get::<f64>("L")? * M_TO_MM;
        base.set_raw(|raw| {
            raw[(coord::X, coord::PX)] = length;
            raw[(coord::Y, coord::PY)] = length;
        });
        Ok(Self { base, cavity_type })
    }

    fn build(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(Self::new(context)?))
    }
}

impl Element for RfCavity {
    fn type_name(&self) -> &'static str {
        "rfcavity"
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn index(&self) -> usize {
        self.base.index()
    }

    fn config(&self) -> &Config {
        self.base.config()
    }

    fn advance(&self, state: &mut dyn BunchState) -> Result<(), EngineError> {
        let state = state_of(state)?;

        let (transfer, energy_out) = {
            let mut cache = self.base.lock_cache();
            if state.kinetic_energy != cache.last_energy_in {
                let slip = self.base.phase_slip(state.beta, state.gamma);
                cache.raw[(coord::S, coord::PS)] = slip;
                // no misalignment sandwich here; see the type-level note
                cache.transfer = cache.raw;
                cache.last_energy_in = state.kinetic_energy;
                cache.last_energy_out = state.kinetic_energy + 1.0;
                cache.recomputes += 1;
            }
            (cache.transfer, cache.last_energy_out)
        };

        state.position += self.base.length();
        state.kinetic_energy = energy_out;
        state.sync_phase += self.base.phase_factor / state.beta;
        state.mean = transfer * state.mean;
        state.covariance = transfer * state.covariance * transfer.transpose();
        Ok(())
    }

    fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.base.show("rfcavity", out)?;
        writeln!(out, "  CavityType: {}", self.cavity_type)
    }
}

/// Charge stripper; identity transport until the physics is modeled.
pub struct Stripper {
    base: MomentElementBase,
}

impl Stripper {
    fn new(context: ElementContext) -> Result<Self, EngineError> {
        Ok(Self {
            base: MomentElementBase::from_context(context)?,
        })
    }

    fn build(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(Self::new(context)?))
    }
}

delegate_to_base!(Stripper, "stripper");

/// Electrostatic dipole; identity transport until the physics is modeled.
pub struct EDipole {
    base: MomentElementBase,
}

impl EDipole {
    fn new(context: ElementContext) -> Result<Self, EngineError> {
        Ok(Self {
            base: MomentElementBase::from_context(context)?,
        })
    }

    fn build(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(Self::new(context)?))
    }
}

delegate_to_base!(EDipole, "edipole");

/// Transport matrix read directly from configuration.
#[derive(Debug)]
pub struct Generic {
    base: MomentElementBase,
}

impl Generic {
    fn new(context: ElementContext) -> Result<Self, EngineError> {
        let mut base = MomentElementBase::from_context(context)?;
        let values: Vec<f64> = base.config().get("transfer")?;
        let mut matrix = TransferMatrix::identity();
        overlay_matrix(&mut matrix, &values, "transfer")?;
        base.set_raw(|raw| *raw = matrix);
        Ok(Self { base })
    }

    fn build(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(Self::new(context)?))
    }
}

delegate_to_base!(Generic, "generic");

fn build_state(config: &Config) -> Result<Box<dyn BunchState>, EngineError> {
    Ok(Box::new(MomentState::from_config(config)?))
}

/// Registers the whole family under [`SIM_TYPE`].
pub(crate) fn register_family() {
    SimTypeRegistration::new(SIM_TYPE, build_state)
        .element("source", Source::build)
        .element("marker", Marker::build)
        .element("drift", Drift::build)
        .element("sbend", SBend::build)
        .element("quadrupole", Quadrupole::build)
        .element("solenoid", Solenoid::build)
        .element("rfcavity", RfCavity::build)
        .element("stripper", Stripper::build)
        .element("edipole", EDipole::build)
        .element("generic", Generic::build)
        .register();
}
