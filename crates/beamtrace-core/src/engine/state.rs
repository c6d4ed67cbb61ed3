use std::any::Any;
use std::fmt;

use crate::engine::error::EngineError;

/// A read-only view of one numeric quantity exposed by a simulation state.
///
/// Dimensionality is encoded in the variant; matrix data is column-major.
#[derive(Debug, Clone, Copy)]
pub enum ArrayView<'a> {
    /// A single scalar.
    Scalar(f64),
    /// A one-dimensional quantity.
    Vector(&'a [f64]),
    /// A two-dimensional quantity in column-major order.
    Matrix {
        rows: usize,
        cols: usize,
        data: &'a [f64],
    },
}

/// One introspectable field of a simulation state: its name and a view of its data.
#[derive(Debug, Clone, Copy)]
pub struct StateArray<'a> {
    /// Stable field name, unique within the exposing state type.
    pub name: &'static str,
    /// Borrowed view of the field's current contents.
    pub view: ArrayView<'a>,
}

/// The state of a bunch of particles moving through a
/// [`Machine`](crate::engine::machine::Machine).
///
/// Concrete simulation families implement this trait and register a builder for
/// it under their simulation-type name. The trait is object-safe: machines and
/// elements handle states exclusively as `Box<dyn BunchState>` / `&mut dyn
/// BunchState`, and elements recover their concrete state type through
/// [`BunchState::as_any`].
pub trait BunchState: Any {
    /// Index of the element that should process this state on the next
    /// propagation step.
    ///
    /// [`Machine::propagate`](crate::engine::machine::Machine::propagate)
    /// defaults this to the current index plus one before every `advance`
    /// call; an element may overwrite it to redirect the flow.
    fn next_element(&self) -> usize;

    /// Overwrites the next-element index.
    fn set_next_element(&mut self, index: usize);

    /// Produces a deep, independent copy of this state.
    fn clone_state(&self) -> Box<dyn BunchState>;

    /// Overwrites this state's physical fields from another state of the same
    /// concrete kind.
    ///
    /// The next-element index is not part of the physical payload and is left
    /// untouched, so a mid-lattice re-injection cannot derail the propagation
    /// loop.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IncompatibleState`] if `other` is a different
    /// concrete state type.
    fn assign(&mut self, other: &dyn BunchState) -> Result<(), EngineError>;

    /// Introspects the `index`-th exposed field of this state.
    ///
    /// The set of fields and their order are stable per state type. Callers
    /// iterate with `index` increasing from zero until `None` is returned.
    fn get_array(&self, index: usize) -> Option<StateArray<'_>>;

    /// Writes a human-readable summary of this state.
    fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Upcasts to [`Any`] for concrete-type recovery.
    fn as_any(&self) -> &dyn Any;

    /// Mutable variant of [`BunchState::as_any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
