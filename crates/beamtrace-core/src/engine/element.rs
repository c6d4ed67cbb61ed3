use std::fmt;

use crate::core::config::Config;
use crate::engine::error::EngineError;
use crate::engine::state::BunchState;

/// Construction-time inputs handed to a registered element builder.
#[derive(Debug, Clone)]
pub struct ElementContext {
    /// Element name, unique within its machine.
    pub name: String,
    /// Position of the element in the machine's sequence.
    pub index: usize,
    /// The element's own configuration; the built element keeps a copy.
    pub config: Config,
}

/// A summary of one lattice position, handed to [`Element::peek`] so an element
/// can inspect the finished line it is part of.
#[derive(Debug, Clone)]
pub struct ElementDesc {
    pub name: String,
    pub index: usize,
    pub type_name: &'static str,
}

/// One beamline component.
///
/// Elements are built by registered constructors during machine assembly, own
/// an immutable copy of their configuration, and mutate passing states in
/// place through [`Element::advance`]. An element is immutable after
/// construction apart from any interior caching it performs during `advance`.
pub trait Element {
    /// The element-type string this element registered under (e.g. `"drift"`).
    fn type_name(&self) -> &'static str;

    /// Element name, unique within its machine.
    fn name(&self) -> &str;

    /// Position of this element in the machine's sequence.
    fn index(&self) -> usize;

    /// The configuration this element was built from.
    fn config(&self) -> &Config;

    /// One-time hook invoked after all elements of a machine are constructed,
    /// in sequence order, with a description of the full line.
    fn peek(&mut self, line: &[ElementDesc]) {
        let _ = line;
    }

    /// Propagates `state` through this element, mutating it in place.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IncompatibleState`] if `state` belongs to a
    /// different simulation family than this element.
    fn advance(&self, state: &mut dyn BunchState) -> Result<(), EngineError>;

    /// Writes a human-readable description of this element.
    fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "Element {}: {} ({})",
            self.index(),
            self.name(),
            self.type_name()
        )
    }
}
