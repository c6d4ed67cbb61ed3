use thiserror::Error;

use crate::core::config::ConfigError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("No simulation type named '{sim_type}' is registered")]
    UnknownSimType { sim_type: String },

    #[error("Simulation type '{sim_type}' has no element type named '{element_type}'")]
    UnknownElementType {
        sim_type: String,
        element_type: String,
    },

    #[error("Duplicate element name '{name}' at index {index}")]
    DuplicateElementName { name: String, index: usize },

    #[error("Element index {index} is out of range for a lattice of {len} elements")]
    ElementOutOfRange { index: usize, len: usize },

    #[error("'{what}' holds {got} values, more than the {max} available slots")]
    TooLarge {
        what: &'static str,
        got: usize,
        max: usize,
    },

    #[error("The {what} matrix is singular and cannot be inverted")]
    SingularMatrix { what: &'static str },

    #[error("Incompatible simulation state: expected a {expected}")]
    IncompatibleState { expected: &'static str },
}
