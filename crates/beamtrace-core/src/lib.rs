//! # beamtrace Core Library
//!
//! A simulation engine for charged-particle beamlines that tracks the first and
//! second statistical moments of a bunch (centroid and covariance of its
//! phase-space distribution) through a sequence of lattice elements.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear
//! separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains the dynamically-typed configuration store
//!   ([`core::config`]) that describes machines and elements, together with its TOML
//!   ingestion/emission adapter.
//!
//! - **[`engine`]: The Logic Core.** The type-erased simulation machinery: the
//!   [`engine::state::BunchState`] and [`engine::element::Element`] traits, the
//!   process-wide simulation-type registry, and the [`engine::machine::Machine`]
//!   that assembles a lattice from configuration and drives propagation through it.
//!
//! - **[`moment`]: The Physics Model.** The moment-matrix simulation family: a
//!   7-dimensional phase-space state (mean vector plus covariance matrix) and the
//!   lattice elements that transport it (drift, bend, quadrupole, solenoid,
//!   RF cavity, and friends), each with an energy-cached transfer matrix.

pub mod core;
pub mod engine;
pub mod moment;

pub use crate::core::config::{Config, ConfigError, Value};
pub use crate::engine::error::EngineError;
pub use crate::engine::machine::Machine;
pub use crate::engine::state::{ArrayView, BunchState, StateArray};
