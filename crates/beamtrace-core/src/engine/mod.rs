//! # Engine Module
//!
//! This module implements the type-erased simulation machinery of beamtrace:
//! the traits a simulation family implements, the process-wide registry its
//! constructors are published through, and the machine that assembles a
//! lattice from configuration and drives a bunch state through it.
//!
//! ## Overview
//!
//! The engine knows nothing about any particular physics model. A simulation
//! family registers a state builder and a set of element builders under its
//! simulation-type name; [`machine::Machine::from_config`] resolves a lattice
//! description against that registry, and [`machine::Machine::propagate`]
//! walks the resulting element line, invoking each element's `advance` on the
//! state and honoring per-step overrides of the next-element cursor.
//!
//! ## Architecture
//!
//! - **States** ([`state`]) - The [`state::BunchState`] trait: cloning,
//!   assignment, the next-element cursor, and the index-driven introspection
//!   protocol external consumers read numeric fields through.
//! - **Elements** ([`element`]) - The [`element::Element`] trait: one beamline
//!   component with an immutable configuration and an in-place `advance`.
//! - **Registry** ([`registry`]) - Process-wide mapping from simulation-type
//!   and element-type names to builder functions.
//! - **Machine** ([`machine`]) - Ordered element line, name lookup, state
//!   allocation, and the propagation loop.
//! - **Error Handling** ([`error`]) - Engine-specific error types.

pub mod element;
pub mod error;
pub mod machine;
pub mod registry;
pub mod state;
