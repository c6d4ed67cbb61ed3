//! # Core Module
//!
//! This module provides the foundation layer of beamtrace: the dynamically-typed
//! configuration representation that every machine, element, and initial bunch
//! state is described with.
//!
//! ## Overview
//!
//! Lattice descriptions reach the engine as trees of string-keyed, tagged values.
//! The [`config`] submodule defines that representation, the typed accessors over
//! it, and the adapter that converts between it and TOML documents. The
//! [`constants`] submodule collects the physical constants the transport models
//! share.

pub mod config;
pub mod constants;
