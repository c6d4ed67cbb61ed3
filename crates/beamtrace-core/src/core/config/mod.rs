//! # Configuration Module
//!
//! This module defines the dynamically-typed configuration store used to describe
//! machines, elements, and initial bunch states throughout beamtrace.
//!
//! ## Overview
//!
//! A [`Config`] is an ordered mapping from string keys to tagged [`Value`]s. The
//! value kinds are deliberately small: scalars (double, string), one level of
//! structure (a nested config), and homogeneous sequences (of doubles, or of
//! nested configs). Accessors check the stored tag at runtime, so a missing key
//! and a key holding the wrong kind fail distinctly. The [`ingest`] submodule
//! converts between this representation and TOML documents.

pub mod ingest;

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A tagged configuration value.
///
/// Exactly one of five kinds: a double, a string, a nested [`Config`], a
/// sequence of doubles, or a sequence of nested [`Config`]s. Integers have no
/// kind of their own; ingestion adapters widen them to doubles.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A scalar floating-point value.
    Double(f64),
    /// A string value.
    Str(String),
    /// A nested configuration.
    Config(Config),
    /// An ordered sequence of doubles.
    DoubleVector(Vec<f64>),
    /// An ordered sequence of nested configurations.
    ConfigVector(Vec<Config>),
}

impl Value {
    /// Returns the name of this value's kind, as used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Config(_) => "config",
            Value::DoubleVector(_) => "double vector",
            Value::ConfigVector(_) => "config vector",
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Config> for Value {
    fn from(value: Config) -> Self {
        Value::Config(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Value::DoubleVector(value)
    }
}

impl From<Vec<Config>> for Value {
    fn from(value: Vec<Config>) -> Self {
        Value::ConfigVector(value)
    }
}

/// A Rust type that a [`Value`] tag can be checked against and extracted into.
///
/// Implemented for the owned form of each value kind. Used by [`Config::get`]
/// to turn a tag mismatch into a [`ConfigError::WrongType`] naming both sides.
pub trait ConfigValue: Sized {
    /// The kind name reported in "wrong type" errors.
    const KIND: &'static str;

    /// Extracts an owned copy of `value` if its tag matches this type.
    fn from_value(value: &Value) -> Option<Self>;
}

impl ConfigValue for f64 {
    const KIND: &'static str = "double";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl ConfigValue for String {
    const KIND: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl ConfigValue for Config {
    const KIND: &'static str = "config";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Config(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl ConfigValue for Vec<f64> {
    const KIND: &'static str = "double vector";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::DoubleVector(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl ConfigValue for Vec<Config> {
    const KIND: &'static str = "config vector";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::ConfigVector(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// A string-keyed store of tagged configuration values.
///
/// Keys are unique and iteration order is the lexicographic key order, so
/// display and TOML emission are deterministic. A `Config` describes either a
/// whole machine (`sim_type` plus an `elements` sequence) or a single element;
/// elements keep an immutable copy of the config they were built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    values: BTreeMap<String, Value>,
}

impl Config {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Fetches the value stored under `key`, checked against the requested type.
    ///
    /// # Arguments
    ///
    /// * `key` - The configuration key to look up.
    ///
    /// # Return
    ///
    /// Returns an owned copy of the stored value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKey`] if `key` is absent, or
    /// [`ConfigError::WrongType`] if the stored tag does not match `T`.
    pub fn get<T: ConfigValue>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self.values.get(key).ok_or_else(|| ConfigError::MissingKey {
            key: key.to_string(),
        })?;
        T::from_value(value).ok_or_else(|| ConfigError::WrongType {
            key: key.to_string(),
            expected: T::KIND,
            found: value.kind(),
        })
    }

    /// Fetches the value stored under `key`, falling back to `default`.
    ///
    /// Never fails: both a missing key and a wrong stored kind yield `default`.
    pub fn get_or<T: ConfigValue>(&self, key: &str, default: T) -> T {
        match self.values.get(key) {
            Some(value) => T::from_value(value).unwrap_or(default),
            None => default,
        }
    }

    /// Inserts or overwrites the value stored under `key`.
    ///
    /// The stored tag becomes that of `value`. Callers are expected to keep a
    /// key's kind stable across updates; this is a usage convention, not an
    /// enforced rule.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the raw tagged value stored under `key`, if any.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Inserts or overwrites the raw tagged value stored under `key`.
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Iterates over `(key, value)` entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no keys are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn show(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        for (key, value) in self.iter() {
            match value {
                Value::Double(v) => writeln!(f, "{:indent$}{key} = {v}", "")?,
                Value::Str(v) => writeln!(f, "{:indent$}{key} = {v}", "")?,
                Value::DoubleVector(v) => {
                    write!(f, "{:indent$}{key} = [", "")?;
                    for (i, x) in v.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{x}")?;
                    }
                    writeln!(f, "]")?;
                }
                Value::Config(nested) => {
                    writeln!(f, "{:indent$}{key} =", "")?;
                    nested.show(f, indent + 2)?;
                }
                Value::ConfigVector(nested) => {
                    writeln!(f, "{:indent$}{key} = [{} configs]", "", nested.len())?;
                    for sub in nested {
                        sub.show(f, indent + 2)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.show(f, 0)
    }
}

/// Errors arising from configuration access or ingestion.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration key '{key}'")]
    MissingKey { key: String },

    #[error("Configuration key '{key}' holds a {found}, expected a {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Configuration nested deeper than {limit} levels")]
    ExcessivelyNested { limit: usize },

    #[error("Unsupported value for configuration key '{key}': {found}")]
    UnsupportedValue { key: String, found: String },
}
