//! TOML ingestion and emission for [`Config`] trees.
//!
//! The mapping is deliberately narrow: TOML floats and integers become doubles,
//! strings stay strings, all-numeric arrays become double sequences, arrays of
//! tables become config sequences, and tables become nested configs. Every
//! other TOML shape (booleans, datetimes, mixed or nested arrays) is rejected,
//! and structural nesting is bounded by [`MAX_NESTING_DEPTH`] to catch
//! malformed input early.

use super::{Config, ConfigError, Value};
use toml::Table;

/// Maximum permitted depth of structured nesting below the root table.
pub const MAX_NESTING_DEPTH: usize = 3;

/// Converts a parsed TOML table into a [`Config`].
///
/// # Arguments
///
/// * `table` - The root table of a TOML document.
///
/// # Errors
///
/// Returns [`ConfigError::UnsupportedValue`] for TOML shapes with no
/// configuration kind, and [`ConfigError::ExcessivelyNested`] when tables or
/// table arrays recurse past [`MAX_NESTING_DEPTH`] levels.
pub fn config_from_toml(table: &Table) -> Result<Config, ConfigError> {
    table_to_config(table, 0)
}

/// Converts a [`Config`] back into a TOML table.
///
/// Exact inverse of [`config_from_toml`] on its supported shapes: the tags and
/// payloads of a round-tripped config compare equal, with doubles preserved
/// bit for bit.
pub fn config_to_toml(config: &Config) -> Table {
    let mut table = Table::new();
    for (key, value) in config.iter() {
        table.insert(key.to_string(), emit_value(value));
    }
    table
}

fn table_to_config(table: &Table, depth: usize) -> Result<Config, ConfigError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ConfigError::ExcessivelyNested {
            limit: MAX_NESTING_DEPTH,
        });
    }
    let mut config = Config::new();
    for (key, value) in table {
        config.set_value(key.clone(), convert_value(key, value, depth)?);
    }
    Ok(config)
}

fn convert_value(key: &str, value: &toml::Value, depth: usize) -> Result<Value, ConfigError> {
    match value {
        toml::Value::Float(v) => Ok(Value::Double(*v)),
        toml::Value::Integer(v) => Ok(Value::Double(*v as f64)),
        toml::Value::String(v) => Ok(Value::Str(v.clone())),
        toml::Value::Table(table) => Ok(Value::Config(table_to_config(table, depth + 1)?)),
        toml::Value::Array(items) => convert_array(key, items, depth),
        other => Err(ConfigError::UnsupportedValue {
            key: key.to_string(),
            found: other.type_str().to_string(),
        }),
    }
}

fn convert_array(key: &str, items: &[toml::Value], depth: usize) -> Result<Value, ConfigError> {
    // An empty array carries no element kind of its own; treat it as numeric.
    if let Some(doubles) = items.iter().map(numeric).collect::<Option<Vec<f64>>>() {
        return Ok(Value::DoubleVector(doubles));
    }
    let mut configs = Vec::with_capacity(items.len());
    for item in items {
        match item {
            toml::Value::Table(table) => configs.push(table_to_config(table, depth + 1)?),
            other => {
                return Err(ConfigError::UnsupportedValue {
                    key: key.to_string(),
                    found: format!("array containing {}", other.type_str()),
                });
            }
        }
    }
    Ok(Value::ConfigVector(configs))
}

fn numeric(value: &toml::Value) -> Option<f64> {
    match value {
        toml::Value::Float(v) => Some(*v),
        toml::Value::Integer(v) => Some(*v as f64),
        _ => None,
    }
}

fn emit_value(value: &Value) -> toml::Value {
    match value {
        Value::Double(v) => toml::Value::Float(*v),
        Value::Str(v) => toml::Value::String(v.clone()),
        Value::Config(config) => toml::Value::Table(config_to_toml(config)),
        Value::DoubleVector(v) => {
            toml::Value::Array(v.iter().map(|x| toml::Value::Float(*x)).collect())
        }
        Value::ConfigVector(configs) => {
            toml::Value::Array(configs.iter().map(|c| toml::Value::Table(config_to_toml(c))).collect())
        }
    }
}
