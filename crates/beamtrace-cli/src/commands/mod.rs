pub mod show;
pub mod track;

use std::path::Path;

use beamtrace::Config;
use beamtrace::core::config::ingest::config_from_toml;

use crate::error::{CliError, Result};

/// Reads a TOML file and converts it into the engine's configuration tree.
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)?;
    let table: toml::Table = text.parse().map_err(|e: toml::de::Error| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    Ok(config_from_toml(&table)?)
}
