// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path, resolve relative script paths
/// against the file's directory, and validate.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let mut raw_config = load_from_path(path)?;

    let base = config_dir(path);
    for op in raw_config.operation.iter_mut() {
        if let Some(file) = op.script_file.as_mut() {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }

    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Default config location: `vimigrate.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("vimigrate.toml")
}

fn config_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
