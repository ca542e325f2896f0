// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, InterpreterConfig, RawConfigFile};
use crate::errors::{EngineError, Result};
use crate::exec::invocation::SENTINEL_TOKEN;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = EngineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.interpreter,
            raw.backup,
            raw.endpoint,
            raw.operation,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_operations(cfg)?;
    validate_interpreter(&cfg.interpreter)?;
    validate_operations(cfg)?;
    Ok(())
}

fn ensure_has_operations(cfg: &RawConfigFile) -> Result<()> {
    if cfg.operation.is_empty() {
        return Err(EngineError::ConfigError(
            "config must contain at least one [[operation]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_interpreter(cfg: &InterpreterConfig) -> Result<()> {
    if cfg.program.trim().is_empty() {
        return Err(EngineError::ConfigError(
            "[interpreter].program must not be empty".to_string(),
        ));
    }
    if cfg.progress_marker.trim().is_empty() {
        return Err(EngineError::ConfigError(
            "[interpreter].progress_marker must not be empty".to_string(),
        ));
    }
    if !cfg.terminator.contains(SENTINEL_TOKEN) {
        return Err(EngineError::ConfigError(format!(
            "[interpreter].terminator must contain {SENTINEL_TOKEN}"
        )));
    }
    Ok(())
}

fn validate_operations(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();

    for op in cfg.operation.iter() {
        if op.name.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "operation name must not be empty".to_string(),
            ));
        }
        if !seen.insert(op.name.as_str()) {
            return Err(EngineError::ConfigError(format!(
                "operation '{}' is defined more than once",
                op.name
            )));
        }

        match (&op.script, &op.script_file) {
            (Some(_), None) | (None, Some(_)) => {}
            (Some(_), Some(_)) => {
                return Err(EngineError::ConfigError(format!(
                    "operation '{}' sets both `script` and `script_file`",
                    op.name
                )));
            }
            (None, None) => {
                return Err(EngineError::ConfigError(format!(
                    "operation '{}' needs one of `script` or `script_file`",
                    op.name
                )));
            }
        }

        for role in op.requires.iter() {
            if cfg.endpoint.get(*role).is_none() {
                return Err(EngineError::ConfigError(format!(
                    "operation '{}' requires endpoint '{}' which is not configured",
                    op.name, role
                )));
            }
        }

        if let Some(marker) = &op.done_marker {
            if marker.trim().is_empty() {
                return Err(EngineError::ConfigError(format!(
                    "operation '{}' has an empty `done_marker`",
                    op.name
                )));
            }
        }
    }

    Ok(())
}
