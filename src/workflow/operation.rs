// src/workflow/operation.rs

//! Operation definitions and the backup directory layout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{ConfigFile, OperationConfig};
use crate::errors::{EngineError, Result};
use crate::exec::ScriptSource;
use crate::types::{EndpointRole, ObjectType};

/// Parameter carrying the backup root path into every script.
pub const PARAM_BACKUP_ROOT: &str = "BackupRoot";
/// Parameter carrying `<backup root>/<operation name>` into every script.
pub const PARAM_OUTPUT_DIR: &str = "OutputDir";

/// A named unit of work, e.g. "back up switches".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub object_type: ObjectType,
    pub source: ScriptSource,
    pub params: BTreeMap<String, String>,
    pub requires: Vec<EndpointRole>,
    pub done_marker: Option<String>,
}

impl Operation {
    pub fn new(name: impl Into<String>, source: ScriptSource) -> Self {
        Self {
            name: name.into(),
            object_type: ObjectType::BackupCategory,
            source,
            params: BTreeMap::new(),
            requires: Vec::new(),
            done_marker: None,
        }
    }

    pub fn inline(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(name, ScriptSource::Inline(script.into()))
    }

    pub fn with_object_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = object_type;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn requires(mut self, role: EndpointRole) -> Self {
        if !self.requires.contains(&role) {
            self.requires.push(role);
        }
        self
    }

    pub fn with_done_marker(mut self, marker: impl Into<String>) -> Self {
        self.done_marker = Some(marker.into());
        self
    }
}

impl TryFrom<&OperationConfig> for Operation {
    type Error = EngineError;

    fn try_from(cfg: &OperationConfig) -> std::result::Result<Self, Self::Error> {
        let source = match (&cfg.script, &cfg.script_file) {
            (Some(text), None) => ScriptSource::Inline(text.clone()),
            (None, Some(path)) => ScriptSource::File(path.clone()),
            _ => {
                return Err(EngineError::ConfigError(format!(
                    "operation '{}' needs exactly one of `script` or `script_file`",
                    cfg.name
                )));
            }
        };

        Ok(Self {
            name: cfg.name.clone(),
            object_type: cfg.object_type,
            source,
            params: cfg.params.clone(),
            requires: cfg.requires.clone(),
            done_marker: cfg.done_marker.clone(),
        })
    }
}

/// Resolve the user's selection against the config, keeping the selection
/// order. An empty selection means every configured operation, in file order.
pub fn select_operations(cfg: &ConfigFile, names: &[String]) -> Result<Vec<Operation>> {
    if names.is_empty() {
        return cfg.operation.iter().map(Operation::try_from).collect();
    }

    let mut selected: Vec<Operation> = Vec::with_capacity(names.len());
    for name in names {
        let op = cfg.operation(name).ok_or_else(|| {
            EngineError::ConfigError(format!(
                "unknown operation '{name}' (configured: {})",
                cfg.operation_names().collect::<Vec<_>>().join(", ")
            ))
        })?;
        if selected.iter().any(|s| s.name == op.name) {
            return Err(EngineError::ConfigError(format!(
                "operation '{name}' selected more than once"
            )));
        }
        selected.push(Operation::try_from(op)?);
    }
    Ok(selected)
}

/// Make an object name safe to use as a file or directory name.
///
/// Path separators, characters reserved on Windows and control characters
/// become `_`; surrounding whitespace and dots are trimmed. An empty result
/// becomes `_`.
pub fn sanitize_object_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<root>/<sanitized operation name>`.
pub fn operation_dir(root: &Path, operation: &str) -> PathBuf {
    root.join(sanitize_object_name(operation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_object_name("esx01.lab/local"), "esx01.lab_local");
        assert_eq!(sanitize_object_name("VM: \"web\" <1>"), "VM_ _web_ _1_");
        assert_eq!(sanitize_object_name("  ..hidden.. "), "hidden");
        assert_eq!(sanitize_object_name("tab\there"), "tab_here");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_object_name(""), "_");
        assert_eq!(sanitize_object_name(" . "), "_");
    }

    #[test]
    fn operation_dir_is_under_root() {
        let dir = operation_dir(Path::new("/backups"), "Distributed Switches");
        assert_eq!(dir, PathBuf::from("/backups/Distributed Switches"));
    }

    #[test]
    fn builder_dedups_required_endpoints() {
        let op = Operation::inline("roles", "Get-VIRole")
            .requires(EndpointRole::Source)
            .requires(EndpointRole::Source);
        assert_eq!(op.requires, vec![EndpointRole::Source]);
    }
}
