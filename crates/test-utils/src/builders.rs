#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use vimigrate::config::{
    BackupSection, ConfigFile, EndpointConfig, EndpointsSection, InterpreterConfig,
    OperationConfig, RawConfigFile,
};
use vimigrate::types::{EndpointRole, ObjectType};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                interpreter: InterpreterConfig::posix_shell(),
                backup: BackupSection::default(),
                endpoint: EndpointsSection::default(),
                operation: Vec::new(),
            },
        }
    }

    pub fn with_operation(mut self, op: OperationConfig) -> Self {
        self.config.operation.push(op);
        self
    }

    pub fn with_endpoint(mut self, role: EndpointRole, endpoint: EndpointConfig) -> Self {
        match role {
            EndpointRole::Source => self.config.endpoint.source = Some(endpoint),
            EndpointRole::Destination => self.config.endpoint.destination = Some(endpoint),
        }
        self
    }

    pub fn with_interpreter(mut self, interpreter: InterpreterConfig) -> Self {
        self.config.interpreter = interpreter;
        self
    }

    pub fn with_backup_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.backup.root = root.into();
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `OperationConfig`.
pub struct OperationConfigBuilder {
    op: OperationConfig,
}

impl OperationConfigBuilder {
    pub fn inline(name: &str, script: &str) -> Self {
        Self::base(name, Some(script.to_string()), None)
    }

    pub fn file(name: &str, path: impl Into<PathBuf>) -> Self {
        Self::base(name, None, Some(path.into()))
    }

    fn base(name: &str, script: Option<String>, script_file: Option<PathBuf>) -> Self {
        Self {
            op: OperationConfig {
                name: name.to_string(),
                script,
                script_file,
                object_type: ObjectType::BackupCategory,
                params: BTreeMap::new(),
                requires: Vec::new(),
                done_marker: None,
            },
        }
    }

    pub fn object_type(mut self, object_type: ObjectType) -> Self {
        self.op.object_type = object_type;
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.op.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn requires(mut self, role: EndpointRole) -> Self {
        self.op.requires.push(role);
        self
    }

    pub fn done_marker(mut self, marker: &str) -> Self {
        self.op.done_marker = Some(marker.to_string());
        self
    }

    pub fn build(self) -> OperationConfig {
        self.op
    }
}

/// An endpoint whose connect script is `connect` and which has no
/// disconnect script.
pub fn endpoint(connect: &str) -> EndpointConfig {
    EndpointConfig {
        connect_script: connect.to_string(),
        disconnect_script: None,
        params: BTreeMap::new(),
    }
}
