// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{EndpointRole, ObjectType};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [interpreter]
/// program = "pwsh"
///
/// [backup]
/// root = "D:/backups"
///
/// [endpoint.source]
/// connect_script = "Connect-VIServer -Server {{Server}} | Out-Null; 'VERSION:' + $global:DefaultVIServer.Version"
/// params = { Server = "vc01.lab" }
///
/// [[operation]]
/// name = "switches"
/// script_file = "scripts/Backup-Switches.ps1"
/// requires = ["source"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub interpreter: InterpreterConfig,

    #[serde(default)]
    pub backup: BackupSection,

    #[serde(default)]
    pub endpoint: EndpointsSection,

    /// `[[operation]]` entries, in file order.
    #[serde(default)]
    pub operation: Vec<OperationConfig>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub interpreter: InterpreterConfig,
    pub backup: BackupSection,
    pub endpoint: EndpointsSection,
    pub operation: Vec<OperationConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        interpreter: InterpreterConfig,
        backup: BackupSection,
        endpoint: EndpointsSection,
        operation: Vec<OperationConfig>,
    ) -> Self {
        Self {
            interpreter,
            backup,
            endpoint,
            operation,
        }
    }

    pub fn operation(&self, name: &str) -> Option<&OperationConfig> {
        self.operation.iter().find(|op| op.name == name)
    }

    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operation.iter().map(|op| op.name.as_str())
    }
}

/// `[interpreter]` section: how to start and drive the external interpreter.
///
/// Defaults target PowerShell reading commands from stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct InterpreterConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Command appended after every script. Must contain `{sentinel}` and
    /// print it on both stdout and stderr.
    #[serde(default = "default_terminator")]
    pub terminator: String,

    /// Written to stdin when the session closes.
    #[serde(default = "default_exit_command")]
    pub exit_command: String,

    /// How to call a script file; `{path}` and `{args}` are substituted.
    #[serde(default = "default_script_file_template")]
    pub script_file_template: String,

    /// How to render one named parameter; `{name}` and `{value}` are
    /// substituted. Rendered arguments are joined with spaces into `{args}`.
    #[serde(default = "default_named_argument_template")]
    pub named_argument_template: String,

    #[serde(default = "default_progress_marker")]
    pub progress_marker: String,
}

fn default_program() -> String {
    "pwsh".to_string()
}

fn default_args() -> Vec<String> {
    ["-NoLogo", "-NoProfile", "-NonInteractive", "-Command", "-"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_terminator() -> String {
    "Write-Output '{sentinel}'; [Console]::Error.WriteLine('{sentinel}')".to_string()
}

fn default_exit_command() -> String {
    "exit".to_string()
}

fn default_script_file_template() -> String {
    "& '{path}' {args}".to_string()
}

fn default_named_argument_template() -> String {
    "-{name} '{value}'".to_string()
}

fn default_progress_marker() -> String {
    crate::exec::protocol::DEFAULT_PROGRESS_MARKER.to_string()
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            terminator: default_terminator(),
            exit_command: default_exit_command(),
            script_file_template: default_script_file_template(),
            named_argument_template: default_named_argument_template(),
            progress_marker: default_progress_marker(),
        }
    }
}

impl InterpreterConfig {
    /// A POSIX `sh` reading commands from stdin.
    pub fn posix_shell() -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-s".to_string()],
            terminator: "printf '%s\\n' '{sentinel}'; printf '%s\\n' '{sentinel}' >&2"
                .to_string(),
            exit_command: default_exit_command(),
            script_file_template: "{args} . '{path}'".to_string(),
            named_argument_template: "{name}='{value}'".to_string(),
            progress_marker: default_progress_marker(),
        }
    }
}

/// `[backup]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupSection {
    /// Root directory; each operation writes under `<root>/<operation name>`.
    #[serde(default = "default_backup_root")]
    pub root: PathBuf,

    /// File name (under `root`) the run ledger is written to.
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,
}

fn default_backup_root() -> PathBuf {
    PathBuf::from("backups")
}

fn default_ledger_file() -> String {
    "run-ledger.json".to_string()
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            root: default_backup_root(),
            ledger_file: default_ledger_file(),
        }
    }
}

/// `[endpoint.source]` / `[endpoint.destination]`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EndpointsSection {
    #[serde(default)]
    pub source: Option<EndpointConfig>,

    #[serde(default)]
    pub destination: Option<EndpointConfig>,
}

impl EndpointsSection {
    pub fn get(&self, role: EndpointRole) -> Option<&EndpointConfig> {
        match role {
            EndpointRole::Source => self.source.as_ref(),
            EndpointRole::Destination => self.destination.as_ref(),
        }
    }

    /// Configured endpoints, source first.
    pub fn configured(&self) -> impl Iterator<Item = (EndpointRole, &EndpointConfig)> {
        EndpointRole::ALL
            .into_iter()
            .filter_map(|role| self.get(role).map(|cfg| (role, cfg)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Script that connects; it should print `VERSION:<version>` on success.
    pub connect_script: String,

    /// Script that disconnects. If absent, disconnect only resets local state.
    #[serde(default)]
    pub disconnect_script: Option<String>,

    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// One `[[operation]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationConfig {
    pub name: String,

    /// Inline script text. Exactly one of `script` / `script_file` is set.
    #[serde(default)]
    pub script: Option<String>,

    /// Script file; relative paths resolve against the config file directory.
    #[serde(default)]
    pub script_file: Option<PathBuf>,

    #[serde(default)]
    pub object_type: ObjectType,

    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Endpoints that must be connected before this operation may start.
    #[serde(default)]
    pub requires: Vec<EndpointRole>,

    /// Log text the script prints once its work is done.
    #[serde(default)]
    pub done_marker: Option<String>,
}
