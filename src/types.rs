use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of inventory object an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Host,
    #[serde(rename = "vm")]
    Vm,
    Cluster,
    /// A whole configuration category (switches, roles, permissions, ...).
    BackupCategory,
}

impl Default for ObjectType {
    fn default() -> Self {
        ObjectType::BackupCategory
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectType::Host => "host",
            ObjectType::Vm => "vm",
            ObjectType::Cluster => "cluster",
            ObjectType::BackupCategory => "backup_category",
        };
        f.write_str(s)
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "host" => Ok(ObjectType::Host),
            "vm" => Ok(ObjectType::Vm),
            "cluster" => Ok(ObjectType::Cluster),
            "backup_category" | "category" => Ok(ObjectType::BackupCategory),
            other => Err(format!(
                "invalid object type: {other} (expected host, vm, cluster or backup_category)"
            )),
        }
    }
}

/// One of the two named endpoints a migration talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    Source,
    Destination,
}

impl EndpointRole {
    pub const ALL: [EndpointRole; 2] = [EndpointRole::Source, EndpointRole::Destination];
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointRole::Source => f.write_str("source"),
            EndpointRole::Destination => f.write_str("destination"),
        }
    }
}

impl FromStr for EndpointRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(EndpointRole::Source),
            "destination" => Ok(EndpointRole::Destination),
            other => Err(format!(
                "invalid endpoint: {other} (expected \"source\" or \"destination\")"
            )),
        }
    }
}
