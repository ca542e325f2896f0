// src/session/state.rs

//! Connection status of the source and destination endpoints.
//!
//! This replaces reading "who am I connected to" out of interpreter globals:
//! the engine records the outcome of every connect/disconnect script here,
//! and operations are gated on it.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::types::EndpointRole;

pub const UNKNOWN_VERSION: &str = "Unknown";

/// Read-only status of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStatus {
    pub connected: bool,
    pub version: String,
}

impl Default for EndpointStatus {
    fn default() -> Self {
        Self {
            connected: false,
            version: UNKNOWN_VERSION.to_string(),
        }
    }
}

/// Cheap-to-clone handle; every clone sees the same two slots.
#[derive(Debug, Clone)]
pub struct SessionState {
    inner: Arc<Slots>,
}

#[derive(Debug)]
struct Slots {
    source: watch::Sender<EndpointStatus>,
    destination: watch::Sender<EndpointStatus>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (source, _) = watch::channel(EndpointStatus::default());
        let (destination, _) = watch::channel(EndpointStatus::default());
        Self {
            inner: Arc::new(Slots {
                source,
                destination,
            }),
        }
    }

    fn slot(&self, role: EndpointRole) -> &watch::Sender<EndpointStatus> {
        match role {
            EndpointRole::Source => &self.inner.source,
            EndpointRole::Destination => &self.inner.destination,
        }
    }

    pub fn snapshot(&self, role: EndpointRole) -> EndpointStatus {
        self.slot(role).borrow().clone()
    }

    pub fn is_connected(&self, role: EndpointRole) -> bool {
        self.slot(role).borrow().connected
    }

    /// Watch one endpoint for changes.
    pub fn subscribe(&self, role: EndpointRole) -> watch::Receiver<EndpointStatus> {
        self.slot(role).subscribe()
    }

    pub(crate) fn mark_connected(&self, role: EndpointRole, version: impl Into<String>) {
        let version = version.into();
        debug!(endpoint = %role, %version, "endpoint connected");
        self.slot(role).send_replace(EndpointStatus {
            connected: true,
            version,
        });
    }

    pub(crate) fn mark_disconnected(&self, role: EndpointRole) {
        debug!(endpoint = %role, "endpoint disconnected");
        self.slot(role).send_replace(EndpointStatus::default());
    }

    /// Both endpoints back to `{false, "Unknown"}`.
    pub fn reset(&self) {
        for role in EndpointRole::ALL {
            self.mark_disconnected(role);
        }
    }
}
