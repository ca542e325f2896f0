// src/session/endpoints.rs

//! Connecting and disconnecting the source/destination endpoints.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{EndpointConfig, EndpointsSection};
use crate::errors::Result;
use crate::exec::{CapturedOutput, ScriptInvocation, ScriptRunner};
use crate::session::state::{EndpointStatus, SessionState, UNKNOWN_VERSION};
use crate::types::EndpointRole;

/// Prefix a connect script prints in front of the endpoint version.
pub const VERSION_PREFIX: &str = "VERSION:";

/// Run the connect script for `role` and record the result.
///
/// On failure the endpoint is left disconnected.
pub async fn connect_endpoint<R>(
    runner: &R,
    state: &SessionState,
    role: EndpointRole,
    cfg: &EndpointConfig,
    cancel: Option<CancellationToken>,
) -> Result<EndpointStatus>
where
    R: ScriptRunner + ?Sized,
{
    info!(endpoint = %role, "connecting endpoint");

    let mut invocation = ScriptInvocation::inline(cfg.connect_script.clone())
        .with_params(cfg.params.clone());
    if let Some(token) = cancel {
        invocation = invocation.with_cancel(token);
    }

    match runner.execute(invocation).await {
        Ok(output) => {
            let version = version_from_output(&output);
            state.mark_connected(role, version);
            let status = state.snapshot(role);
            info!(endpoint = %role, version = %status.version, "endpoint connected");
            Ok(status)
        }
        Err(err) => {
            warn!(endpoint = %role, error = %err, "endpoint connect failed");
            state.mark_disconnected(role);
            Err(err)
        }
    }
}

/// Run the disconnect script (if any) and mark the endpoint disconnected,
/// whether or not the script succeeded.
pub async fn disconnect_endpoint<R>(
    runner: &R,
    state: &SessionState,
    role: EndpointRole,
    cfg: &EndpointConfig,
) -> Result<()>
where
    R: ScriptRunner + ?Sized,
{
    let result = match &cfg.disconnect_script {
        Some(script) if state.is_connected(role) => runner
            .execute(ScriptInvocation::inline(script.clone()).with_params(cfg.params.clone()))
            .await
            .map(|_| ()),
        _ => Ok(()),
    };

    state.mark_disconnected(role);
    info!(endpoint = %role, "endpoint disconnected");
    result
}

/// Disconnect every configured endpoint, then reset both slots.
///
/// Returns the first error encountered; every endpoint is still attempted.
pub async fn disconnect_all<R>(
    runner: &R,
    state: &SessionState,
    endpoints: &EndpointsSection,
) -> Result<()>
where
    R: ScriptRunner + ?Sized,
{
    let mut first_err = None;

    for (role, cfg) in endpoints.configured() {
        if let Err(err) = disconnect_endpoint(runner, state, role, cfg).await {
            warn!(endpoint = %role, error = %err, "disconnect failed");
            first_err.get_or_insert(err);
        }
    }

    state.reset();

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn version_from_output(output: &CapturedOutput) -> String {
    output
        .logs()
        .filter_map(|line| line.strip_prefix(VERSION_PREFIX))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .last()
        .unwrap_or(UNKNOWN_VERSION)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::OutputLine;

    #[test]
    fn version_is_taken_from_last_version_line() {
        let output = CapturedOutput::new(vec![
            OutputLine::Log("Name Port User".to_string()),
            OutputLine::Log("VERSION: 7.0.3".to_string()),
            OutputLine::Progress("VERSION:9".to_string()),
            OutputLine::Log("VERSION:8.0.2".to_string()),
        ]);
        assert_eq!(version_from_output(&output), "8.0.2");
    }

    #[test]
    fn missing_version_is_unknown() {
        let output = CapturedOutput::new(vec![OutputLine::Log("connected".to_string())]);
        assert_eq!(version_from_output(&output), "Unknown");
    }
}
