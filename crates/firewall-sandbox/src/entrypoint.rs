//! Child-side sandbox entrypoint.
//!
//! Runs when the process observes the `__sandbox__` argv sentinel: decode
//! the JSON directive from `_MCP_SANDBOX_CONFIG`, filter the environment
//! through the allowlist, apply Landlock, resolve the target command against
//! the filtered `PATH`, and exec the downstream. On success this function
//! never returns: the process image is replaced.

use std::path::PathBuf;

use tracing::warn;

use firewall_types::FirewallError;

use crate::env::filter_env;
use crate::landlock_fs::{apply_landlock, LandlockStatus};
use crate::launcher::{SandboxExecConfig, SANDBOX_CONFIG_ENV};

/// Run the sandbox entrypoint. Returns only on failure.
pub fn run_entrypoint() -> Result<(), FirewallError> {
    let raw = std::env::var(SANDBOX_CONFIG_ENV).map_err(|_| {
        FirewallError::Sandbox(format!(
            "{SANDBOX_CONFIG_ENV} environment variable not set"
        ))
    })?;

    let cfg: SandboxExecConfig = serde_json::from_str(&raw)
        .map_err(|e| FirewallError::Sandbox(format!("parsing {SANDBOX_CONFIG_ENV}: {e}")))?;

    let filtered_env = filter_env(&cfg.env, &cfg.env_allowlist);

    match apply_landlock(&cfg)? {
        LandlockStatus::Unsupported => {
            warn!("Landlock unavailable; continuing with environment filtering only");
        }
        LandlockStatus::NotEnforced => {
            warn!("Landlock ruleset was not enforced (kernel may be too old)");
        }
        LandlockStatus::PartiallyEnforced | LandlockStatus::Enforced => {}
    }

    let resolved = resolve_target(&cfg.command, &filtered_env)?;

    exec_downstream(&resolved, &cfg.args, &filtered_env)
}

/// Resolve the target command against the filtered environment's `PATH`.
/// Absolute paths are accepted verbatim after an existence check.
fn resolve_target(command: &str, env: &[String]) -> Result<PathBuf, FirewallError> {
    if command.starts_with('/') {
        let path = PathBuf::from(command);
        if !path.exists() {
            return Err(FirewallError::Sandbox(format!(
                "resolving command {command:?}: no such file"
            )));
        }
        return Ok(path);
    }

    let search_path = env
        .iter()
        .find_map(|entry| entry.strip_prefix("PATH="))
        .unwrap_or("");

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    which::which_in(command, Some(search_path), cwd)
        .map_err(|e| FirewallError::Sandbox(format!("resolving command {command:?}: {e}")))
}

/// Replace the current process with the downstream command.
#[cfg(unix)]
fn exec_downstream(resolved: &PathBuf, args: &[String], env: &[String]) -> Result<(), FirewallError> {
    use std::os::unix::process::CommandExt;

    let mut cmd = std::process::Command::new(resolved);
    cmd.args(args);
    cmd.env_clear();
    for entry in env {
        if let Some((key, value)) = entry.split_once('=') {
            cmd.env(key, value);
        }
    }

    // exec only returns on failure.
    let err = cmd.exec();
    Err(FirewallError::Sandbox(format!(
        "exec {}: {err}",
        resolved.display()
    )))
}

#[cfg(not(unix))]
fn exec_downstream(
    _resolved: &PathBuf,
    _args: &[String],
    _env: &[String],
) -> Result<(), FirewallError> {
    Err(FirewallError::Sandbox(
        "sandbox exec is not supported on this platform".to_string(),
    ))
}

// ============================================================
// Tests
// ============================================================
