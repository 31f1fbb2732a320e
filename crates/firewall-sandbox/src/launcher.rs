//! Parent-side sandbox launcher.
//!
//! Transforms a downstream spawn into a re-exec of the firewall's own binary:
//! argv `[self, "__sandbox__", "--", command, args…]`, with the entire
//! sandbox directive serialized into the `_MCP_SANDBOX_CONFIG` environment
//! variable. The child's environment contains exactly that one variable;
//! everything downstream-visible is reconstructed by the entrypoint from the
//! serialized payload, filtered through the allowlist.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use firewall_types::{FirewallError, WorkspaceMode};

use crate::capabilities::Capabilities;
use crate::profile::SandboxProfile;

/// First-argv sentinel that diverts `main` into the sandbox entrypoint.
pub const SANDBOX_SENTINEL: &str = "__sandbox__";

/// Environment variable carrying the JSON sandbox directive across the re-exec.
pub const SANDBOX_CONFIG_ENV: &str = "_MCP_SANDBOX_CONFIG";

/// The JSON payload passed via `_MCP_SANDBOX_CONFIG`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxExecConfig {
    pub network: bool,
    #[serde(default)]
    pub env_allowlist: Vec<String>,
    /// Original environment, passed through for allowlist filtering.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub fs_deny: Vec<String>,
    #[serde(default)]
    pub fs_allow_ro: Vec<String>,
    #[serde(default)]
    pub fs_allow_rw: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace: String,
    pub workspace_rw: bool,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Build the sandboxed child command.
///
/// `self_path` is the firewall's own binary. The returned command has a
/// cleared environment (only the config variable), piped-stdio left to the
/// caller, and, on Linux with user namespaces available and network
/// disabled, a `pre_exec` hook that moves the child into fresh user and
/// network namespaces with a 1:1 uid/gid mapping.
pub fn build_sandboxed_command(
    self_path: &Path,
    profile: &SandboxProfile,
    caps: &Capabilities,
    command: &str,
    args: &[String],
    env: &[String],
    workspace: &str,
) -> Result<Command, FirewallError> {
    // The strict profile promises a filesystem allowlist; without Landlock
    // that promise cannot be kept.
    if profile.name == "strict" && !caps.landlock {
        return Err(FirewallError::Sandbox(format!(
            "sandbox profile {:?} requires Landlock support, but it is not available",
            profile.name
        )));
    }

    let payload = SandboxExecConfig {
        network: profile.network,
        env_allowlist: profile.env_allowlist.clone(),
        env: env.to_vec(),
        fs_deny: profile.fs_deny.clone(),
        fs_allow_ro: profile.fs_allow_ro.clone(),
        fs_allow_rw: profile.fs_allow_rw.clone(),
        workspace: workspace.to_string(),
        workspace_rw: profile.workspace == WorkspaceMode::Rw,
        command: command.to_string(),
        args: args.to_vec(),
    };

    let config_json = serde_json::to_string(&payload)
        .map_err(|e| FirewallError::Sandbox(format!("serializing sandbox config: {e}")))?;

    let mut cmd = Command::new(self_path);
    cmd.arg(SANDBOX_SENTINEL).arg("--").arg(command).args(args);
    cmd.env_clear();
    cmd.env(SANDBOX_CONFIG_ENV, config_json);

    apply_namespace_isolation(&mut cmd, profile, caps);

    Ok(cmd)
}

/// On Linux, request new user + network namespaces when the host supports
/// unprivileged user namespaces and the profile disables network access.
#[cfg(target_os = "linux")]
fn apply_namespace_isolation(cmd: &mut Command, profile: &SandboxProfile, caps: &Capabilities) {
    if !caps.user_namespace || profile.network {
        return;
    }

    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };

    // Runs in the forked child, before the re-exec: everything after this
    // point (including the entrypoint and the downstream) lives inside the
    // new namespaces.
    unsafe {
        cmd.pre_exec(move || enter_isolated_namespaces(uid, gid));
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_namespace_isolation(_cmd: &mut Command, _profile: &SandboxProfile, _caps: &Capabilities) {}

/// Unshare into new user + network namespaces and install the 1:1 mapping
/// (container-uid 0 ↔ invoker). `setgroups` must be denied before the gid
/// map can be written.
#[cfg(target_os = "linux")]
fn enter_isolated_namespaces(uid: libc::uid_t, gid: libc::gid_t) -> std::io::Result<()> {
    if unsafe { libc::unshare(libc::CLONE_NEWUSER | libc::CLONE_NEWNET) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    std::fs::write("/proc/self/setgroups", "deny")?;
    std::fs::write("/proc/self/uid_map", format!("0 {uid} 1"))?;
    std::fs::write("/proc/self/gid_map", format!("0 {gid} 1"))?;
    Ok(())
}

// ============================================================
// Tests
// ============================================================
