//! Sandbox profile model and resolution.

use std::collections::BTreeMap;

use firewall_types::{FirewallError, SandboxProfileConfig, WorkspaceMode};

/// A resolved runtime sandbox profile.
#[derive(Debug, Clone)]
pub struct SandboxProfile {
    pub name: String,
    /// Whether the child keeps network access.
    pub network: bool,
    /// Environment variable names passed through to the child.
    pub env_allowlist: Vec<String>,
    /// Paths the profile promises the child will not see. Landlock enforces
    /// by allowlist, so these are validated against the allow lists rather
    /// than translated into kernel rules.
    pub fs_deny: Vec<String>,
    /// Subtrees readable and executable by the child.
    pub fs_allow_ro: Vec<String>,
    /// Subtrees writable by the child.
    pub fs_allow_rw: Vec<String>,
    /// Workspace access mode.
    pub workspace: WorkspaceMode,
}

/// The built-in `strict` profile: network off, workspace read-only, a fixed
/// allowlist of system paths, `/tmp` and the usual device nodes writable,
/// credential directories denied, and a minimal env allowlist.
pub fn strict_profile() -> SandboxProfile {
    SandboxProfile {
        name: "strict".to_string(),
        network: false,
        env_allowlist: [
            "PATH", "HOME", "LANG", "LC_ALL", "TERM", "TMPDIR", "TZ", "USER", "SHELL",
        ]
        .map(String::from)
        .to_vec(),
        fs_deny: [
            "~/.ssh",
            "~/.gnupg",
            "~/.aws",
            "~/.config/gcloud",
            "~/.kube",
        ]
        .map(String::from)
        .to_vec(),
        fs_allow_ro: [
            "/usr",
            "/lib",
            "/lib64",
            "/bin",
            "/sbin",
            "/etc/ssl",
            "/etc/ca-certificates",
            "/etc/ld.so.cache",
            "/etc/ld.so.conf",
            "/etc/ld.so.conf.d",
            "/etc/nsswitch.conf",
            "/etc/passwd",
            "/etc/group",
            "/etc/localtime",
            "/etc/resolv.conf",
            "/proc/self",
            "/dev/fd",
        ]
        .map(String::from)
        .to_vec(),
        fs_allow_rw: ["/tmp", "/dev/null", "/dev/zero", "/dev/urandom", "/dev/random"]
            .map(String::from)
            .to_vec(),
        workspace: WorkspaceMode::Ro,
    }
}

/// Resolve a profile name to a runtime profile.
///
/// The sentinel for "no sandbox" is the empty string, which callers handle
/// before reaching this function; `"none"` in config means "disabled" and is
/// likewise rejected here. `"strict"` returns the built-in; anything else is
/// looked up in the custom profile map.
pub fn resolve_profile(
    name: &str,
    custom: &BTreeMap<String, SandboxProfileConfig>,
) -> Result<SandboxProfile, FirewallError> {
    if name.is_empty() {
        return Err(FirewallError::Sandbox(
            "sandbox profile name must not be empty".to_string(),
        ));
    }
    if name == "none" {
        return Err(FirewallError::Sandbox(
            "\"none\" is not a valid sandbox profile (use the empty string to disable)"
                .to_string(),
        ));
    }
    if name == "strict" {
        return Ok(strict_profile());
    }

    let Some(cfg) = custom.get(name) else {
        return Err(FirewallError::Sandbox(format!(
            "unknown sandbox profile {name:?}"
        )));
    };

    Ok(SandboxProfile {
        name: name.to_string(),
        network: cfg.network.unwrap_or(false),
        env_allowlist: cfg.env_allowlist.clone(),
        fs_deny: cfg.fs_deny.clone(),
        fs_allow_ro: cfg.fs_allow_ro.clone(),
        fs_allow_rw: cfg.fs_allow_rw.clone(),
        workspace: cfg.workspace.unwrap_or(WorkspaceMode::Ro),
    })
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_profile_defaults() {
        let p = strict_profile();

        assert_eq!(p.name, "strict");
        assert!(!p.network);
        assert_eq!(p.workspace, WorkspaceMode::Ro);

        // Must deny credential dirs.
        assert!(p.fs_deny.contains(&"~/.ssh".to_string()));
        assert!(p.fs_deny.contains(&"~/.gnupg".to_string()));
        assert!(p.fs_deny.contains(&"~/.aws".to_string()));

        // Must allow common system dirs RO.
        assert!(p.fs_allow_ro.contains(&"/usr".to_string()));
        assert!(p.fs_allow_ro.contains(&"/bin".to_string()));

        // Must allow /tmp RW.
        assert!(p.fs_allow_rw.contains(&"/tmp".to_string()));

        // Must have a reasonable env allowlist.
        assert!(p.env_allowlist.contains(&"PATH".to_string()));
        assert!(p.env_allowlist.contains(&"HOME".to_string()));
    }

    #[test]
    fn test_resolve_strict() {
        let p = resolve_profile("strict", &BTreeMap::new()).unwrap();
        assert_eq!(p.name, "strict");
        assert!(!p.network);
    }

    #[test]
    fn test_resolve_none_rejected() {
        let err = resolve_profile("none", &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("none"));
    }

    #[test]
    fn test_resolve_empty_rejected() {
        assert!(resolve_profile("", &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_resolve_custom() {
        let mut custom = BTreeMap::new();
        custom.insert(
            "my-profile".to_string(),
            SandboxProfileConfig {
                network: Some(true),
                env_allowlist: vec!["PATH".to_string(), "DATABASE_URL".to_string()],
                fs_deny: vec!["~/.ssh".to_string()],
                fs_allow_ro: vec!["/usr".to_string(), "/lib".to_string()],
                fs_allow_rw: vec!["/tmp".to_string(), "/var/data".to_string()],
                workspace: Some(WorkspaceMode::Rw),
            },
        );

        let p = resolve_profile("my-profile", &custom).unwrap();
        assert_eq!(p.name, "my-profile");
        assert!(p.network);
        assert_eq!(p.env_allowlist, vec!["PATH", "DATABASE_URL"]);
        assert_eq!(p.fs_deny, vec!["~/.ssh"]);
        assert_eq!(p.fs_allow_ro, vec!["/usr", "/lib"]);
        assert_eq!(p.fs_allow_rw, vec!["/tmp", "/var/data"]);
        assert_eq!(p.workspace, WorkspaceMode::Rw);
    }

    #[test]
    fn test_resolve_custom_defaults() {
        let mut custom = BTreeMap::new();
        custom.insert(
            "minimal".to_string(),
            SandboxProfileConfig {
                env_allowlist: vec!["PATH".to_string()],
                ..Default::default()
            },
        );

        let p = resolve_profile("minimal", &custom).unwrap();
        assert!(!p.network);
        assert_eq!(p.workspace, WorkspaceMode::Ro);
    }

    #[test]
    fn test_resolve_unknown() {
        let err = resolve_profile("nonexistent", &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }
}
