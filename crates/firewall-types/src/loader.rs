//! Config loading and resolution.
//!
//! The full pipeline, run once at startup:
//! 1. Load the global config file (YAML, with optional named profiles).
//! 2. Resolve the requested profile into a single `Config` and validate it.
//! 3. Stamp provenance on base policy rules and redaction patterns.
//! 4. If a workspace is set, find `.mcp-firewall.{yaml,yml,json}` and merge
//!    the local override (append-and-tighten; expansion is gated).
//!
//! The result is immutable for the life of the process.

use std::path::{Path, PathBuf};

use crate::config::{Config, GlobalConfig, LocalOverride, PolicyDefault};
use crate::errors::FirewallError;

/// Filenames checked in a workspace directory, in priority order.
const LOCAL_OVERRIDE_NAMES: [&str; 3] = [
    ".mcp-firewall.yaml",
    ".mcp-firewall.yml",
    ".mcp-firewall.json",
];

/// The effective config plus provenance metadata.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Config,
    /// Resolved profile name ("" for the inline default).
    pub profile_name: String,
    /// Path to the merged local override file, if one was found.
    pub local_override: Option<PathBuf>,
}

/// Probe for the deprecated singular `downstream:` key.
#[derive(Debug, Default, serde::Deserialize)]
struct LegacyProbe {
    downstream: Option<serde_yaml::Value>,
}

/// Load the global config file.
pub fn load_global(path: &Path) -> Result<GlobalConfig, FirewallError> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        FirewallError::Config(format!("reading config {}: {e}", path.display()))
    })?;

    if let Ok(old) = serde_yaml::from_str::<LegacyProbe>(&data) {
        if old.downstream.is_some() {
            return Err(FirewallError::Config(format!(
                "parsing config {}: old format detected — use 'downstreams:' (plural map) instead of 'downstream:'",
                path.display()
            )));
        }
    }

    serde_yaml::from_str(&data)
        .map_err(|e| FirewallError::Config(format!("parsing config {}: {e}", path.display())))
}

/// Resolve a profile name against a global config.
///
/// An empty name selects the inline default config. A named profile must
/// exist in the `profiles` map.
pub fn resolve_profile(gc: &GlobalConfig, name: &str) -> Result<(Config, String), FirewallError> {
    if name.is_empty() {
        return Ok((gc.base.clone(), String::new()));
    }
    match gc.profiles.get(name) {
        Some(cfg) => Ok((cfg.clone(), name.to_string())),
        None => Err(FirewallError::Config(format!(
            "profile {name:?} is not defined in the config file"
        ))),
    }
}

/// Run the full resolution pipeline; see the module docs.
pub fn resolve(
    config_path: &Path,
    profile_name: &str,
    workspace: Option<&Path>,
) -> Result<ResolvedConfig, FirewallError> {
    let gc = load_global(config_path)?;

    let (mut cfg, resolved_profile) = resolve_profile(&gc, profile_name)?;
    cfg.validate()
        .map_err(|e| FirewallError::Config(format!("validating resolved config: {e}")))?;

    // Stamp provenance on base rules and patterns.
    let source = if resolved_profile.is_empty() {
        "base".to_string()
    } else {
        format!("profile:{resolved_profile}")
    };
    for rule in &mut cfg.policy.rules {
        if rule.source.is_none() {
            rule.source = Some(source.clone());
        }
    }
    for pattern in &mut cfg.redaction.patterns {
        if pattern.source.is_none() {
            pattern.source = Some(source.clone());
        }
    }

    let mut result = ResolvedConfig {
        config: cfg,
        profile_name: resolved_profile,
        local_override: None,
    };

    if let Some(ws) = workspace {
        if let Some(local_path) = find_local_override(ws) {
            let local = load_local(&local_path)?;
            merge_local(&mut result.config, local, gc.allow_expansion).map_err(|e| {
                FirewallError::Config(format!(
                    "merging local override {}: {e}",
                    local_path.display()
                ))
            })?;
            result.local_override = Some(local_path);
        }
    }

    Ok(result)
}

/// Check a directory for a local override file.
pub fn find_local_override(dir: &Path) -> Option<PathBuf> {
    LOCAL_OVERRIDE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Walk up from `start` looking for a directory holding a local override file.
pub fn detect_workspace(start: &Path) -> Option<PathBuf> {
    let mut dir = std::fs::canonicalize(start).ok()?;
    loop {
        if find_local_override(&dir).is_some() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load a local override file (YAML or JSON by extension).
pub fn load_local(path: &Path) -> Result<LocalOverride, FirewallError> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        FirewallError::Config(format!("reading local override {}: {e}", path.display()))
    })?;

    let local = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&data).map_err(|e| {
            FirewallError::Config(format!("parsing local override {}: {e}", path.display()))
        })?
    } else {
        serde_yaml::from_str(&data).map_err(|e| {
            FirewallError::Config(format!("parsing local override {}: {e}", path.display()))
        })?
    };

    Ok(local)
}

/// Merge a local override into a resolved config.
///
/// Rules and patterns are appended with `source: "local"`. The policy default
/// may be tightened from allow to deny but never loosened. Adding downstreams
/// or sandbox profiles requires `allow_expansion`.
pub fn merge_local(
    cfg: &mut Config,
    local: LocalOverride,
    allow_expansion: bool,
) -> Result<(), FirewallError> {
    if let Some(default) = local.policy.default {
        match (cfg.policy.effective_default(), default) {
            (PolicyDefault::Allow, PolicyDefault::Deny) => {
                cfg.policy.default = Some(PolicyDefault::Deny);
            }
            (PolicyDefault::Deny, PolicyDefault::Allow) => {
                return Err(FirewallError::Config(
                    "local override cannot loosen policy default from deny to allow".to_string(),
                ));
            }
            _ => {}
        }
    }

    let existing: std::collections::HashSet<String> =
        cfg.policy.rules.iter().map(|r| r.name.clone()).collect();
    for mut rule in local.policy.rules {
        if existing.contains(&rule.name) {
            return Err(FirewallError::Config(format!(
                "local rule {:?} duplicates a resolved rule name",
                rule.name
            )));
        }
        rule.source = Some("local".to_string());
        cfg.policy.rules.push(rule);
    }

    for mut pattern in local.redaction.patterns {
        pattern.source = Some("local".to_string());
        cfg.redaction.patterns.push(pattern);
    }

    if !local.downstreams.is_empty() || !local.sandbox_profiles.is_empty() {
        if !allow_expansion {
            return Err(FirewallError::Config(
                "local override adds downstreams or sandbox profiles, but the global config does not set allow_expansion".to_string(),
            ));
        }
        for (alias, sc) in local.downstreams {
            cfg.downstreams.insert(alias, sc);
        }
        for (name, profile) in local.sandbox_profiles {
            cfg.sandbox_profiles.insert(name, profile);
        }
    }

    // Re-validate: the merge may have introduced new aliases, regexes, or
    // profile references.
    cfg.validate()
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    const VALID_CONFIG: &str = r#"
downstreams:
  echoserver:
    command: ./testdata/echoserver
    args: ["--verbose"]
    env: ["FOO=bar"]
  another:
    command: ./another-server
policy:
  default: deny
  rules:
    - name: allow-echo
      expression: 'server == "echoserver"'
      effect: allow
log_level: debug
"#;

    #[test]
    fn test_load_global_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "config.yaml", VALID_CONFIG);

        let gc = load_global(&path).unwrap();
        assert_eq!(gc.base.downstreams.len(), 2);
        let echo = &gc.base.downstreams["echoserver"];
        assert_eq!(echo.command, "./testdata/echoserver");
        assert_eq!(echo.args, vec!["--verbose"]);
        assert_eq!(echo.env, vec!["FOO=bar"]);
        assert_eq!(gc.base.log_level, "debug");
    }

    #[test]
    fn test_load_global_not_found() {
        let err = load_global(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn test_load_global_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "config.yaml", "downstreams: [not: a: map");
        assert!(load_global(&path).is_err());
    }

    #[test]
    fn test_load_global_old_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "config.yaml",
            "downstream:\n  command: echo\n",
        );
        let err = load_global(&path).unwrap_err();
        assert!(err.to_string().contains("downstreams"));
    }

    #[test]
    fn test_resolve_profile_default_and_named() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "config.yaml",
            r#"
downstreams:
  base:
    command: echo
profiles:
  work:
    downstreams:
      worksrv:
        command: work-server
"#,
        );
        let gc = load_global(&path).unwrap();

        let (cfg, name) = resolve_profile(&gc, "").unwrap();
        assert_eq!(name, "");
        assert!(cfg.downstreams.contains_key("base"));

        let (cfg, name) = resolve_profile(&gc, "work").unwrap();
        assert_eq!(name, "work");
        assert!(cfg.downstreams.contains_key("worksrv"));

        let err = resolve_profile(&gc, "nope").unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_resolve_stamps_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "config.yaml", VALID_CONFIG);

        let resolved = resolve(&path, "", None).unwrap();
        assert_eq!(
            resolved.config.policy.rules[0].source.as_deref(),
            Some("base")
        );
    }

    #[test]
    fn test_resolve_profile_provenance_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "config.yaml",
            r#"
profiles:
  work:
    downstreams:
      srv:
        command: echo
    policy:
      rules:
        - name: r1
          expression: "true"
          effect: allow
"#,
        );
        let resolved = resolve(&path, "work", None).unwrap();
        assert_eq!(resolved.profile_name, "work");
        assert_eq!(
            resolved.config.policy.rules[0].source.as_deref(),
            Some("profile:work")
        );
    }

    #[test]
    fn test_detect_workspace_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), ".mcp-firewall.yaml", "policy: {}\n");
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = detect_workspace(&nested).unwrap();
        assert_eq!(found, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_local_override_appends_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "config.yaml", VALID_CONFIG);
        let ws = tempfile::tempdir().unwrap();
        write_config(
            ws.path(),
            ".mcp-firewall.yaml",
            r#"
policy:
  rules:
    - name: local-block
      expression: 'tool.name == "rm"'
      effect: deny
"#,
        );

        let resolved = resolve(&path, "", Some(ws.path())).unwrap();
        assert!(resolved.local_override.is_some());
        let rules = &resolved.config.policy.rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].name, "local-block");
        assert_eq!(rules[1].source.as_deref(), Some("local"));
    }

    #[test]
    fn test_local_override_cannot_loosen_default() {
        let mut cfg = Config {
            downstreams: {
                let mut m = std::collections::BTreeMap::new();
                m.insert(
                    "srv".to_string(),
                    crate::config::ServerConfig {
                        command: "echo".to_string(),
                        ..Default::default()
                    },
                );
                m
            },
            ..Default::default()
        };
        cfg.validate().unwrap();

        let local = LocalOverride {
            policy: crate::config::PolicyConfig {
                default: Some(PolicyDefault::Allow),
                rules: vec![],
            },
            ..Default::default()
        };
        let err = merge_local(&mut cfg, local, false).unwrap_err();
        assert!(err.to_string().contains("loosen"));
    }

    #[test]
    fn test_local_override_expansion_gated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "config.yaml", VALID_CONFIG);
        let ws = tempfile::tempdir().unwrap();
        write_config(
            ws.path(),
            ".mcp-firewall.yaml",
            "downstreams:\n  extra:\n    command: extra-server\n",
        );

        let err = resolve(&path, "", Some(ws.path())).unwrap_err();
        assert!(err.to_string().contains("allow_expansion"));
    }

    #[test]
    fn test_local_override_expansion_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "config.yaml",
            &format!("allow_expansion: true\n{VALID_CONFIG}"),
        );
        let ws = tempfile::tempdir().unwrap();
        write_config(
            ws.path(),
            ".mcp-firewall.yaml",
            "downstreams:\n  extra:\n    command: extra-server\n",
        );

        let resolved = resolve(&path, "", Some(ws.path())).unwrap();
        assert!(resolved.config.downstreams.contains_key("extra"));
    }

    #[test]
    fn test_local_override_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "config.yaml", VALID_CONFIG);
        let ws = tempfile::tempdir().unwrap();
        write_config(
            ws.path(),
            ".mcp-firewall.json",
            r#"{"redaction": {"patterns": [{"name": "key", "pattern": "sk-[a-z0-9]+"}]}}"#,
        );

        let resolved = resolve(&path, "", Some(ws.path())).unwrap();
        let patterns = &resolved.config.redaction.patterns;
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].source.as_deref(), Some("local"));
    }

    #[test]
    fn test_local_rule_name_collision() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "config.yaml", VALID_CONFIG);
        let ws = tempfile::tempdir().unwrap();
        write_config(
            ws.path(),
            ".mcp-firewall.yaml",
            r#"
policy:
  rules:
    - name: allow-echo
      expression: "true"
      effect: deny
"#,
        );

        let err = resolve(&path, "", Some(ws.path())).unwrap_err();
        assert!(err.to_string().contains("duplicates"));
    }
}
