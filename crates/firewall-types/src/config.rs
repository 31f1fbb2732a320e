//! Configuration model for the MCP firewall.
//!
//! Mirrors the YAML config file structure:
//! - `downstreams`: alias → server binding (the routing table)
//! - `policy`: ordered first-match rules plus a default effect
//! - `redaction`: named regex patterns applied to outbound text
//! - `sandbox_profiles`: custom sandbox profiles (reserved names excluded)
//! - `supply_chain`: binary allowlist prefixes
//!
//! `Config::validate` checks the whole tree and fills in defaults; policy
//! expressions are compiled (and thereby validated) by the policy engine at
//! startup.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::FirewallError;

/// Aliases are the routing key and appear in every namespaced public name.
static ALIAS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("alias pattern is valid"));

/// Maximum alias length in characters.
const MAX_ALIAS_LEN: usize = 32;

/// Default forwarded-call timeout.
const DEFAULT_TIMEOUT: &str = "60s";

/// Default bound on interactive approval waits.
const DEFAULT_APPROVAL_TIMEOUT: &str = "2m";

/// Default cap on text output returned upstream (1 MiB).
const DEFAULT_MAX_OUTPUT_BYTES: usize = 1_048_576;

// ============================================================
// Downstream Servers
// ============================================================

/// One downstream MCP server binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Command to spawn (bare name searched on PATH, or an absolute path).
    pub command: String,
    /// Arguments passed to the command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Extra `KEY=VALUE` environment entries for the child.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Per-server timeout override (e.g. "30s"); global timeout when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Sandbox profile name: "none" (or absent) disables, "strict" is built in,
    /// anything else must be defined in `sandbox_profiles`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
    /// Pinned binary digest in the form `sha256:<64 hex>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl ServerConfig {
    /// The effective sandbox profile name, or `None` when sandboxing is disabled.
    pub fn sandbox_profile(&self) -> Option<&str> {
        match self.sandbox.as_deref() {
            None | Some("") | Some("none") => None,
            Some(name) => Some(name),
        }
    }
}

// ============================================================
// Policy
// ============================================================

/// Rule effects a policy rule can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Forward the request to the downstream.
    Allow,
    /// Reject the request with a policy-denial tool error.
    Deny,
    /// Ask the approval handler; deny on rejection or timeout.
    Prompt,
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
            Effect::Prompt => write!(f, "prompt"),
        }
    }
}

/// The fallback effect when no rule matches. `prompt` is not a valid default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDefault {
    Allow,
    Deny,
}

impl PolicyDefault {
    pub fn as_effect(self) -> Effect {
        match self {
            PolicyDefault::Allow => Effect::Allow,
            PolicyDefault::Deny => Effect::Deny,
        }
    }
}

impl std::fmt::Display for PolicyDefault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyDefault::Allow => write!(f, "allow"),
            PolicyDefault::Deny => write!(f, "deny"),
        }
    }
}

/// One ordered policy rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Unique rule name, reported in audit records and denial messages.
    pub name: String,
    /// Boolean expression over `{method, server, tool, resource}`.
    pub expression: String,
    /// Effect produced when the expression matches.
    pub effect: Effect,
    /// Optional human-readable message shown on denial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Provenance tag stamped at resolution time: `base`, `profile:<name>`, or `local`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Ordered rule list plus the default effect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Fallback when no rule matches; filled to `deny` by validation when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<PolicyDefault>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PolicyRule>,
}

impl PolicyConfig {
    /// The validated default effect. Callers may rely on validation having run.
    pub fn effective_default(&self) -> PolicyDefault {
        self.default.unwrap_or(PolicyDefault::Deny)
    }
}

// ============================================================
// Redaction
// ============================================================

/// One named redaction pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionPattern {
    /// Name inserted into the `[REDACTED:<name>]` marker.
    pub name: String,
    /// Regex applied to every outbound text segment.
    pub pattern: String,
    /// Provenance tag, stamped like policy rule sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<RedactionPattern>,
}

// ============================================================
// Sandbox Profiles
// ============================================================

/// Workspace access mode inside a sandbox profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceMode {
    /// Workspace mounted read-only (the default).
    Ro,
    /// Workspace writable.
    Rw,
    /// Workspace not exposed at all.
    None,
}

/// YAML-level config for a custom sandbox profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxProfileConfig {
    /// Whether the child keeps network access; defaults to false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<bool>,
    /// Environment variable names passed through to the child.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_allowlist: Vec<String>,
    /// Paths the child must never see (documentation of intent; Landlock is
    /// allowlist-only, so these must not also appear in an allow list).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fs_deny: Vec<String>,
    /// Subtrees readable (and executable) by the child.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fs_allow_ro: Vec<String>,
    /// Subtrees writable by the child.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fs_allow_rw: Vec<String>,
    /// Workspace access mode; defaults to `ro`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceMode>,
}

// ============================================================
// Supply Chain
// ============================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplyChainConfig {
    /// Directory prefixes downstream binaries must live under. Empty = no restriction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_paths: Vec<String>,
}

// ============================================================
// Top-Level Config
// ============================================================

/// A fully-specified firewall configuration (one profile's worth).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// alias → downstream binding. At least one entry is required.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub downstreams: BTreeMap<String, ServerConfig>,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sandbox_profiles: BTreeMap<String, SandboxProfileConfig>,
    #[serde(default)]
    pub supply_chain: SupplyChainConfig,
    /// Log level: debug, info, warn, error. Defaults to info.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_level: String,
    /// Global forwarded-call timeout (e.g. "60s").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    /// Cap on text output bytes returned upstream. Defaults to 1 MiB.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_output_bytes: usize,
    /// Bound on interactive `prompt` approval waits (e.g. "2m").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub approval_timeout: String,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Top-level config file structure supporting named profiles.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub profiles: BTreeMap<String, Config>,
    /// Whether a workspace-local override may add downstreams or sandbox profiles.
    #[serde(default)]
    pub allow_expansion: bool,
    #[serde(flatten)]
    pub base: Config,
}

/// A workspace-local override file (`.mcp-firewall.{yaml,yml,json}`).
///
/// Overrides may append policy rules and redaction patterns and tighten the
/// policy default; expansion (new downstreams, new sandbox profiles) requires
/// `allow_expansion: true` in the global config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalOverride {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub downstreams: BTreeMap<String, ServerConfig>,
    #[serde(default)]
    pub sandbox_profiles: BTreeMap<String, SandboxProfileConfig>,
}

impl Config {
    /// Validate the whole tree and fill in defaults.
    ///
    /// Policy expressions are compiled (and rejected if malformed) by the
    /// policy engine, which also runs at startup.
    pub fn validate(&mut self) -> Result<(), FirewallError> {
        if self.downstreams.is_empty() {
            return Err(FirewallError::Config(
                "at least one downstream is required".to_string(),
            ));
        }

        for (alias, sc) in &self.downstreams {
            validate_alias(alias)?;
            if sc.command.is_empty() {
                return Err(FirewallError::Config(format!(
                    "downstream {alias:?}: command is required"
                )));
            }
            if let Some(timeout) = &sc.timeout {
                parse_duration(timeout)
                    .map_err(|e| FirewallError::Config(format!("downstream {alias:?}: {e}")))?;
            }
        }

        if self.timeout.is_empty() {
            self.timeout = DEFAULT_TIMEOUT.to_string();
        }
        parse_duration(&self.timeout)?;

        if self.max_output_bytes == 0 {
            self.max_output_bytes = DEFAULT_MAX_OUTPUT_BYTES;
        }

        if self.approval_timeout.is_empty() {
            self.approval_timeout = DEFAULT_APPROVAL_TIMEOUT.to_string();
        }
        parse_duration(&self.approval_timeout)?;

        self.validate_policy()?;
        self.validate_redaction()?;
        self.validate_sandbox()?;
        self.validate_supply_chain()?;

        if self.log_level.is_empty() {
            self.log_level = "info".to_string();
        }
        match self.log_level.as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(FirewallError::Config(format!(
                    "log_level must be debug, info, warn, or error, got {other:?}"
                )));
            }
        }

        Ok(())
    }

    /// The validated global timeout as a `Duration`.
    pub fn resolved_timeout(&self, alias: &str) -> Duration {
        if let Some(sc) = self.downstreams.get(alias) {
            if let Some(t) = &sc.timeout {
                if let Ok(d) = parse_duration(t) {
                    return d;
                }
            }
        }
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(60))
    }

    /// The validated approval timeout as a `Duration`.
    pub fn resolved_approval_timeout(&self) -> Duration {
        parse_duration(&self.approval_timeout).unwrap_or(Duration::from_secs(120))
    }

    fn validate_policy(&mut self) -> Result<(), FirewallError> {
        if self.policy.default.is_none() {
            self.policy.default = Some(PolicyDefault::Deny);
        }

        let mut seen = std::collections::HashSet::new();
        for (i, rule) in self.policy.rules.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(FirewallError::Config(format!("rule {i}: name is required")));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(FirewallError::Config(format!(
                    "rule {i}: duplicate rule name {:?}",
                    rule.name
                )));
            }
        }
        Ok(())
    }

    fn validate_redaction(&self) -> Result<(), FirewallError> {
        let mut seen = std::collections::HashSet::new();
        for (i, p) in self.redaction.patterns.iter().enumerate() {
            if p.name.is_empty() {
                return Err(FirewallError::Config(format!(
                    "redaction pattern {i}: name is required"
                )));
            }
            if p.pattern.is_empty() {
                return Err(FirewallError::Config(format!(
                    "redaction pattern {:?}: pattern is required",
                    p.name
                )));
            }
            Regex::new(&p.pattern).map_err(|e| {
                FirewallError::Config(format!("redaction pattern {:?}: invalid regex: {e}", p.name))
            })?;
            if !seen.insert(p.name.as_str()) {
                return Err(FirewallError::Config(format!(
                    "redaction pattern {i}: duplicate name {:?}",
                    p.name
                )));
            }
        }
        Ok(())
    }

    fn validate_sandbox(&self) -> Result<(), FirewallError> {
        for (name, profile) in &self.sandbox_profiles {
            if name == "strict" || name == "none" {
                return Err(FirewallError::Config(format!(
                    "sandbox_profiles: {name:?} is a reserved profile name"
                )));
            }
            validate_sandbox_profile(name, profile)?;
        }

        for (alias, sc) in &self.downstreams {
            if let Some(profile) = sc.sandbox_profile() {
                if profile != "strict" && !self.sandbox_profiles.contains_key(profile) {
                    return Err(FirewallError::Config(format!(
                        "downstream {alias:?}: sandbox profile {profile:?} is not defined in sandbox_profiles"
                    )));
                }
            }
        }

        Ok(())
    }

    fn validate_supply_chain(&self) -> Result<(), FirewallError> {
        for (alias, sc) in &self.downstreams {
            if let Some(hash) = &sc.hash {
                validate_hash_format(hash)
                    .map_err(|e| FirewallError::Config(format!("downstream {alias:?}: {e}")))?;
            }
        }

        for path in &self.supply_chain.allowed_paths {
            if !is_abs_or_tilde(path) {
                return Err(FirewallError::Config(format!(
                    "supply_chain.allowed_paths: path {path:?} must be absolute or ~-prefixed"
                )));
            }
        }

        Ok(())
    }
}

fn validate_alias(alias: &str) -> Result<(), FirewallError> {
    if alias.is_empty() {
        return Err(FirewallError::Config(
            "downstream alias must not be empty".to_string(),
        ));
    }
    if alias.len() > MAX_ALIAS_LEN {
        return Err(FirewallError::Config(format!(
            "downstream alias {alias:?} exceeds {MAX_ALIAS_LEN} characters"
        )));
    }
    if !ALIAS_PATTERN.is_match(alias) {
        return Err(FirewallError::Config(format!(
            "downstream alias {alias:?} must match [a-zA-Z0-9_-]+"
        )));
    }
    Ok(())
}

fn validate_sandbox_profile(
    name: &str,
    p: &SandboxProfileConfig,
) -> Result<(), FirewallError> {
    for path in p.fs_deny.iter().chain(&p.fs_allow_ro).chain(&p.fs_allow_rw) {
        if !is_abs_or_tilde(path) {
            return Err(FirewallError::Config(format!(
                "sandbox_profiles[{name:?}]: path {path:?} must be absolute or ~-prefixed"
            )));
        }
    }

    // A path in a deny list must not reappear in an allow list.
    let deny: std::collections::HashSet<&str> = p.fs_deny.iter().map(String::as_str).collect();
    for a in &p.fs_allow_ro {
        if deny.contains(a.as_str()) {
            return Err(FirewallError::Config(format!(
                "sandbox_profiles[{name:?}]: path {a:?} appears in both fs_deny and fs_allow_ro"
            )));
        }
    }
    for a in &p.fs_allow_rw {
        if deny.contains(a.as_str()) {
            return Err(FirewallError::Config(format!(
                "sandbox_profiles[{name:?}]: path {a:?} appears in both fs_deny and fs_allow_rw"
            )));
        }
    }

    Ok(())
}

/// Validate the `sha256:<64 hex>` pinned hash format.
pub fn validate_hash_format(s: &str) -> Result<(), FirewallError> {
    let Some((algo, digest)) = s.split_once(':') else {
        return Err(FirewallError::Config(format!(
            "invalid hash format {s:?}: expected \"sha256:<hex>\""
        )));
    };
    if algo != "sha256" {
        return Err(FirewallError::Config(format!(
            "unsupported hash algorithm {algo:?}: only \"sha256\" is supported"
        )));
    }
    if digest.len() != 64 {
        return Err(FirewallError::Config(format!(
            "sha256 hash digest must be 64 hex characters, got {}",
            digest.len()
        )));
    }
    if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FirewallError::Config(format!("invalid hex in hash {s:?}")));
    }
    Ok(())
}

/// Whether a configured path is absolute or home-relative.
pub fn is_abs_or_tilde(path: &str) -> bool {
    path.starts_with('/') || path.starts_with("~/")
}

/// Parse a Go-style duration string ("60s", "2m", "1h30m").
pub fn parse_duration(s: &str) -> Result<Duration, FirewallError> {
    humantime::parse_duration(s)
        .map_err(|e| FirewallError::Config(format!("invalid duration {s:?}: {e}")))
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn one_downstream(alias: &str) -> BTreeMap<String, ServerConfig> {
        let mut m = BTreeMap::new();
        m.insert(
            alias.to_string(),
            ServerConfig {
                command: "echo".to_string(),
                ..Default::default()
            },
        );
        m
    }

    fn minimal_config() -> Config {
        Config {
            downstreams: one_downstream("myserver"),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_empty_downstreams() {
        let mut cfg = Config::default();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("at least one downstream"));
    }

    #[test]
    fn test_validate_invalid_aliases() {
        for alias in ["has spaces", "has.dots", "has/slashes", "has@at"] {
            let mut cfg = Config {
                downstreams: one_downstream(alias),
                ..Default::default()
            };
            let err = cfg.validate().unwrap_err();
            assert!(err.to_string().contains("alias"), "alias {alias:?}: {err}");
        }
    }

    #[test]
    fn test_validate_valid_aliases() {
        for alias in ["myserver", "my-server", "my_server", "Server1", "a", "abc-123_DEF"] {
            let mut cfg = Config {
                downstreams: one_downstream(alias),
                ..Default::default()
            };
            cfg.validate().unwrap_or_else(|e| panic!("alias {alias:?}: {e}"));
        }
    }

    #[test]
    fn test_validate_alias_too_long() {
        let mut cfg = Config {
            downstreams: one_downstream(&"a".repeat(33)),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("32"));
    }

    #[test]
    fn test_validate_missing_command() {
        let mut cfg = Config {
            downstreams: {
                let mut m = BTreeMap::new();
                m.insert("myserver".to_string(), ServerConfig::default());
                m
            },
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("command"));
    }

    #[test]
    fn test_validate_fills_defaults() {
        let mut cfg = minimal_config();
        cfg.validate().unwrap();
        assert_eq!(cfg.policy.effective_default(), PolicyDefault::Deny);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.timeout, "60s");
        assert_eq!(cfg.approval_timeout, "2m");
        assert_eq!(cfg.max_output_bytes, 1_048_576);
    }

    #[test]
    fn test_validate_bad_timeout() {
        let mut cfg = minimal_config();
        cfg.timeout = "soon".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duration"));
    }

    #[test]
    fn test_validate_per_downstream_timeout() {
        let mut cfg = minimal_config();
        cfg.downstreams.get_mut("myserver").unwrap().timeout = Some("5s".to_string());
        cfg.validate().unwrap();
        assert_eq!(cfg.resolved_timeout("myserver"), Duration::from_secs(5));
        assert_eq!(cfg.resolved_timeout("other"), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_duplicate_rule_names() {
        let mut cfg = minimal_config();
        cfg.policy.rules = vec![
            PolicyRule {
                name: "rule1".to_string(),
                expression: "true".to_string(),
                effect: Effect::Allow,
                message: None,
                source: None,
            },
            PolicyRule {
                name: "rule1".to_string(),
                expression: "true".to_string(),
                effect: Effect::Deny,
                message: None,
                source: None,
            },
        ];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_redaction_bad_regex() {
        let mut cfg = minimal_config();
        cfg.redaction.patterns = vec![RedactionPattern {
            name: "broken".to_string(),
            pattern: "([unclosed".to_string(),
            source: None,
        }];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }

    #[test]
    fn test_validate_reserved_profile_names() {
        for name in ["strict", "none"] {
            let mut cfg = minimal_config();
            cfg.sandbox_profiles
                .insert(name.to_string(), SandboxProfileConfig::default());
            let err = cfg.validate().unwrap_err();
            assert!(err.to_string().contains("reserved"), "{name}: {err}");
        }
    }

    #[test]
    fn test_validate_unknown_sandbox_reference() {
        let mut cfg = minimal_config();
        cfg.downstreams.get_mut("myserver").unwrap().sandbox = Some("missing".to_string());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_validate_sandbox_none_and_strict_accepted() {
        let mut cfg = minimal_config();
        cfg.downstreams.get_mut("myserver").unwrap().sandbox = Some("none".to_string());
        cfg.validate().unwrap();

        let mut cfg = minimal_config();
        cfg.downstreams.get_mut("myserver").unwrap().sandbox = Some("strict".to_string());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validate_deny_allow_conflict() {
        let mut cfg = minimal_config();
        cfg.sandbox_profiles.insert(
            "custom".to_string(),
            SandboxProfileConfig {
                fs_deny: vec!["/var/data".to_string()],
                fs_allow_rw: vec!["/var/data".to_string()],
                ..Default::default()
            },
        );
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("both fs_deny and fs_allow_rw"));
    }

    #[test]
    fn test_validate_relative_sandbox_path() {
        let mut cfg = minimal_config();
        cfg.sandbox_profiles.insert(
            "custom".to_string(),
            SandboxProfileConfig {
                fs_allow_ro: vec!["relative/path".to_string()],
                ..Default::default()
            },
        );
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("absolute or ~-prefixed"));
    }

    #[test]
    fn test_hash_format_valid() {
        validate_hash_format(&format!("sha256:{}", "ab".repeat(32))).unwrap();
    }

    #[test]
    fn test_hash_format_rejections() {
        assert!(validate_hash_format("nocolonhere").is_err());
        assert!(validate_hash_format("md5:abcdef").is_err());
        assert!(validate_hash_format(&format!("sha256:{}", "a".repeat(63))).is_err());
        assert!(validate_hash_format(&format!("sha256:{}", "z".repeat(64))).is_err());
    }

    #[test]
    fn test_bad_hash_on_downstream() {
        let mut cfg = minimal_config();
        cfg.downstreams.get_mut("myserver").unwrap().hash = Some("sha1:abc".to_string());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("sha256"));
    }

    #[test]
    fn test_supply_chain_relative_path() {
        let mut cfg = minimal_config();
        cfg.supply_chain.allowed_paths = vec!["bin".to_string()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("absolute or ~-prefixed"));
    }

    #[test]
    fn test_sandbox_profile_accessor() {
        let mut sc = ServerConfig::default();
        assert_eq!(sc.sandbox_profile(), None);
        sc.sandbox = Some("none".to_string());
        assert_eq!(sc.sandbox_profile(), None);
        sc.sandbox = Some(String::new());
        assert_eq!(sc.sandbox_profile(), None);
        sc.sandbox = Some("strict".to_string());
        assert_eq!(sc.sandbox_profile(), Some("strict"));
    }
}
