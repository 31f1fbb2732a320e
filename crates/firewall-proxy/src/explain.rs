//! The `explain_effective_policy` built-in tool.
//!
//! Reflects the proxy's resolved state back to the caller as one JSON
//! document: profile and local-override provenance, policy rules with their
//! sources, redaction patterns, timeouts and limits, sandbox capabilities
//! with per-alias profile assignments, and the supply-chain view.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use firewall_types::{CallToolResult, FirewallError, PolicyRule, RedactionPattern};

use crate::proxy::Proxy;

#[derive(Debug, Serialize)]
struct ExplainOutput<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    profile: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_override: Option<String>,
    policy: ExplainPolicy<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redaction: Option<ExplainRedaction<'a>>,
    timeout: &'a str,
    approval_timeout: &'a str,
    max_output_bytes: usize,
    log_level: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sandbox: Option<ExplainSandbox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    supply_chain: Option<ExplainSupplyChain<'a>>,
}

#[derive(Debug, Serialize)]
struct ExplainPolicy<'a> {
    default: String,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    rules: &'a [PolicyRule],
}

#[derive(Debug, Serialize)]
struct ExplainRedaction<'a> {
    patterns: &'a [RedactionPattern],
}

#[derive(Debug, Serialize)]
struct ExplainSandbox {
    capabilities: ExplainSandboxCaps,
    /// alias → profile name ("none" when unsandboxed).
    downstreams: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ExplainSandboxCaps {
    user_namespace: bool,
    landlock: bool,
    landlock_abi: i32,
    level: String,
}

#[derive(Debug, Serialize)]
struct ExplainSupplyChain<'a> {
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    allowed_paths: &'a [String],
    downstreams: BTreeMap<String, ExplainDownstreamSupply>,
}

#[derive(Debug, Serialize)]
struct ExplainDownstreamSupply {
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    computed_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_path: Option<String>,
}

impl Proxy {
    /// Handle a call to the introspection tool.
    pub(crate) fn handle_explain(&self) -> Result<Value, FirewallError> {
        let cfg = self.config();

        let sandbox = self.build_sandbox_view();
        let supply_chain = self.build_supply_view();

        let output = ExplainOutput {
            profile: self.profile_name(),
            local_override: self
                .local_override()
                .map(|p| p.to_string_lossy().into_owned()),
            policy: ExplainPolicy {
                default: cfg.policy.effective_default().to_string(),
                rules: &cfg.policy.rules,
            },
            redaction: if cfg.redaction.patterns.is_empty() {
                None
            } else {
                Some(ExplainRedaction {
                    patterns: &cfg.redaction.patterns,
                })
            },
            timeout: &cfg.timeout,
            approval_timeout: &cfg.approval_timeout,
            max_output_bytes: cfg.max_output_bytes,
            log_level: &cfg.log_level,
            sandbox,
            supply_chain,
        };

        let text = serde_json::to_string_pretty(&output)?;
        Ok(serde_json::to_value(CallToolResult::text(text))?)
    }

    fn build_sandbox_view(&self) -> Option<ExplainSandbox> {
        let mut downstreams = BTreeMap::new();
        let mut any_sandboxed = false;
        for (alias, sc) in &self.config().downstreams {
            match sc.sandbox_profile() {
                Some(profile) => {
                    any_sandboxed = true;
                    downstreams.insert(alias.clone(), profile.to_string());
                }
                None => {
                    downstreams.insert(alias.clone(), "none".to_string());
                }
            }
        }
        if !any_sandboxed {
            return None;
        }

        let caps = self.capabilities();
        Some(ExplainSandbox {
            capabilities: ExplainSandboxCaps {
                user_namespace: caps.user_namespace,
                landlock: caps.landlock,
                landlock_abi: caps.landlock_abi,
                level: caps.effective_level().to_string(),
            },
            downstreams,
        })
    }

    fn build_supply_view(&self) -> Option<ExplainSupplyChain<'_>> {
        let cfg = self.config();
        let any_configured = !cfg.supply_chain.allowed_paths.is_empty()
            || cfg.downstreams.values().any(|sc| sc.hash.is_some());
        if !any_configured {
            return None;
        }

        let mut downstreams = BTreeMap::new();
        for (alias, sc) in &cfg.downstreams {
            let entry = self.downstreams().get(alias);
            downstreams.insert(
                alias.clone(),
                ExplainDownstreamSupply {
                    hash: sc.hash.clone(),
                    computed_hash: entry.and_then(|e| e.computed_hash.clone()),
                    resolved_path: entry.map(|e| e.resolved_path.to_string_lossy().into_owned()),
                },
            );
        }

        Some(ExplainSupplyChain {
            allowed_paths: &cfg.supply_chain.allowed_paths,
            downstreams,
        })
    }
}

// ============================================================
// Tests
// ============================================================
