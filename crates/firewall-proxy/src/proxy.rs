//! The proxy multiplexer.
//!
//! Wires all subsystems into the enforcement pipeline: supply verification →
//! sandboxed spawn → session connect at startup, then per request:
//! namespace parse → policy verdict → (approval) → forward → truncate →
//! redact → audit. Downstream state is built once at startup and read-only
//! afterwards; only the resource-URI routing table mutates at runtime.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use firewall_policy::{PolicyEngine, RequestContext, ResourceContext, ToolContext};
use firewall_sandbox::{
    build_sandboxed_command, detect_capabilities, resolve_profile, Capabilities, IsolationLevel,
};
use firewall_security::{Redactor, SharedAuditInfo};
use firewall_types::loader::ResolvedConfig;
use firewall_types::{
    ApprovalHandler, ApprovalRequest, CallToolResult, Config, Content, DenyAllApprovals, Effect,
    FirewallError, JsonRpcMessage, ListResourcesResult, ListToolsResult, ReadResourceResult,
    ToolDef, INTERNAL_ERROR, INVALID_PARAMS, MCP_PROTOCOL_VERSION, METHOD_NOT_FOUND,
};

use crate::namespace::{namespaced_name, split_namespaced};
use crate::session::Session;

/// Name of the built-in introspection tool.
pub const EXPLAIN_TOOL_NAME: &str = "explain_effective_policy";

/// One connected downstream with its verification results.
pub struct DownstreamEntry {
    pub session: Session,
    pub resolved_path: PathBuf,
    pub computed_hash: Option<String>,
    /// Sandbox profile name, `None` when unsandboxed.
    pub sandbox_profile: Option<String>,
    pub timeout: Duration,
}

/// The aggregating proxy.
pub struct Proxy {
    cfg: Config,
    profile_name: String,
    local_override: Option<PathBuf>,
    workspace: Option<PathBuf>,
    capabilities: Capabilities,
    engine: PolicyEngine,
    redactor: Redactor,
    approval: Arc<dyn ApprovalHandler>,
    downstreams: HashMap<String, DownstreamEntry>,
    /// resource URI → alias, learned from `resources/list` responses.
    resource_routes: RwLock<HashMap<String, String>>,
}

impl Proxy {
    /// Build a proxy from a resolved config. Compiles policy rules and
    /// redaction patterns; downstreams connect in [`connect_downstreams`].
    pub fn new(
        resolved: ResolvedConfig,
        workspace: Option<PathBuf>,
        approval: Option<Arc<dyn ApprovalHandler>>,
    ) -> Result<Self, FirewallError> {
        let engine = PolicyEngine::new(&resolved.config.policy)?;
        let redactor = Redactor::new(&resolved.config.redaction)?;
        let capabilities = detect_capabilities();

        Ok(Self {
            cfg: resolved.config,
            profile_name: resolved.profile_name,
            local_override: resolved.local_override,
            workspace,
            capabilities,
            engine,
            redactor,
            approval: approval.unwrap_or_else(|| Arc::new(DenyAllApprovals)),
            downstreams: HashMap::new(),
            resource_routes: RwLock::new(HashMap::new()),
        })
    }

    /// Verify, spawn, and connect every configured downstream.
    ///
    /// Any failure aborts startup: a downstream whose pinned hash mismatches
    /// its binary must never be spawned.
    pub async fn connect_downstreams(&mut self) -> Result<(), FirewallError> {
        let self_path = std::env::current_exe().map_err(|e| {
            FirewallError::Sandbox(format!("locating own binary for re-exec: {e}"))
        })?;

        let aliases: Vec<String> = self.cfg.downstreams.keys().cloned().collect();
        for alias in aliases {
            let sc = self.cfg.downstreams[&alias].clone();

            let outcome = firewall_supply::verify(
                &sc.command,
                sc.hash.as_deref(),
                &self.cfg.supply_chain.allowed_paths,
            )
            .map_err(|e| FirewallError::Supply(format!("downstream {alias:?}: {e}")))?;

            let timeout = self.cfg.resolved_timeout(&alias);
            let sandbox_profile = sc.sandbox_profile().map(str::to_string);

            let command = match &sandbox_profile {
                None => {
                    let mut cmd = tokio::process::Command::new(&outcome.resolved_path);
                    cmd.args(&sc.args);
                    for entry in &sc.env {
                        if let Some((key, value)) = entry.split_once('=') {
                            cmd.env(key, value);
                        }
                    }
                    cmd
                }
                Some(profile_name) => {
                    let profile = resolve_profile(profile_name, &self.cfg.sandbox_profiles)?;
                    let level = self.capabilities.effective_level();
                    if level != IsolationLevel::Full {
                        warn!(
                            server = %alias,
                            profile = %profile.name,
                            level = %level,
                            "sandbox running with degraded enforcement"
                        );
                    }

                    let mut env: Vec<String> =
                        std::env::vars().map(|(k, v)| format!("{k}={v}")).collect();
                    env.extend(sc.env.iter().cloned());

                    let workspace = self
                        .workspace
                        .as_ref()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default();

                    build_sandboxed_command(
                        &self_path,
                        &profile,
                        &self.capabilities,
                        &outcome.resolved_path.to_string_lossy(),
                        &sc.args,
                        &env,
                        &workspace,
                    )?
                }
            };

            let session = Session::connect_command(&alias, command, timeout).await?;
            info!(
                server = %alias,
                path = %outcome.resolved_path.display(),
                sandbox = %sandbox_profile.as_deref().unwrap_or("none"),
                "downstream connected"
            );

            self.downstreams.insert(
                alias.clone(),
                DownstreamEntry {
                    session,
                    resolved_path: outcome.resolved_path,
                    computed_hash: outcome.computed_hash,
                    sandbox_profile,
                    timeout,
                },
            );
        }

        Ok(())
    }

    // Accessors used by the explain tool.
    pub(crate) fn config(&self) -> &Config {
        &self.cfg
    }
    pub(crate) fn profile_name(&self) -> &str {
        &self.profile_name
    }
    pub(crate) fn local_override(&self) -> Option<&PathBuf> {
        self.local_override.as_ref()
    }
    pub(crate) fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
    pub(crate) fn downstreams(&self) -> &HashMap<String, DownstreamEntry> {
        &self.downstreams
    }

    // ============================================================
    // Request dispatch
    // ============================================================

    /// Handle one upstream request and produce its response message.
    pub async fn handle_request(
        &self,
        msg: &JsonRpcMessage,
        audit: &SharedAuditInfo,
    ) -> JsonRpcMessage {
        let method = msg.method.as_deref().unwrap_or("");
        let id = msg.id.clone();
        let params = msg.params.clone().unwrap_or_else(|| json!({}));

        let result = match method {
            "initialize" => self.handle_initialize(),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(&params, audit).await,
            "resources/list" => self.handle_resources_list().await,
            "resources/read" => self.handle_resources_read(&params, audit).await,
            other => {
                return JsonRpcMessage::error_response(
                    id,
                    METHOD_NOT_FOUND,
                    format!("method not found: {other}"),
                );
            }
        };

        match result {
            Ok(value) => JsonRpcMessage::response(id, value),
            Err(e) => {
                let code = match &e {
                    FirewallError::Mcp(msg) if msg.starts_with("invalid params") => INVALID_PARAMS,
                    _ => INTERNAL_ERROR,
                };
                JsonRpcMessage::error_response(id, code, e.to_string())
            }
        }
    }

    fn handle_initialize(&self) -> Result<Value, FirewallError> {
        Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {},
            },
            "serverInfo": {
                "name": "mcp-firewall",
                "version": env!("CARGO_PKG_VERSION"),
            },
        }))
    }

    // ============================================================
    // Tools
    // ============================================================

    /// Concurrently query all downstreams, namespace every tool name, and
    /// append the built-in introspection tool. A failing downstream
    /// contributes nothing beyond a log entry.
    async fn handle_tools_list(&self) -> Result<Value, FirewallError> {
        let queries = self.downstreams.iter().map(|(alias, entry)| async move {
            let result = entry
                .session
                .request("tools/list", json!({}), entry.timeout)
                .await;
            (alias.as_str(), result)
        });

        let mut tools: Vec<ToolDef> = Vec::new();
        for (alias, result) in futures::future::join_all(queries).await {
            let listed = result.and_then(|value| {
                serde_json::from_value::<ListToolsResult>(value)
                    .map_err(|e| FirewallError::Mcp(format!("parsing tools/list result: {e}")))
            });
            match listed {
                Ok(list) => {
                    for mut tool in list.tools {
                        tool.name = namespaced_name(alias, &tool.name);
                        tools.push(tool);
                    }
                }
                Err(e) => {
                    warn!(server = %alias, error = %e, "tools/list failed; omitting downstream");
                }
            }
        }

        tools.push(ToolDef {
            name: EXPLAIN_TOOL_NAME.to_string(),
            description: Some("Show the effective firewall policy with provenance".to_string()),
            input_schema: Some(json!({"type": "object"})),
            extra: serde_json::Map::new(),
        });

        Ok(serde_json::to_value(ListToolsResult { tools })?)
    }

    async fn handle_tools_call(
        &self,
        params: &Value,
        audit: &SharedAuditInfo,
    ) -> Result<Value, FirewallError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| FirewallError::Mcp("invalid params: tools/call requires a tool name".to_string()))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        if name == EXPLAIN_TOOL_NAME {
            return self.handle_explain();
        }

        let Some((alias, inner)) = split_namespaced(name) else {
            return Err(FirewallError::Mcp(format!(
                "invalid tool name {name:?}: expected <alias>__<tool>"
            )));
        };
        let Some(entry) = self.downstreams.get(alias) else {
            return Err(FirewallError::Mcp(format!(
                "unknown downstream alias {alias:?}"
            )));
        };

        {
            let mut info = audit.lock().unwrap();
            info.server = Some(alias.to_string());
            info.tool_name = Some(inner.to_string());
        }

        let request = RequestContext {
            method: "tools/call".to_string(),
            server: alias.to_string(),
            tool: ToolContext {
                name: inner.to_string(),
                arguments: arguments.as_object().cloned().unwrap_or_default(),
            },
            resource: ResourceContext::default(),
        };
        let verdict = self.engine.evaluate(&request);
        {
            let mut info = audit.lock().unwrap();
            info.policy_effect = Some(verdict.effect.to_string());
            info.policy_rule = Some(verdict.rule.clone());
        }

        match verdict.effect {
            Effect::Allow => {}
            Effect::Deny => {
                return Ok(serde_json::to_value(CallToolResult::error(denial_text(
                    &verdict.rule,
                    verdict.message.as_deref(),
                )))?);
            }
            Effect::Prompt => {
                let approved = self
                    .seek_approval(alias, inner, &verdict.rule, verdict.message.clone())
                    .await;
                if !approved {
                    return Ok(serde_json::to_value(CallToolResult::error(denial_text(
                        &verdict.rule,
                        verdict.message.as_deref(),
                    )))?);
                }
            }
        }

        let forwarded = entry
            .session
            .request(
                "tools/call",
                json!({"name": inner, "arguments": arguments}),
                entry.timeout,
            )
            .await;

        match forwarded {
            Ok(value) => {
                let result: CallToolResult = serde_json::from_value(value)
                    .map_err(|e| FirewallError::Mcp(format!("parsing tools/call result: {e}")))?;
                Ok(serde_json::to_value(self.sanitize_tool_result(result))?)
            }
            // A downstream protocol error is a tool error, not a transport
            // failure; timeouts surface the same way.
            Err(FirewallError::Mcp(message)) => {
                Ok(serde_json::to_value(CallToolResult::error(message))?)
            }
            Err(FirewallError::Timeout(message)) => {
                Ok(serde_json::to_value(CallToolResult::error(message))?)
            }
            Err(other) => Err(other),
        }
    }

    // ============================================================
    // Resources
    // ============================================================

    async fn handle_resources_list(&self) -> Result<Value, FirewallError> {
        let queries = self.downstreams.iter().map(|(alias, entry)| async move {
            let result = entry
                .session
                .request("resources/list", json!({}), entry.timeout)
                .await;
            (alias.as_str(), result)
        });

        let mut resources = Vec::new();
        let mut routes = HashMap::new();
        for (alias, result) in futures::future::join_all(queries).await {
            let listed = result.and_then(|value| {
                serde_json::from_value::<ListResourcesResult>(value).map_err(|e| {
                    FirewallError::Mcp(format!("parsing resources/list result: {e}"))
                })
            });
            match listed {
                Ok(list) => {
                    for mut resource in list.resources {
                        routes.insert(resource.uri.clone(), alias.to_string());
                        resource.name = namespaced_name(alias, &resource.name);
                        resources.push(resource);
                    }
                }
                Err(e) => {
                    warn!(server = %alias, error = %e, "resources/list failed; omitting downstream");
                }
            }
        }

        self.resource_routes.write().await.extend(routes);

        Ok(serde_json::to_value(ListResourcesResult { resources })?)
    }

    async fn handle_resources_read(
        &self,
        params: &Value,
        audit: &SharedAuditInfo,
    ) -> Result<Value, FirewallError> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| FirewallError::Mcp("invalid params: resources/read requires a uri".to_string()))?;

        let alias = self.resource_routes.read().await.get(uri).cloned();
        let Some(alias) = alias else {
            return Err(FirewallError::Mcp(format!(
                "no downstream advertises resource {uri:?} (list resources first)"
            )));
        };
        let entry = self
            .downstreams
            .get(&alias)
            .ok_or_else(|| FirewallError::Mcp(format!("unknown downstream alias {alias:?}")))?;

        audit.lock().unwrap().server = Some(alias.clone());

        let request = RequestContext {
            method: "resources/read".to_string(),
            server: alias.clone(),
            tool: ToolContext::default(),
            resource: ResourceContext {
                uri: uri.to_string(),
            },
        };
        let verdict = self.engine.evaluate(&request);
        {
            let mut info = audit.lock().unwrap();
            info.policy_effect = Some(verdict.effect.to_string());
            info.policy_rule = Some(verdict.rule.clone());
        }

        match verdict.effect {
            Effect::Allow => {}
            Effect::Deny => {
                return Err(FirewallError::Mcp(denial_text(
                    &verdict.rule,
                    verdict.message.as_deref(),
                )));
            }
            Effect::Prompt => {
                let approved = self
                    .seek_approval(&alias, uri, &verdict.rule, verdict.message.clone())
                    .await;
                if !approved {
                    return Err(FirewallError::Mcp(denial_text(
                        &verdict.rule,
                        verdict.message.as_deref(),
                    )));
                }
            }
        }

        let value = entry
            .session
            .request("resources/read", json!({"uri": uri}), entry.timeout)
            .await?;
        let mut result: ReadResourceResult = serde_json::from_value(value)
            .map_err(|e| FirewallError::Mcp(format!("parsing resources/read result: {e}")))?;

        for contents in &mut result.contents {
            if let Some(text) = contents.text.take() {
                contents.text = Some(self.redactor.redact(&text));
            }
        }

        Ok(serde_json::to_value(result)?)
    }

    // ============================================================
    // Shared plumbing
    // ============================================================

    /// Ask the approval handler, bounded by the configured approval timeout.
    /// Timeouts and handler errors count as rejection.
    async fn seek_approval(
        &self,
        server: &str,
        subject: &str,
        rule: &str,
        message: Option<String>,
    ) -> bool {
        let request = ApprovalRequest {
            server: server.to_string(),
            subject: subject.to_string(),
            rule: rule.to_string(),
            message,
        };

        let wait = self.cfg.resolved_approval_timeout();
        match tokio::time::timeout(wait, self.approval.request_approval(request)).await {
            Ok(Ok(approved)) => approved,
            Ok(Err(e)) => {
                warn!(server = %server, rule = %rule, error = %e, "approval handler failed; denying");
                false
            }
            Err(_) => {
                warn!(server = %server, rule = %rule, "approval timed out; denying");
                false
            }
        }
    }

    /// Truncate and redact every text segment of a tool result.
    fn sanitize_tool_result(&self, mut result: CallToolResult) -> CallToolResult {
        for content in &mut result.content {
            if let Content::Text(text) = content {
                if text.content_type != "text" {
                    continue;
                }
                let truncated = truncate_output(&text.text, self.cfg.max_output_bytes);
                text.text = self.redactor.redact(&truncated);
            }
        }
        result
    }

    /// Insert a pre-connected downstream; lets tests wire mock sessions.
    #[cfg(test)]
    pub(crate) fn insert_downstream(&mut self, alias: &str, session: Session, timeout: Duration) {
        self.downstreams.insert(
            alias.to_string(),
            DownstreamEntry {
                session,
                resolved_path: PathBuf::from("/unused/mock"),
                computed_hash: None,
                sandbox_profile: None,
                timeout,
            },
        );
    }
}

/// The denial text surfaced to callers: `denied by policy: <rule>`, with the
/// rule's configured message appended when present.
fn denial_text(rule: &str, message: Option<&str>) -> String {
    match message {
        Some(message) => format!("denied by policy: {rule} ({message})"),
        None => format!("denied by policy: {rule}"),
    }
}

/// Cap a text segment at `max` bytes, cutting on a char boundary.
fn truncate_output(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{} [output truncated]", &text[..end])
}

// ============================================================
// Tests
// ============================================================
