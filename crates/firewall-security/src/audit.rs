//! Per-request audit records.
//!
//! An `AuditInfo` is attached to each inbound request before handler
//! dispatch and populated by whichever component holds the fact: the router
//! fills `server` and `tool_name`, the policy engine fills `policy_effect`
//! and `policy_rule`. When the handler returns, one structured JSON record
//! is emitted. Audit fields are present only when the underlying fact was
//! populated; their absence is not an error.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

/// Mutable per-request audit state, shared between the middleware and the
/// handlers that fill it in.
#[derive(Debug, Clone, Default)]
pub struct AuditInfo {
    pub server: Option<String>,
    pub tool_name: Option<String>,
    pub policy_effect: Option<String>,
    pub policy_rule: Option<String>,
}

/// Handle passed through the request path.
pub type SharedAuditInfo = Arc<Mutex<AuditInfo>>;

/// Create a fresh audit handle for one request.
pub fn new_shared() -> SharedAuditInfo {
    Arc::new(Mutex::new(AuditInfo::default()))
}

/// The emitted record. Optional fields are omitted, not nulled.
#[derive(Debug, Serialize)]
pub struct AuditRecord<'a> {
    pub method: &'a str,
    pub direction: &'a str,
    pub duration_ms: u64,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_effect: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_rule: Option<&'a str>,
}

impl<'a> AuditRecord<'a> {
    pub fn new(method: &'a str, duration: Duration, error: bool, info: &'a AuditInfo) -> Self {
        Self {
            method,
            direction: "request",
            duration_ms: duration.as_millis() as u64,
            error,
            server: info.server.as_deref(),
            tool: info.tool_name.as_deref(),
            policy_effect: info.policy_effect.as_deref(),
            policy_rule: info.policy_rule.as_deref(),
        }
    }

    /// The JSON line this record emits.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Emit one audit record for a completed request.
pub fn emit(method: &str, duration: Duration, error: bool, info: &AuditInfo) {
    let record = AuditRecord::new(method, duration, error, info);
    info!(target: "audit", record = %record.to_json(), "request complete");
}

// ============================================================
// Tests
// ============================================================
