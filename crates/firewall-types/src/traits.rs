//! Trait contracts for the pluggable seams of the firewall.

use async_trait::async_trait;

use crate::errors::FirewallError;

/// A request for interactive approval of a `prompt` policy verdict.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    /// Alias of the downstream the call targets.
    pub server: String,
    /// Inner (un-namespaced) tool name, or the resource URI for reads.
    pub subject: String,
    /// Name of the rule that produced the prompt verdict.
    pub rule: String,
    /// Optional message configured on the rule.
    pub message: Option<String>,
}

/// Decides `prompt` verdicts.
///
/// The proxy bounds every call with the configured approval timeout; a
/// timeout counts as rejection. Implementations front whatever interactive
/// channel the embedder has (terminal, chat, web).
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Return `true` to let the request proceed.
    async fn request_approval(&self, request: ApprovalRequest) -> Result<bool, FirewallError>;
}

/// The default handler: rejects every prompt, degrading `prompt` to `deny`.
pub struct DenyAllApprovals;

#[async_trait]
impl ApprovalHandler for DenyAllApprovals {
    async fn request_approval(&self, _request: ApprovalRequest) -> Result<bool, FirewallError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deny_all_rejects() {
        let handler = DenyAllApprovals;
        let approved = handler
            .request_approval(ApprovalRequest {
                server: "echo".to_string(),
                subject: "hello".to_string(),
                rule: "needs-approval".to_string(),
                message: None,
            })
            .await
            .unwrap();
        assert!(!approved);
    }
}
