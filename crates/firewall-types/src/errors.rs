/// Unified error type for the MCP firewall.
///
/// All crates use this error type for propagation across crate boundaries.
/// Internal module errors should be converted into the appropriate variant.
#[derive(Debug, thiserror::Error)]
pub enum FirewallError {
    /// Error from configuration loading or validation.
    #[error("config error: {0}")]
    Config(String),

    /// Error from the supply chain verifier (path resolution, allowlist, hash).
    #[error("supply chain error: {0}")]
    Supply(String),

    /// Error from the sandbox (profile resolution, launcher, entrypoint, Landlock).
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// Error from the policy engine (expression compilation).
    #[error("policy error: {0}")]
    Policy(String),

    /// Error from an MCP downstream or the proxy itself.
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Transport-level failure (session dead, pipe closed).
    #[error("transport error: {0}")]
    Transport(String),

    /// Timeout waiting for a response (downstream call, human approval).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for FirewallError {
    fn from(err: serde_json::Error) -> Self {
        FirewallError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for FirewallError {
    fn from(err: serde_yaml::Error) -> Self {
        FirewallError::Serialization(err.to_string())
    }
}
