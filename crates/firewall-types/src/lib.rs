/// Shared types, traits, and errors for the MCP firewall.
///
/// This crate is the foundation that all other firewall crates depend on.
/// It contains:
/// - **Error types** (`errors`) for unified error handling
/// - **Config types** (`config`) for the YAML configuration model and validation
/// - **Config loading** (`loader`) for profile resolution and local overrides
/// - **Wire types** (`wire`) for JSON-RPC 2.0 and MCP payloads
/// - **Trait contracts** (`traits`) for the pluggable seams
pub mod config;
pub mod errors;
pub mod loader;
pub mod traits;
pub mod wire;

// Re-export commonly used types at the crate root for convenience.
pub use config::*;
pub use errors::FirewallError;
pub use traits::*;
pub use wire::*;
