/// The MCP proxy multiplexer.
///
/// Aggregates many downstream MCP servers behind a single upstream face:
/// - **Namespacing** (`namespace`): the `alias__name` scheme
/// - **Sessions** (`session`): JSON-RPC client sessions over downstream stdio
/// - **Proxy** (`proxy`): downstream lifecycle, request routing, policy
///   enforcement, redaction, audit
/// - **Upstream server** (`server`): the newline-delimited JSON-RPC loop on
///   the proxy's own stdio
/// - **Introspection** (`explain`): the `explain_effective_policy` tool
pub mod explain;
pub mod namespace;
pub mod proxy;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use proxy::{DownstreamEntry, Proxy};
pub use server::{serve, serve_stdio};
pub use session::Session;
