/// First-match policy engine for the MCP firewall.
///
/// - `expr`: a sandboxed, side-effect-free boolean expression language over
///   a declared set of root variables, compiled once at startup
/// - `engine`: rule compilation and first-match evaluation, fail-closed on
///   any evaluation error or non-boolean result
pub mod engine;
pub mod expr;

pub use engine::{PolicyEngine, RequestContext, ResourceContext, ToolContext, Verdict};
pub use expr::{compile, CompiledExpr, ExprError};
