//! The policy engine: compile rules once, evaluate per request, fail closed.

use serde_json::{json, Value};
use tracing::warn;

use firewall_types::{Effect, FirewallError, PolicyConfig, PolicyDefault};

use crate::expr::{compile, CompiledExpr};

/// Root variables every rule expression is compiled against.
const DECLARED_ROOTS: [&str; 4] = ["method", "server", "tool", "resource"];

/// Tool facts bound into the evaluation context.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub name: String,
    pub arguments: serde_json::Map<String, Value>,
}

/// Resource facts bound into the evaluation context.
#[derive(Debug, Clone, Default)]
pub struct ResourceContext {
    pub uri: String,
}

/// One request as seen by the policy engine.
///
/// All four roots are always bound, so a rule referencing `resource.uri`
/// evaluates against an empty URI on tool calls instead of erroring.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub server: String,
    pub tool: ToolContext,
    pub resource: ResourceContext,
}

impl RequestContext {
    fn to_value(&self) -> Value {
        json!({
            "method": self.method,
            "server": self.server,
            "tool": {
                "name": self.tool.name,
                "arguments": Value::Object(self.tool.arguments.clone()),
            },
            "resource": {
                "uri": self.resource.uri,
            },
        })
    }
}

/// The outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub effect: Effect,
    /// Name of the deciding rule, `default:<effect>`, or `<rule>:error`.
    pub rule: String,
    /// Message configured on the deciding rule, if any.
    pub message: Option<String>,
}

#[derive(Debug)]
struct CompiledRule {
    name: String,
    effect: Effect,
    message: Option<String>,
    expr: CompiledExpr,
}

/// First-match rule evaluator.
///
/// Rules compile once at construction; evaluation walks them in declaration
/// order and stops at the first expression returning `true`. Any evaluation
/// error or non-boolean result denies immediately rather than skipping ahead
/// to a later rule: a malformed rule must not let a broad allow fire.
#[derive(Debug)]
pub struct PolicyEngine {
    rules: Vec<CompiledRule>,
    default: PolicyDefault,
}

impl PolicyEngine {
    /// Compile all rule expressions. Failure names the offending rule.
    pub fn new(cfg: &PolicyConfig) -> Result<Self, FirewallError> {
        let mut rules = Vec::with_capacity(cfg.rules.len());
        for rule in &cfg.rules {
            let expr = compile(&rule.expression, &DECLARED_ROOTS).map_err(|e| {
                FirewallError::Policy(format!(
                    "rule {:?}: invalid expression: {e}",
                    rule.name
                ))
            })?;
            rules.push(CompiledRule {
                name: rule.name.clone(),
                effect: rule.effect,
                message: rule.message.clone(),
                expr,
            });
        }

        Ok(Self {
            rules,
            default: cfg.effective_default(),
        })
    }

    /// The configured default effect.
    pub fn default_effect(&self) -> PolicyDefault {
        self.default
    }

    /// Evaluate a request. Deterministic: same input, same verdict.
    pub fn evaluate(&self, req: &RequestContext) -> Verdict {
        let ctx = req.to_value();

        for rule in &self.rules {
            match rule.expr.eval(&ctx) {
                Ok(Value::Bool(true)) => {
                    return Verdict {
                        effect: rule.effect,
                        rule: rule.name.clone(),
                        message: rule.message.clone(),
                    };
                }
                Ok(Value::Bool(false)) => {}
                Ok(other) => {
                    warn!(
                        rule = %rule.name,
                        result = %other,
                        "policy rule produced a non-boolean result; denying"
                    );
                    return Verdict {
                        effect: Effect::Deny,
                        rule: format!("{}:error", rule.name),
                        message: None,
                    };
                }
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "policy rule failed to evaluate; denying");
                    return Verdict {
                        effect: Effect::Deny,
                        rule: format!("{}:error", rule.name),
                        message: None,
                    };
                }
            }
        }

        Verdict {
            effect: self.default.as_effect(),
            rule: format!("default:{}", self.default),
            message: None,
        }
    }
}

// ============================================================
// Tests
// ============================================================
