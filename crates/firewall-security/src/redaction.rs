//! Outbound payload redaction.
//!
//! Patterns are compiled once at startup. On every outbound textual tool or
//! resource response, every pattern is applied to every text segment in
//! sequence; matches are replaced by `[REDACTED:<name>]`. Non-text payloads
//! pass through unchanged (the proxy never hands them to the redactor).

use regex::Regex;

use firewall_types::{FirewallError, RedactionConfig};

#[derive(Debug)]
struct CompiledPattern {
    name: String,
    regex: Regex,
}

/// Applies the configured redaction patterns to outbound text.
#[derive(Debug)]
pub struct Redactor {
    patterns: Vec<CompiledPattern>,
}

impl Redactor {
    /// Compile all configured patterns. Config validation has already
    /// checked them, so failure here means validation was bypassed.
    pub fn new(cfg: &RedactionConfig) -> Result<Self, FirewallError> {
        let mut patterns = Vec::with_capacity(cfg.patterns.len());
        for p in &cfg.patterns {
            let regex = Regex::new(&p.pattern).map_err(|e| {
                FirewallError::Config(format!(
                    "redaction pattern {:?}: invalid regex: {e}",
                    p.name
                ))
            })?;
            patterns.push(CompiledPattern {
                name: p.name.clone(),
                regex,
            });
        }
        Ok(Self { patterns })
    }

    /// Whether any patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Apply every pattern in sequence to a text segment.
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in &self.patterns {
            let marker = format!("[REDACTED:{}]", pattern.name);
            out = pattern
                .regex
                .replace_all(&out, regex::NoExpand(&marker))
                .into_owned();
        }
        out
    }
}

// ============================================================
// Tests
// ============================================================
