//! The `alias__name` namespacing scheme.
//!
//! Every public tool and resource name exposed upstream is
//! `<alias>__<inner>`. Parsing splits on the first separator, so inner names
//! may themselves contain `__`; aliases cannot (alias validation forbids it).

/// The two-character namespace separator.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Compose a namespaced public name.
pub fn namespaced_name(alias: &str, inner: &str) -> String {
    format!("{alias}{NAMESPACE_SEPARATOR}{inner}")
}

/// Split a namespaced name into `(alias, inner)`.
///
/// Returns `None` when the separator is missing or either half is empty.
pub fn split_namespaced(name: &str) -> Option<(&str, &str)> {
    let idx = name.find(NAMESPACE_SEPARATOR)?;
    if idx == 0 {
        return None;
    }
    let alias = &name[..idx];
    let inner = &name[idx + NAMESPACE_SEPARATOR.len()..];
    if inner.is_empty() {
        return None;
    }
    Some((alias, inner))
}

// ============================================================
// Tests
// ============================================================
