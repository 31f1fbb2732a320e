//! Environment filtering for sandboxed children.

/// Keep only `KEY=VALUE` entries whose key is in the allowlist.
///
/// Key matching is a case-sensitive literal comparison. Entries without an
/// `=` are dropped. Input ordering is preserved.
pub fn filter_env(env: &[String], allowlist: &[String]) -> Vec<String> {
    if env.is_empty() || allowlist.is_empty() {
        return Vec::new();
    }

    let allowed: std::collections::HashSet<&str> =
        allowlist.iter().map(String::as_str).collect();

    env.iter()
        .filter(|entry| {
            entry
                .split_once('=')
                .is_some_and(|(key, _)| allowed.contains(key))
        })
        .cloned()
        .collect()
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_allowlist() {
        let env = strings(&["PATH=/usr/bin", "HOME=/root", "SECRET=hunter2"]);
        assert!(filter_env(&env, &[]).is_empty());
    }

    #[test]
    fn test_some_filtered() {
        let env = strings(&["PATH=/usr/bin", "HOME=/root", "SECRET=hunter2"]);
        let got = filter_env(&env, &strings(&["PATH", "HOME"]));
        assert_eq!(got, strings(&["PATH=/usr/bin", "HOME=/root"]));
    }

    #[test]
    fn test_case_sensitive() {
        let env = strings(&["path=/usr/bin", "PATH=/usr/bin"]);
        let got = filter_env(&env, &strings(&["PATH"]));
        assert_eq!(got, strings(&["PATH=/usr/bin"]));
    }

    #[test]
    fn test_malformed_entry_dropped() {
        let env = strings(&["PATH=/usr/bin", "NOEQUALS", "HOME=/root"]);
        let got = filter_env(&env, &strings(&["PATH", "NOEQUALS", "HOME"]));
        assert_eq!(got, strings(&["PATH=/usr/bin", "HOME=/root"]));
    }

    #[test]
    fn test_empty_env() {
        assert!(filter_env(&[], &strings(&["PATH"])).is_empty());
    }

    #[test]
    fn test_preserves_order() {
        let env = strings(&["C=3", "A=1", "B=2"]);
        let got = filter_env(&env, &strings(&["A", "B", "C"]));
        assert_eq!(got, strings(&["C=3", "A=1", "B=2"]));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let env = strings(&["OPTS=--flag=value"]);
        let got = filter_env(&env, &strings(&["OPTS"]));
        assert_eq!(got, strings(&["OPTS=--flag=value"]));
    }
}
