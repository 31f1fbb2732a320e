//! The supply-chain verification pipeline.

use std::path::PathBuf;

use tracing::debug;

use firewall_types::FirewallError;

use crate::hash::compute_file_hash;
use crate::path::{resolve_command, validate_path};

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    /// Absolute path with symlinks resolved.
    pub resolved_path: PathBuf,
    /// `sha256:<hex>`, present only when a hash check was requested.
    pub computed_hash: Option<String>,
}

/// Run path resolution, allowlist validation, and (optional) hash verification.
///
/// Path validation fails fast before any hashing. A pinned hash that does not
/// match the resolved binary is fatal: the downstream must not be spawned.
pub fn verify(
    command: &str,
    expected_hash: Option<&str>,
    allowed_paths: &[String],
) -> Result<VerifyOutcome, FirewallError> {
    let resolved = resolve_command(command)?;

    validate_path(&resolved, allowed_paths)?;

    let mut outcome = VerifyOutcome {
        resolved_path: resolved,
        computed_hash: None,
    };

    if let Some(expected) = expected_hash.filter(|h| !h.is_empty()) {
        let computed = compute_file_hash(&outcome.resolved_path)?;
        if computed != expected {
            return Err(FirewallError::Supply(format!(
                "hash mismatch for {:?}: expected {expected}, computed {computed}",
                outcome.resolved_path.display()
            )));
        }
        debug!(
            path = %outcome.resolved_path.display(),
            hash = %computed,
            "downstream binary digest verified"
        );
        outcome.computed_hash = Some(computed);
    }

    Ok(outcome)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_binary(dir: &Path) -> PathBuf {
        let path = dir.join("mybin");
        std::fs::write(&path, "binary content").unwrap();
        path
    }

    #[test]
    fn test_verify_hash_match() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_binary(dir.path());
        let hash = compute_file_hash(&bin).unwrap();

        let outcome = verify(bin.to_str().unwrap(), Some(&hash), &[]).unwrap();
        assert_eq!(outcome.resolved_path, std::fs::canonicalize(&bin).unwrap());
        assert_eq!(outcome.computed_hash.as_deref(), Some(hash.as_str()));
    }

    #[test]
    fn test_verify_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_binary(dir.path());
        let wrong = format!("sha256:{}", "0".repeat(64));

        let err = verify(bin.to_str().unwrap(), Some(&wrong), &[]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("hash mismatch"));
        assert!(msg.contains("expected"));
        assert!(msg.contains("computed"));
    }

    #[test]
    fn test_verify_no_hash() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_binary(dir.path());

        let outcome = verify(bin.to_str().unwrap(), None, &[]).unwrap();
        assert!(outcome.computed_hash.is_none());

        let outcome = verify(bin.to_str().unwrap(), Some(""), &[]).unwrap();
        assert!(outcome.computed_hash.is_none());
    }

    #[test]
    fn test_verify_path_denied() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_binary(dir.path());

        let err = verify(
            bin.to_str().unwrap(),
            None,
            &["/usr/local/bin".to_string()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not under any allowed path"));
    }

    #[test]
    fn test_verify_both_checks() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_binary(dir.path());
        let hash = compute_file_hash(&bin).unwrap();
        let canonical_dir = std::fs::canonicalize(dir.path()).unwrap();

        let outcome = verify(
            bin.to_str().unwrap(),
            Some(&hash),
            &[canonical_dir.to_string_lossy().into_owned()],
        )
        .unwrap();
        assert_eq!(outcome.computed_hash.as_deref(), Some(hash.as_str()));
    }

    #[test]
    fn test_verify_path_denied_before_hash() {
        // A denied path must short-circuit before hashing: the error is about
        // the path even though the pinned hash is also wrong.
        let dir = tempfile::tempdir().unwrap();
        let bin = write_binary(dir.path());
        let wrong = format!("sha256:{}", "0".repeat(64));

        let err = verify(
            bin.to_str().unwrap(),
            Some(&wrong),
            &["/usr/local/bin".to_string()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not under any allowed path"));
    }
}
