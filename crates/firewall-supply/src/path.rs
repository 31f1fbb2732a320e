//! Command path resolution and allowlist validation.

use std::path::{Path, PathBuf};

use firewall_types::FirewallError;

/// Resolve a command to an absolute, symlink-free path to a regular file.
///
/// Absolute commands are used verbatim; anything else goes through a PATH
/// search. Symlinks are always followed to the canonical target.
pub fn resolve_command(command: &str) -> Result<PathBuf, FirewallError> {
    let candidate = if Path::new(command).is_absolute() {
        PathBuf::from(command)
    } else {
        which::which(command)
            .map_err(|e| FirewallError::Supply(format!("resolving command {command:?}: {e}")))?
    };

    let resolved = std::fs::canonicalize(&candidate).map_err(|e| {
        FirewallError::Supply(format!(
            "resolving symlinks for {}: {e}",
            candidate.display()
        ))
    })?;

    let meta = std::fs::metadata(&resolved).map_err(|e| {
        FirewallError::Supply(format!("stat {}: {e}", resolved.display()))
    })?;
    if !meta.is_file() {
        return Err(FirewallError::Supply(format!(
            "{} is not a regular file",
            resolved.display()
        )));
    }

    Ok(resolved)
}

/// Check that a resolved path is under one of the allowed prefixes.
///
/// An empty allowlist passes everything. A prefix matches when the path is
/// exactly the prefix, or starts with `prefix + '/'`; a plain string prefix
/// would let `/usr/local/bin-evil` match `/usr/local/bin`.
pub fn validate_path(resolved: &Path, allowed_paths: &[String]) -> Result<(), FirewallError> {
    if allowed_paths.is_empty() {
        return Ok(());
    }

    let resolved_str = resolved.to_string_lossy();
    for allowed in allowed_paths {
        let prefix = expand_tilde(allowed);
        let with_sep = format!("{}/", prefix.trim_end_matches('/'));
        if resolved_str == prefix || resolved_str.starts_with(&with_sep) {
            return Ok(());
        }
    }

    Err(FirewallError::Supply(format!(
        "command path {:?} is not under any allowed path",
        resolved.display()
    )))
}

/// Expand a leading `~/` against the invoker's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn test_resolve_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_executable(dir.path(), "mybin");

        let resolved = resolve_command(bin.to_str().unwrap()).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(&bin).unwrap());
    }

    #[test]
    fn test_resolve_path_lookup() {
        // "ls" should be on PATH on any test system.
        let resolved = resolve_command("ls").unwrap();
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_resolve_not_found() {
        assert!(resolve_command("nonexistent-binary-that-does-not-exist-12345").is_err());
    }

    #[test]
    fn test_resolve_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = write_executable(dir.path(), "target");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let resolved = resolve_command(link.to_str().unwrap()).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(&target).unwrap());
    }

    #[test]
    fn test_resolve_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_command(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn test_validate_in_allowlist() {
        validate_path(
            Path::new("/usr/local/bin/mybin"),
            &["/usr/local/bin".to_string()],
        )
        .unwrap();
    }

    #[test]
    fn test_validate_outside_allowlist() {
        let err = validate_path(
            Path::new("/opt/evil/binary"),
            &["/usr/local/bin".to_string(), "/usr/bin".to_string()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not under any allowed path"));
    }

    #[test]
    fn test_validate_empty_allowlist() {
        validate_path(Path::new("/anywhere/is/fine"), &[]).unwrap();
    }

    #[test]
    fn test_validate_exact_match() {
        validate_path(Path::new("/usr/local/bin"), &["/usr/local/bin".to_string()]).unwrap();
    }

    #[test]
    fn test_validate_prefix_trap() {
        // Shares a string prefix but is not under the directory.
        let err = validate_path(
            Path::new("/usr/local/bin-evil/hack"),
            &["/usr/local/bin".to_string()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not under"));
    }

    #[test]
    fn test_validate_tilde_expansion() {
        let home = dirs::home_dir().unwrap();
        let resolved = home.join("bin/mybin");
        validate_path(&resolved, &["~/bin".to_string()]).unwrap();
    }
}
