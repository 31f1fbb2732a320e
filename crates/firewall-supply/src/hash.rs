//! Pinned hash parsing and file digest computation.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use firewall_types::FirewallError;

/// Split `"sha256:<hexdigest>"` into algorithm and digest.
pub fn parse_hash(s: &str) -> Result<(String, String), FirewallError> {
    let Some((algorithm, digest)) = s.split_once(':') else {
        return Err(FirewallError::Supply(format!(
            "invalid hash format {s:?}: expected \"algorithm:digest\""
        )));
    };

    if algorithm != "sha256" {
        return Err(FirewallError::Supply(format!(
            "unsupported hash algorithm {algorithm:?}: only \"sha256\" is supported"
        )));
    }

    if digest.is_empty() {
        return Err(FirewallError::Supply(format!("empty digest in hash {s:?}")));
    }

    if digest.len() != 64 {
        return Err(FirewallError::Supply(format!(
            "sha256 digest must be 64 hex characters, got {}",
            digest.len()
        )));
    }

    hex::decode(digest)
        .map_err(|e| FirewallError::Supply(format!("invalid hex digest in hash {s:?}: {e}")))?;

    Ok((algorithm.to_string(), digest.to_string()))
}

/// Compose an algorithm + digest pair back into the configured form.
pub fn format_hash(algorithm: &str, digest: &str) -> String {
    format!("{algorithm}:{digest}")
}

/// Compute the `sha256:<hex>` digest of a regular file, following symlinks.
pub fn compute_file_hash(path: &Path) -> Result<String, FirewallError> {
    let resolved = std::fs::canonicalize(path)
        .map_err(|e| FirewallError::Supply(format!("resolving path {}: {e}", path.display())))?;

    let meta = std::fs::metadata(&resolved)
        .map_err(|e| FirewallError::Supply(format!("stat {}: {e}", resolved.display())))?;
    if !meta.is_file() {
        return Err(FirewallError::Supply(format!(
            "{} is not a regular file",
            resolved.display()
        )));
    }

    let mut file = std::fs::File::open(&resolved)
        .map_err(|e| FirewallError::Supply(format!("opening {}: {e}", resolved.display())))?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| FirewallError::Supply(format!("hashing {}: {e}", resolved.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format_hash("sha256", &hex::encode(hasher.finalize())))
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn test_parse_hash_valid() {
        let digest = "abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789";
        let (algo, parsed) = parse_hash(&format!("sha256:{digest}")).unwrap();
        assert_eq!(algo, "sha256");
        assert_eq!(parsed, digest);
    }

    #[test]
    fn test_parse_hash_round_trip() {
        let digest = "00".repeat(32);
        let s = format_hash("sha256", &digest);
        let (algo, parsed) = parse_hash(&s).unwrap();
        assert_eq!(format_hash(&algo, &parsed), s);
    }

    #[test]
    fn test_parse_hash_no_colon() {
        let err = parse_hash("nocolonhere").unwrap_err();
        assert!(err.to_string().contains("format"));
    }

    #[test]
    fn test_parse_hash_unsupported_algorithm() {
        let err = parse_hash("md5:abcdef0123456789abcdef0123456789").unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }

    #[test]
    fn test_parse_hash_empty_digest() {
        let err = parse_hash("sha256:").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_parse_hash_63_chars_rejected() {
        let err = parse_hash(&format!("sha256:{}", "a".repeat(63))).unwrap_err();
        assert!(err.to_string().contains("64"));
    }

    #[test]
    fn test_parse_hash_invalid_hex() {
        let err = parse_hash(&format!("sha256:{}", "z".repeat(64))).unwrap_err();
        assert!(err.to_string().contains("hex"));
    }

    #[test]
    fn test_compute_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testfile");
        let content = b"hello world\n";
        std::fs::write(&path, content).unwrap();

        let expected = format!("sha256:{}", hex::encode(Sha256::digest(content)));
        assert_eq!(compute_file_hash(&path).unwrap(), expected);
    }

    #[test]
    fn test_compute_not_found() {
        assert!(compute_file_hash(Path::new("/nonexistent/file/path")).is_err());
    }

    #[test]
    fn test_compute_follows_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        let content = b"symlink target content";
        std::fs::write(&target, content).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let expected = format!("sha256:{}", hex::encode(Sha256::digest(content)));
        assert_eq!(compute_file_hash(&link).unwrap(), expected);
    }

    #[test]
    fn test_compute_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = compute_file_hash(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }
}
