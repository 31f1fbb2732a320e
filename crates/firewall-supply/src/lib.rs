/// Supply-chain verification for downstream binaries.
///
/// Before any downstream process is spawned, its command is resolved to a
/// canonical path, checked against the configured allowlist prefixes, and
/// (when a hash is pinned) digest-verified:
/// - **Path resolution** (`path`): PATH lookup, symlink canonicalization
/// - **Hashing** (`hash`): `sha256:<hex>` parse and file digest
/// - **Verification** (`verify`): the resolve → validate → hash pipeline
pub mod hash;
pub mod path;
pub mod verify;

pub use hash::{compute_file_hash, parse_hash};
pub use path::{resolve_command, validate_path};
pub use verify::{verify, VerifyOutcome};
