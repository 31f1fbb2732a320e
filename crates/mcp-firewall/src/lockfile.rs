//! Lockfile generation: resolve and hash every configured downstream and
//! print a YAML fragment suitable for pasting back into the config.

use firewall_supply::{compute_file_hash, resolve_command};
use firewall_types::Config;

/// Print `downstreams:` YAML with a pinned hash per alias. Per-alias
/// failures go to stderr without aborting the remaining entries.
pub fn generate(cfg: &Config) {
    println!("downstreams:");
    for (alias, sc) in &cfg.downstreams {
        let resolved = match resolve_command(&sc.command) {
            Ok(path) => path,
            Err(e) => {
                eprintln!("  {alias}: # error resolving: {e}");
                continue;
            }
        };
        match compute_file_hash(&resolved) {
            Ok(hash) => {
                println!("  {alias}:");
                println!("    hash: \"{hash}\"");
            }
            Err(e) => {
                eprintln!("  {alias}: # error hashing: {e}");
            }
        }
    }
}
