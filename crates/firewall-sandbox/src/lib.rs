/// Downstream process sandboxing.
///
/// The sandbox works in two phases around a self re-exec:
/// 1. **Launcher** (`launcher`): the proxy builds a child command that runs
///    its own binary with the `__sandbox__` sentinel, carrying the full
///    sandbox directive as JSON in a single environment variable. On Linux a
///    `pre_exec` hook moves the child into fresh user and network namespaces
///    before the re-exec.
/// 2. **Entrypoint** (`entrypoint`): the re-execed child filters the
///    environment, applies Landlock, and replaces itself with the real
///    downstream binary.
///
/// Supporting modules: sandbox profiles (`profile`), host capability probing
/// (`capabilities`), environment filtering (`env`), and Landlock ruleset
/// application (`landlock_fs`).
pub mod capabilities;
pub mod entrypoint;
pub mod env;
pub mod landlock_fs;
pub mod launcher;
pub mod profile;

pub use capabilities::{detect_capabilities, Capabilities, IsolationLevel};
pub use entrypoint::run_entrypoint;
pub use env::filter_env;
pub use landlock_fs::{apply_landlock, LandlockStatus};
pub use launcher::{build_sandboxed_command, SandboxExecConfig, SANDBOX_CONFIG_ENV, SANDBOX_SENTINEL};
pub use profile::{resolve_profile, strict_profile, SandboxProfile};
