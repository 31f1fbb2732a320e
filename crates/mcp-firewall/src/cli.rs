//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "mcp-firewall",
    version,
    about = "Security-enforcing proxy between an AI assistant and MCP tool servers"
)]
pub struct Cli {
    /// Path to the config file (default: ~/.mcp-firewall/config.yaml).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Config profile name. The MCP_FIREWALL_PROFILE environment variable
    /// takes precedence over this flag.
    #[arg(long, value_name = "NAME")]
    pub profile: Option<String>,

    /// Workspace directory for the local override (auto-detected by walking
    /// up from the current directory if omitted).
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Print lockfile YAML with hashes for all downstreams and exit.
    #[arg(long)]
    pub generate_lockfile: bool,
}

/// The default config path under the invoker's home directory.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-firewall")
        .join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "mcp-firewall",
            "--config",
            "/etc/fw.yaml",
            "--profile",
            "work",
            "--workspace",
            "/src/project",
        ]);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/etc/fw.yaml")));
        assert_eq!(cli.profile.as_deref(), Some("work"));
        assert_eq!(
            cli.workspace.as_deref(),
            Some(std::path::Path::new("/src/project"))
        );
        assert!(!cli.generate_lockfile);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["mcp-firewall"]);
        assert!(cli.config.is_none());
        assert!(cli.profile.is_none());
        assert!(cli.workspace.is_none());
    }

    #[test]
    fn test_default_config_path_shape() {
        let path = default_config_path();
        assert!(path.ends_with(".mcp-firewall/config.yaml"));
    }
}
