//! The mcp-firewall binary.
//!
//! Startup order matters: the `__sandbox__` sentinel is checked against raw
//! argv before any flag parsing, because the re-execed child carries the
//! downstream's argv after the sentinel and must never be interpreted as
//! firewall flags.

mod cli;
mod lockfile;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use firewall_proxy::{serve_stdio, Proxy};
use firewall_sandbox::SANDBOX_SENTINEL;
use firewall_types::loader;

use crate::cli::{default_config_path, Cli};

/// Environment variable selecting a config profile, overriding `--profile`.
const PROFILE_ENV: &str = "MCP_FIREWALL_PROFILE";

fn main() {
    // Detect the re-exec sentinel BEFORE flag parsing.
    let mut args = std::env::args();
    let _argv0 = args.next();
    if args.next().as_deref() == Some(SANDBOX_SENTINEL) {
        // run_entrypoint only returns on failure; on success the process
        // image has been replaced by the downstream.
        if let Err(e) = firewall_sandbox::run_entrypoint() {
            eprintln!("sandbox: {e}");
        }
        std::process::exit(1);
    }

    if let Err(e) = run() {
        eprintln!("mcp-firewall: {e:#}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(default_config_path);

    // The environment variable wins over the flag.
    let profile = std::env::var(PROFILE_ENV)
        .ok()
        .filter(|name| !name.is_empty())
        .or(cli.profile)
        .unwrap_or_default();

    let workspace: Option<PathBuf> = match cli.workspace {
        Some(dir) => Some(dir),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| loader::detect_workspace(&cwd)),
    };

    let resolved = loader::resolve(&config_path, &profile, workspace.as_deref())
        .context("loading config")?;

    if cli.generate_lockfile {
        lockfile::generate(&resolved.config);
        return Ok(());
    }

    init_logging(&resolved.config.log_level);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        profile = %resolved.profile_name,
        workspace = ?workspace,
        "starting mcp-firewall"
    );

    let mut proxy = Proxy::new(resolved, workspace, None).context("building proxy")?;
    proxy.connect_downstreams().await.context("connecting downstreams")?;
    let proxy = Arc::new(proxy);

    tokio::select! {
        result = serve_stdio(proxy) => {
            result.context("serving upstream")?;
            info!("upstream closed; exiting");
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received; closing sessions");
        }
    }

    Ok(())
}

/// Structured JSON logs on stderr; stdout belongs to the MCP transport.
fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
