// ABOUTME: bridgekit-server entry point, run as the container entrypoint
// ABOUTME: Serves the bridge RPC methods on the configured transport until interrupted

use anyhow::{Context, Result};
use bridgekit_config::constants::{
    BRIDGE_HOST, BRIDGE_INSTALL_ROOT, BRIDGE_PORT, BRIDGE_TRANSPORT, BRIDGE_WORKSPACE,
};
use bridgekit_config::TransportKind;
use bridgekit_server::{http, socket, Dispatcher, LogBuffer, PathJail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bridgekit-server")]
#[command(about = "Bridge RPC server exposing a container workspace to the host")]
#[command(version)]
struct Cli {
    #[arg(long, env = BRIDGE_HOST, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = BRIDGE_PORT, default_value_t = 7100)]
    port: u16,

    #[arg(long, env = BRIDGE_WORKSPACE, default_value = "/workspace")]
    workspace: PathBuf,

    #[arg(long, env = BRIDGE_INSTALL_ROOT, default_value = "/opt/skills")]
    install_root: PathBuf,

    #[arg(long, env = BRIDGE_TRANSPORT, default_value = "socket")]
    transport: TransportKind,

    /// Verify the workspace is populated and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.check {
        return check_workspace(&cli.workspace);
    }

    let logs = LogBuffer::default();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_writer(std::io::stderr.and(logs.clone()))
        .init();

    let jail = PathJail::new(&cli.workspace, &cli.install_root);
    let dispatcher = Arc::new(Dispatcher::new(jail, logs));

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        "bridgekit-server {} serving {} over {}",
        env!("CARGO_PKG_VERSION"),
        cli.workspace.display(),
        cli.transport
    );

    let server = async {
        match cli.transport {
            TransportKind::Socket => socket::serve(listener, dispatcher).await,
            TransportKind::Http => http::serve(listener, dispatcher).await,
        }
    };

    tokio::select! {
        result = server => {
            if let Err(e) = &result {
                error!("Server stopped: {}", e);
            }
            result.context("Server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

fn check_workspace(workspace: &std::path::Path) -> Result<()> {
    let mut entries = std::fs::read_dir(workspace)
        .with_context(|| format!("Workspace {} is not readable", workspace.display()))?;
    if entries.next().is_none() {
        anyhow::bail!("Workspace {} is empty", workspace.display());
    }
    println!("ok");
    Ok(())
}
