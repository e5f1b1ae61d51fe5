// ABOUTME: bridgekit command-line entry point
// ABOUTME: Brings a bridge up from a saved provisioning, or sends one RPC to a running bridge

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "bridgekit")]
#[command(about = "Provision containerized bridges into a repository")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and start a bridge from a saved provisioning, then wait for Ctrl-C
    Up {
        /// Bridge id
        #[arg(long)]
        id: String,
        /// Repository cloned into the bridge workspace
        #[arg(long)]
        repo: String,
        /// Saved provisioning JSON file
        #[arg(long)]
        provisioning: PathBuf,
        /// Secret injected as an environment variable (repeatable)
        #[arg(long = "secret", value_name = "NAME=VALUE", value_parser = cli::parse_secret)]
        secrets: Vec<bridgekit_core::Secret>,
    },
    /// Send one JSON-RPC request to a running bridge and print the result
    Call {
        /// Host port the bridge listens on
        #[arg(long)]
        port: u16,
        /// Host to dial; defaults to BRIDGEKIT_HOST
        #[arg(long)]
        host: Option<String>,
        /// Method name, e.g. exec/run
        method: String,
        /// JSON params object
        #[arg(default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Up {
            id,
            repo,
            provisioning,
            secrets,
        } => cli::up::run(&id, &repo, &provisioning, secrets).await,
        Commands::Call {
            port,
            host,
            method,
            params,
        } => cli::call::run(host, port, &method, &params).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
