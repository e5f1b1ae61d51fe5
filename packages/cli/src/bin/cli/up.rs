// ABOUTME: `bridgekit up` brings a bridge up from a saved provisioning record
// ABOUTME: Runs the agent fast path, reports the port, and tears the bridge down on Ctrl-C

use anyhow::{Context, Result};
use bridgekit_agent::{AgentOptions, BridgeAgent, StaticAnalyzer};
use bridgekit_builder::{BridgeLauncher, DockerLauncher};
use bridgekit_client::DefaultTransportFactory;
use bridgekit_config::BridgeSettings;
use bridgekit_core::{BridgeAnalysis, SavedProvisioning, Secret};
use bridgekit_lifecycle::BridgeLifecycle;
use colored::*;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub async fn run(id: &str, repo: &str, provisioning: &Path, secrets: Vec<Secret>) -> Result<()> {
    let settings = BridgeSettings::from_env()?;
    let saved = SavedProvisioning::load(provisioning)
        .with_context(|| format!("Failed to read {}", provisioning.display()))?;

    let launcher = Arc::new(DockerLauncher::new(settings.clone())?);
    let transports = Arc::new(DefaultTransportFactory::new(settings.transport));
    let lifecycle = BridgeLifecycle::new(launcher.clone(), transports, settings);

    // Only the fast path runs here, so the analyzer just mirrors the saved record
    let analyzer = StaticAnalyzer::new(
        BridgeAnalysis {
            project_type: saved.project_type.clone(),
            detected_tools: saved.detected_tools.clone(),
            apt_packages: saved.apt_packages.clone(),
            skill_repos: Vec::new(),
            setup_commands: saved.setup_commands.clone(),
        },
        saved.base_image.clone(),
    );

    let options = AgentOptions::new(id, repo)
        .with_secrets(secrets)
        .with_saved(saved);
    let mut agent = BridgeAgent::new(lifecycle, Arc::new(analyzer), options);

    let instance = agent.initialize().await?;
    println!(
        "{} bridge {} listening on port {}",
        "Ready:".green().bold(),
        instance.id,
        instance.port.to_string().cyan()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down bridge {}", id);
    agent.destroy().await;
    launcher.teardown(id).await;
    Ok(())
}
