// ABOUTME: Bridge agent state machine driving lifecycle and analyzer to a ready bridge
// ABOUTME: Fast path from saved provisioning, or a discover/compare/rebuild loop with an error budget

use crate::analyzer::Analyzer;
use crate::error::{AgentError, Result};
use crate::provisioning::{calculate_new_provisioning, check_provisioning_needs};
use crate::state::{AgentPhase, AgentState, Transition};
use bridgekit_client::BridgeClient;
use bridgekit_config::constants::GITHUB_TOKEN;
use bridgekit_config::default_token;
use bridgekit_core::{BridgeAnalysis, Provisioning, SavedProvisioning, Secret, WORKSPACE_DIR};
use bridgekit_lifecycle::{BridgeInstance, BridgeLifecycle};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the agent is asked to bring up
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub id: String,
    pub repo_url: String,
    pub workspace: String,
    /// Explicit secrets; when empty the well-known token variable is used
    pub secrets: Vec<Secret>,
    /// A previously discovered provisioning; selects the fast path
    pub saved: Option<SavedProvisioning>,
}

impl AgentOptions {
    pub fn new(id: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            repo_url: repo_url.into(),
            workspace: WORKSPACE_DIR.to_string(),
            secrets: Vec::new(),
            saved: None,
        }
    }

    pub fn with_secrets(mut self, secrets: Vec<Secret>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_saved(mut self, saved: SavedProvisioning) -> Self {
        self.saved = Some(saved);
        self
    }
}

enum Step {
    Ready(BridgeInstance),
    Rebuild(Provisioning),
}

pub struct BridgeAgent {
    lifecycle: BridgeLifecycle,
    analyzer: Arc<dyn Analyzer>,
    options: AgentOptions,
    state: AgentState,
}

impl BridgeAgent {
    pub fn new(lifecycle: BridgeLifecycle, analyzer: Arc<dyn Analyzer>, options: AgentOptions) -> Self {
        let secrets = resolve_secrets(&options.secrets, default_token());
        let state = AgentState::new(Provisioning::default().with_secrets(secrets));
        Self {
            lifecycle,
            analyzer,
            options,
            state,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn lifecycle(&self) -> &BridgeLifecycle {
        &self.lifecycle
    }

    /// Client of the ready bridge
    pub fn client(&self) -> Result<Arc<BridgeClient>> {
        if !self.state.is_ready {
            return Err(AgentError::NotReady);
        }
        Ok(self.lifecycle.client(&self.options.id)?)
    }

    /// Bring the bridge to a ready state, or fail with the terminal cause
    ///
    /// Every call starts from scratch: a bridge left by an earlier run is destroyed and
    /// its analysis is discarded.
    pub async fn initialize(&mut self) -> Result<BridgeInstance> {
        self.lifecycle.destroy_bridge(&self.options.id).await;
        let secrets = std::mem::take(&mut self.state.current_provisioning.secrets);
        self.state = AgentState::new(Provisioning::default().with_secrets(secrets));

        match self.options.saved.clone() {
            Some(saved) => self.run_fast_path(saved).await,
            None => self.discover().await,
        }
    }

    async fn run_fast_path(&mut self, saved: SavedProvisioning) -> Result<BridgeInstance> {
        info!(
            "Bridge {}: using saved provisioning ({} on {})",
            self.options.id, saved.project_type, saved.base_image
        );
        self.state.phase = AgentPhase::FastPath;
        self.state.iteration = 1;
        self.state.current_provisioning =
            saved.to_provisioning(self.state.current_provisioning.secrets.clone());
        self.state.last_analysis = Some(BridgeAnalysis {
            project_type: saved.project_type.clone(),
            detected_tools: saved.detected_tools.clone(),
            apt_packages: saved.apt_packages.clone(),
            skill_repos: Vec::new(),
            setup_commands: saved.setup_commands.clone(),
        });
        self.state.analyzed_at = Some(saved.analyzed_at);

        let instance = match self
            .lifecycle
            .create_bridge(
                &self.options.id,
                &self.options.repo_url,
                self.state.current_provisioning.clone(),
            )
            .await
        {
            Ok(instance) => instance,
            Err(e) => {
                error!("Bridge {}: fast path failed: {}", self.options.id, e);
                self.state.errors.push(e.to_string());
                self.state.phase = AgentPhase::Failed;
                return Err(e.into());
            }
        };

        self.run_setup_commands(&instance.client, &saved.setup_commands)
            .await;
        self.mark_ready();
        Ok(instance)
    }

    async fn discover(&mut self) -> Result<BridgeInstance> {
        self.state.phase = AgentPhase::Discovering;
        let max_iterations = self.lifecycle.settings().max_iterations;
        let error_budget = self.lifecycle.settings().error_budget;

        while self.state.iteration < max_iterations {
            self.state.iteration += 1;
            let iteration = self.state.iteration;
            match self.state.transitions.last() {
                Some(transition) => info!(
                    "Bridge {}: iteration {}/{} ({})",
                    self.options.id, iteration, max_iterations, transition
                ),
                None => info!(
                    "Bridge {}: iteration {}/{}",
                    self.options.id, iteration, max_iterations
                ),
            }

            match self.discovery_step().await {
                Ok(Step::Ready(instance)) => {
                    self.mark_ready();
                    return Ok(instance);
                }
                Ok(Step::Rebuild(next)) => {
                    info!(
                        "Bridge {}: environment insufficient, rebuilding on {} with {} packages",
                        self.options.id,
                        next.base_image,
                        next.apt_packages.len()
                    );
                    self.lifecycle.destroy_bridge(&self.options.id).await;
                    self.state.current_provisioning = next;
                    self.state.transitions.push(Transition::Rebuild);
                }
                Err(e) => {
                    warn!("Bridge {}: iteration {} failed: {}", self.options.id, iteration, e);
                    self.lifecycle.destroy_bridge(&self.options.id).await;
                    self.state.errors.push(e.to_string());
                    if self.state.errors.len() >= error_budget {
                        self.state.phase = AgentPhase::Failed;
                        return Err(AgentError::ErrorBudgetExceeded {
                            errors: self.state.errors.clone(),
                        });
                    }
                    self.state.transitions.push(Transition::Retry);
                }
            }
        }

        error!(
            "Bridge {}: no ready bridge after {} iterations",
            self.options.id, max_iterations
        );
        self.state.phase = AgentPhase::Failed;
        Err(AgentError::ProvisioningExhausted {
            iterations: max_iterations,
        })
    }

    async fn discovery_step(&mut self) -> Result<Step> {
        let instance = self
            .lifecycle
            .create_bridge(
                &self.options.id,
                &self.options.repo_url,
                self.state.current_provisioning.clone(),
            )
            .await?;

        let analysis = match &self.state.last_analysis {
            Some(analysis) => analysis.clone(),
            None => {
                let analysis = self
                    .analyzer
                    .analyze(&instance.client, &self.options.workspace)
                    .await
                    .map_err(|e| AgentError::Analysis(format!("{:#}", e)))?;
                debug!(
                    "Bridge {}: detected {} project with tools {:?}",
                    self.options.id, analysis.project_type, analysis.detected_tools
                );
                self.state.last_analysis = Some(analysis.clone());
                self.state.analyzed_at = Some(Utc::now());
                analysis
            }
        };

        let required_image = self.analyzer.base_image(&analysis.project_type);
        let current = &self.state.current_provisioning;
        if check_provisioning_needs(current, &analysis, &required_image) {
            return Ok(Step::Rebuild(calculate_new_provisioning(
                current,
                &analysis,
                &required_image,
            )));
        }

        self.run_setup_commands(&instance.client, &analysis.setup_commands)
            .await;
        Ok(Step::Ready(instance))
    }

    /// Run commands against the live bridge; failures only warn
    async fn run_setup_commands(&self, client: &BridgeClient, commands: &[String]) {
        for command in commands {
            match client.execute(command, Some(&self.options.workspace)).await {
                Ok(output) if output.success() => {
                    debug!("Setup command `{}` succeeded", command);
                }
                Ok(output) => warn!(
                    "Setup command `{}` exited with {}{}: {}",
                    command,
                    output.exit_code,
                    if output.timed_out { " (timed out)" } else { "" },
                    output.stderr.trim()
                ),
                Err(e) => warn!("Setup command `{}` could not run: {}", command, e),
            }
        }
    }

    fn mark_ready(&mut self) {
        info!(
            "Bridge {} is ready after {} iteration(s)",
            self.options.id, self.state.iteration
        );
        self.state.is_ready = true;
        self.state.phase = AgentPhase::Ready;
    }

    /// Final provisioning and analysis, for the caller to persist
    pub fn get_saved_provisioning(&self) -> Option<SavedProvisioning> {
        if !self.state.is_ready {
            return None;
        }
        let analysis = self.state.last_analysis.as_ref()?;
        let provisioning = &self.state.current_provisioning;

        Some(SavedProvisioning {
            base_image: provisioning.base_image.clone(),
            apt_packages: provisioning.apt_packages.clone(),
            setup_commands: analysis.setup_commands.clone(),
            detected_tools: analysis.detected_tools.clone(),
            project_type: analysis.project_type.clone(),
            skill_repos: provisioning.skill_repos.clone(),
            analyzed_at: self.state.analyzed_at.unwrap_or_else(Utc::now),
        })
    }

    /// Write the saved provisioning to `path`
    pub fn save_provisioning(&self, path: impl AsRef<Path>) -> Result<()> {
        let saved = self.get_saved_provisioning().ok_or(AgentError::NotReady)?;
        saved.save(path)?;
        Ok(())
    }

    /// Disconnect and tear down the bridge
    pub async fn destroy(&mut self) {
        self.lifecycle.destroy_bridge(&self.options.id).await;
        self.state.is_ready = false;
        self.state.phase = AgentPhase::Idle;
    }
}

/// Explicit secrets win; otherwise fall back to the default token
fn resolve_secrets(explicit: &[Secret], token: Option<String>) -> Vec<Secret> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    token
        .map(|value| vec![Secret::new(GITHUB_TOKEN, value)])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::MockAnalyzer;
    use bridgekit_config::BridgeSettings;
    use bridgekit_core::AnalyzedSkill;
    use bridgekit_lifecycle::testing::{FakeBuild, FakeLauncher, FakeTransportFactory};
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::time::Duration;

    const REPO: &str = "https://github.com/acme/widget";

    fn settings() -> BridgeSettings {
        BridgeSettings {
            startup_timeout: Duration::from_millis(200),
            health_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            max_iterations: 10,
            error_budget: 3,
            ..BridgeSettings::default()
        }
    }

    fn node_analysis() -> BridgeAnalysis {
        BridgeAnalysis {
            project_type: "node".to_string(),
            detected_tools: vec!["node".to_string()],
            apt_packages: vec!["build-essential".to_string()],
            skill_repos: vec![AnalyzedSkill {
                name: "lint".to_string(),
                git_repo: "acme/lint".to_string(),
                container_path: "/opt/skills/lint".to_string(),
                apt_packages: Vec::new(),
                setup_commands: Vec::new(),
            }],
            setup_commands: vec!["npm ci".to_string(), "npm run build".to_string()],
        }
    }

    fn stable_analyzer(times: usize) -> MockAnalyzer {
        let mut analyzer = MockAnalyzer::new();
        analyzer
            .expect_analyze()
            .times(times)
            .returning(|_, _| Ok(node_analysis()));
        analyzer
            .expect_base_image()
            .returning(|_| "node:20-bookworm".to_string());
        analyzer
    }

    fn agent(
        launcher: Arc<FakeLauncher>,
        transports: FakeTransportFactory,
        analyzer: MockAnalyzer,
        options: AgentOptions,
    ) -> BridgeAgent {
        let lifecycle = BridgeLifecycle::new(launcher, Arc::new(transports), settings());
        BridgeAgent::new(lifecycle, Arc::new(analyzer), options)
    }

    fn saved() -> SavedProvisioning {
        SavedProvisioning {
            base_image: "node:20-bookworm".to_string(),
            apt_packages: vec!["git".to_string(), "build-essential".to_string()],
            setup_commands: vec!["npm ci".to_string()],
            detected_tools: vec!["node".to_string()],
            project_type: "node".to_string(),
            skill_repos: Vec::new(),
            analyzed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stable_analysis_converges_in_two_iterations() {
        let launcher = Arc::new(FakeLauncher::new());
        let transports = FakeTransportFactory::new();
        let state = transports.state();
        let mut agent = agent(
            launcher.clone(),
            transports,
            stable_analyzer(1),
            AgentOptions::new("alpha", REPO),
        );

        agent.initialize().await.unwrap();

        assert_eq!(agent.state().iteration, 2);
        assert_eq!(agent.state().transitions, vec![Transition::Rebuild]);
        assert_eq!(agent.state().phase, AgentPhase::Ready);
        assert_eq!(launcher.launches(), 2);
        assert_eq!(state.commands(), vec!["npm ci", "npm run build"]);
        assert!(agent.client().is_ok());
    }

    #[tokio::test]
    async fn test_fast_path_builds_once_and_never_analyzes() {
        let launcher = Arc::new(FakeLauncher::new());
        let transports = FakeTransportFactory::new();
        let state = transports.state();
        let mut analyzer = MockAnalyzer::new();
        analyzer.expect_analyze().never();
        analyzer.expect_base_image().never();

        let mut agent = agent(
            launcher.clone(),
            transports,
            analyzer,
            AgentOptions::new("alpha", REPO).with_saved(saved()),
        );

        agent.initialize().await.unwrap();

        assert_eq!(launcher.launches(), 1);
        assert_eq!(
            launcher.requests()[0].provisioning.base_image,
            "node:20-bookworm"
        );
        assert!(launcher.requests()[0].provisioning.setup_commands.is_empty());
        assert_eq!(state.commands(), vec!["npm ci"]);
        assert_eq!(agent.state().phase, AgentPhase::Ready);
    }

    #[tokio::test]
    async fn test_fast_path_failure_is_terminal() {
        let launcher = Arc::new(FakeLauncher::with_script([FakeBuild::Fail(
            "image pull failed".to_string(),
        )]));
        let mut agent = agent(
            launcher.clone(),
            FakeTransportFactory::new(),
            MockAnalyzer::new(),
            AgentOptions::new("alpha", REPO).with_saved(saved()),
        );

        let err = agent.initialize().await.unwrap_err();

        assert!(err.to_string().contains("image pull failed"));
        assert_eq!(launcher.launches(), 1);
        assert_eq!(agent.state().phase, AgentPhase::Failed);
    }

    #[tokio::test]
    async fn test_setup_command_failure_is_not_fatal() {
        let transports = FakeTransportFactory::new();
        transports.state().fail_command("npm ci");
        let mut agent = agent(
            Arc::new(FakeLauncher::new()),
            transports.clone(),
            MockAnalyzer::new(),
            AgentOptions::new("alpha", REPO).with_saved(saved()),
        );

        agent.initialize().await.unwrap();

        assert!(agent.state().is_ready);
        assert_eq!(transports.state().commands(), vec!["npm ci"]);
    }

    #[tokio::test]
    async fn test_error_budget_stops_after_three_failures() {
        let launcher = Arc::new(FakeLauncher::with_script([
            FakeBuild::Fail("first".to_string()),
            FakeBuild::Fail("second".to_string()),
            FakeBuild::Fail("third".to_string()),
            FakeBuild::Ready,
        ]));
        let mut analyzer = MockAnalyzer::new();
        analyzer.expect_analyze().never();

        let mut agent = agent(
            launcher.clone(),
            FakeTransportFactory::new(),
            analyzer,
            AgentOptions::new("alpha", REPO),
        );

        let err = agent.initialize().await.unwrap_err();
        let message = err.to_string();

        assert!(matches!(err, AgentError::ErrorBudgetExceeded { .. }));
        for cause in ["first", "second", "third"] {
            assert!(message.contains(cause), "{message} should mention {cause}");
        }
        assert_eq!(launcher.launches(), 3);
        assert_eq!(
            agent.state().transitions,
            vec![Transition::Retry, Transition::Retry]
        );
    }

    #[tokio::test]
    async fn test_retry_reuses_provisioning() {
        let launcher = Arc::new(FakeLauncher::with_script([FakeBuild::Fail(
            "registry timeout".to_string(),
        )]));
        let mut agent = agent(
            launcher.clone(),
            FakeTransportFactory::new(),
            stable_analyzer(1),
            AgentOptions::new("alpha", REPO),
        );

        agent.initialize().await.unwrap();

        let requests = launcher.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].provisioning, requests[1].provisioning);
        assert_eq!(
            agent.state().transitions,
            vec![Transition::Retry, Transition::Rebuild]
        );
        assert_eq!(agent.state().errors.len(), 1);
    }

    #[tokio::test]
    async fn test_provisioning_only_grows_across_iterations() {
        let launcher = Arc::new(FakeLauncher::with_script([
            FakeBuild::Ready,
            FakeBuild::Fail("flaky".to_string()),
            FakeBuild::Ready,
        ]));
        let mut agent = agent(
            launcher.clone(),
            FakeTransportFactory::new(),
            stable_analyzer(1),
            AgentOptions::new("alpha", REPO),
        );

        agent.initialize().await.unwrap();

        let requests = launcher.requests();
        for pair in requests.windows(2) {
            let before: HashSet<_> = pair[0].provisioning.apt_packages.iter().collect();
            let after: HashSet<_> = pair[1].provisioning.apt_packages.iter().collect();
            assert!(after.is_superset(&before));
            for skill in &pair[0].provisioning.skill_repos {
                assert!(pair[1].provisioning.has_skill(&skill.name));
            }
        }
    }

    #[tokio::test]
    async fn test_exhausted_iterations() {
        let mut analyzer = MockAnalyzer::new();
        analyzer
            .expect_analyze()
            .times(1)
            .returning(|_, _| Ok(node_analysis()));
        // An image the merge can never settle on
        let mut calls = 0;
        analyzer.expect_base_image().returning(move |_| {
            calls += 1;
            format!("node:{}", calls)
        });

        let launcher = Arc::new(FakeLauncher::new());
        let mut agent = agent(
            launcher.clone(),
            FakeTransportFactory::new(),
            analyzer,
            AgentOptions::new("alpha", REPO),
        );

        let err = agent.initialize().await.unwrap_err();

        assert!(matches!(
            err,
            AgentError::ProvisioningExhausted { iterations: 10 }
        ));
        assert_eq!(launcher.launches(), 10);
    }

    #[tokio::test]
    async fn test_analysis_failure_counts_against_budget() {
        let mut analyzer = MockAnalyzer::new();
        analyzer
            .expect_analyze()
            .times(3)
            .returning(|_, _| Err(anyhow::anyhow!("workspace is empty")));

        let launcher = Arc::new(FakeLauncher::new());
        let mut agent = agent(
            launcher.clone(),
            FakeTransportFactory::new(),
            analyzer,
            AgentOptions::new("alpha", REPO),
        );

        let err = agent.initialize().await.unwrap_err();

        assert!(err.to_string().contains("workspace is empty"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(launcher.teardowns().len(), 3);
    }

    #[tokio::test]
    async fn test_saved_provisioning_after_discovery() {
        let mut agent = agent(
            Arc::new(FakeLauncher::new()),
            FakeTransportFactory::new(),
            stable_analyzer(1),
            AgentOptions::new("alpha", REPO),
        );
        assert!(agent.get_saved_provisioning().is_none());

        agent.initialize().await.unwrap();
        let saved = agent.get_saved_provisioning().unwrap();

        assert_eq!(saved.base_image, "node:20-bookworm");
        assert_eq!(saved.project_type, "node");
        assert_eq!(saved.setup_commands, vec!["npm ci", "npm run build"]);
        assert!(saved.apt_packages.contains(&"git".to_string()));
        assert_eq!(saved.skill_repos[0].git_repo, "https://github.com/acme/lint.git");

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("provisioning.json");
        agent.save_provisioning(&path).unwrap();
        assert_eq!(SavedProvisioning::load(&path).unwrap(), saved);
    }

    #[tokio::test]
    async fn test_destroy_resets_ready() {
        let mut agent = agent(
            Arc::new(FakeLauncher::new()),
            FakeTransportFactory::new(),
            MockAnalyzer::new(),
            AgentOptions::new("alpha", REPO).with_saved(saved()),
        );
        agent.initialize().await.unwrap();

        agent.destroy().await;

        assert!(!agent.state().is_ready);
        assert!(matches!(agent.client(), Err(AgentError::NotReady)));
        assert!(!agent.lifecycle().is_healthy("alpha").await);
    }

    #[tokio::test]
    async fn test_second_initialize_analyzes_again() {
        let launcher = Arc::new(FakeLauncher::new());
        let mut agent = agent(
            launcher.clone(),
            FakeTransportFactory::new(),
            stable_analyzer(2),
            AgentOptions::new("alpha", REPO).with_secrets(vec![Secret::new("NPM_TOKEN", "n")]),
        );

        agent.initialize().await.unwrap();
        agent.initialize().await.unwrap();

        assert_eq!(launcher.launches(), 4);
        assert_eq!(agent.state().iteration, 2);
        assert_eq!(agent.state().transitions, vec![Transition::Rebuild]);
        assert_eq!(
            agent.state().current_provisioning.secrets,
            vec![Secret::new("NPM_TOKEN", "n")]
        );
        assert!(agent.state().is_ready);
    }

    #[tokio::test]
    async fn test_failed_rerun_is_not_ready() {
        let launcher = Arc::new(FakeLauncher::with_script([
            FakeBuild::Ready,
            FakeBuild::Ready,
            FakeBuild::Fail("first".to_string()),
            FakeBuild::Fail("second".to_string()),
            FakeBuild::Fail("third".to_string()),
        ]));
        let mut agent = agent(
            launcher,
            FakeTransportFactory::new(),
            stable_analyzer(1),
            AgentOptions::new("alpha", REPO),
        );
        agent.initialize().await.unwrap();
        assert!(agent.get_saved_provisioning().is_some());

        let err = agent.initialize().await.unwrap_err();

        assert!(matches!(err, AgentError::ErrorBudgetExceeded { .. }));
        assert!(!agent.state().is_ready);
        assert_eq!(agent.state().phase, AgentPhase::Failed);
        assert!(agent.state().last_analysis.is_none());
        assert!(agent.state().analyzed_at.is_none());
        assert!(agent.get_saved_provisioning().is_none());
        assert!(matches!(agent.client(), Err(AgentError::NotReady)));
    }

    #[test]
    fn test_default_workspace_is_the_clone_target() {
        assert_eq!(AgentOptions::new("alpha", REPO).workspace, WORKSPACE_DIR);
        assert_eq!(WORKSPACE_DIR, "/workspace");
    }

    #[test]
    fn test_explicit_secrets_win_over_default_token() {
        let explicit = vec![Secret::new("NPM_TOKEN", "n")];
        let resolved = resolve_secrets(&explicit, Some("ghp".to_string()));
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn test_default_token_becomes_github_secret() {
        let resolved = resolve_secrets(&[], Some("ghp".to_string()));
        assert_eq!(resolved, vec![Secret::new(GITHUB_TOKEN, "ghp")]);
        assert!(resolve_secrets(&[], None).is_empty());
    }
}
