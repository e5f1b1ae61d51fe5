// ABOUTME: Analyzer seam: inspects a live bridge and reports what the repository needs
// ABOUTME: Detection heuristics live outside this crate; a fixed-result analyzer serves reruns and tests

use async_trait::async_trait;
use bridgekit_client::BridgeClient;
use bridgekit_core::{BridgeAnalysis, DEFAULT_BASE_IMAGE};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Inspect the repository checked out at `workspace` inside the bridge
    async fn analyze(&self, client: &BridgeClient, workspace: &str)
        -> anyhow::Result<BridgeAnalysis>;

    /// Image tag able to run the given project type
    fn base_image(&self, project_type: &str) -> String;
}

/// Analyzer that always answers with the same analysis
#[derive(Debug, Clone)]
pub struct StaticAnalyzer {
    analysis: BridgeAnalysis,
    base_image: String,
}

impl StaticAnalyzer {
    pub fn new(analysis: BridgeAnalysis, base_image: impl Into<String>) -> Self {
        Self {
            analysis,
            base_image: base_image.into(),
        }
    }
}

impl Default for StaticAnalyzer {
    fn default() -> Self {
        Self::new(BridgeAnalysis::default(), DEFAULT_BASE_IMAGE)
    }
}

#[async_trait]
impl Analyzer for StaticAnalyzer {
    async fn analyze(
        &self,
        _client: &BridgeClient,
        _workspace: &str,
    ) -> anyhow::Result<BridgeAnalysis> {
        Ok(self.analysis.clone())
    }

    fn base_image(&self, _project_type: &str) -> String {
        self.base_image.clone()
    }
}
