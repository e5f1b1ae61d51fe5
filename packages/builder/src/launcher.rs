// ABOUTME: Seam between the lifecycle and the build pipeline
// ABOUTME: Each launch runs in its own task and reports back only through its event channel

use crate::docker::ContainerBuilder;
use crate::error::Result;
use crate::events::{self, BuildEvent, EventSink};
use async_trait::async_trait;
use bollard::Docker;
use bridgekit_config::BridgeSettings;
use bridgekit_core::{Clock, Provisioning, SystemClock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

/// Everything a build unit needs to produce one bridge
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub id: String,
    pub repo_url: String,
    pub provisioning: Provisioning,
    pub port: u16,
}

/// Caller's end of a running build unit
#[derive(Debug)]
pub struct LaunchHandle {
    pub events: mpsc::UnboundedReceiver<BuildEvent>,
    abort: Option<AbortHandle>,
}

impl LaunchHandle {
    pub fn new(events: mpsc::UnboundedReceiver<BuildEvent>, abort: Option<AbortHandle>) -> Self {
        Self { events, abort }
    }

    /// Force-stop the build unit
    pub fn terminate(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }
}

#[async_trait]
pub trait BridgeLauncher: Send + Sync {
    /// Start building a bridge in its own execution unit
    fn launch(&self, request: BuildRequest) -> LaunchHandle;

    /// Reclaim the bridge's container and image; best-effort
    async fn teardown(&self, id: &str);
}

/// Launcher running the Docker pipeline on a spawned task
pub struct DockerLauncher {
    builder: Arc<ContainerBuilder>,
}

impl DockerLauncher {
    pub fn new(settings: BridgeSettings) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::with_client(docker, settings, Arc::new(SystemClock)))
    }

    pub fn with_client(docker: Docker, settings: BridgeSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            builder: Arc::new(ContainerBuilder::new(docker, settings, clock)),
        }
    }
}

#[async_trait]
impl BridgeLauncher for DockerLauncher {
    fn launch(&self, request: BuildRequest) -> LaunchHandle {
        let (sink, events) = events::channel();
        let sink = sink.with_redactions(
            request
                .provisioning
                .secrets
                .iter()
                .map(|secret| secret.value.clone()),
        );
        let builder = self.builder.clone();

        let task = tokio::spawn(async move {
            run_to_completion(&builder, &request, &sink).await;
        });

        LaunchHandle::new(events, Some(task.abort_handle()))
    }

    async fn teardown(&self, id: &str) {
        match self.builder.teardown(id).await {
            Ok(()) => info!("Removed container and image for bridge {}", id),
            Err(e) => warn!("Failed to tear down bridge {}: {}", id, e),
        }
    }
}

async fn run_to_completion(builder: &ContainerBuilder, request: &BuildRequest, sink: &EventSink) {
    match builder.run(request, sink).await {
        Ok(()) => sink.ready(request.port),
        Err(e) => {
            let message = sink.scrub(&e.to_string());
            error!("Build of bridge {} failed: {}", request.id, message);
            sink.error(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_terminate_aborts_the_build_task() {
        let (sink, events) = events::channel();
        let task = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            sink.ready(1);
        });
        let mut handle = LaunchHandle::new(events, Some(task.abort_handle()));

        handle.terminate();

        // The sink is dropped with the aborted task, closing the channel
        assert_eq!(handle.events.recv().await, None);
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
