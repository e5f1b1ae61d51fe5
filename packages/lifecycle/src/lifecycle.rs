// ABOUTME: The only component that creates and destroys bridges
// ABOUTME: Allocates ports, drives a build unit to ready, re-checks health, and tracks live instances

use crate::error::{LifecycleError, Result};
use crate::ports::PortAllocator;
use bridgekit_builder::{BridgeLauncher, BuildEvent, BuildRequest, LogLevel};
use bridgekit_client::{BridgeClient, TransportFactory};
use bridgekit_config::BridgeSettings;
use bridgekit_core::{poll, Clock, Provisioning, SystemClock};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A live bridge tracked by the lifecycle
#[derive(Debug, Clone)]
pub struct BridgeInstance {
    pub id: String,
    pub port: u16,
    pub client: Arc<BridgeClient>,
    pub provisioning: Provisioning,
    pub created_at: DateTime<Utc>,
}

pub struct BridgeLifecycle {
    launcher: Arc<dyn BridgeLauncher>,
    transports: Arc<dyn TransportFactory>,
    clock: Arc<dyn Clock>,
    settings: BridgeSettings,
    instances: HashMap<String, BridgeInstance>,
    ports: PortAllocator,
    /// Background teardowns by bridge id; a new build of the same id waits for its teardown
    teardowns: HashMap<String, JoinHandle<()>>,
}

impl BridgeLifecycle {
    pub fn new(
        launcher: Arc<dyn BridgeLauncher>,
        transports: Arc<dyn TransportFactory>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            launcher,
            transports,
            clock: Arc::new(SystemClock),
            ports: PortAllocator::new(settings.base_port),
            settings,
            instances: HashMap::new(),
            teardowns: HashMap::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn get(&self, id: &str) -> Option<&BridgeInstance> {
        self.instances.get(id)
    }

    pub fn client(&self, id: &str) -> Result<Arc<BridgeClient>> {
        self.instances
            .get(id)
            .map(|instance| instance.client.clone())
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.instances.keys().cloned().collect()
    }

    /// Build, start, and register a bridge
    pub async fn create_bridge(
        &mut self,
        id: &str,
        repo_url: &str,
        provisioning: Provisioning,
    ) -> Result<BridgeInstance> {
        if self.instances.contains_key(id) {
            return Err(LifecycleError::AlreadyExists(id.to_string()));
        }
        self.await_teardown(id).await;

        let port = self.ports.allocate()?;
        info!(
            "Creating bridge {} on port {} from {}",
            id, port, provisioning.base_image
        );

        let mut handle = self.launcher.launch(BuildRequest {
            id: id.to_string(),
            repo_url: repo_url.to_string(),
            provisioning: provisioning.clone(),
            port,
        });

        let outcome = tokio::time::timeout(
            self.settings.startup_timeout,
            await_build(id, &mut handle.events),
        )
        .await;

        match outcome {
            Ok(Ok(ready_port)) => {
                if ready_port != port {
                    warn!(
                        "Builder for {} reported port {} but {} was allocated",
                        id, ready_port, port
                    );
                }
            }
            Ok(Err(e)) => {
                error!("Bridge {} failed to build: {}", id, e);
                self.spawn_teardown(id);
                return Err(e);
            }
            Err(_) => {
                error!(
                    "Bridge {} did not start within {:?}; terminating build",
                    id, self.settings.startup_timeout
                );
                handle.terminate();
                self.spawn_teardown(id);
                return Err(LifecycleError::StartupTimeout {
                    id: id.to_string(),
                    seconds: self.settings.startup_timeout.as_secs(),
                });
            }
        }

        let client = Arc::new(BridgeClient::new(
            self.transports.open(&self.settings.host, port),
            port,
        ));

        if !self.poll_health(&client).await {
            client.disconnect().await;
            self.spawn_teardown(id);
            return Err(LifecycleError::Unhealthy(id.to_string()));
        }

        let instance = BridgeInstance {
            id: id.to_string(),
            port,
            client,
            provisioning,
            created_at: Utc::now(),
        };
        self.instances.insert(id.to_string(), instance.clone());
        info!("Bridge {} is up on port {}", id, port);
        Ok(instance)
    }

    /// Disconnect and stop tracking a bridge; container removal happens in the background
    ///
    /// A later create of the same id waits for that removal before launching.
    pub async fn destroy_bridge(&mut self, id: &str) {
        let Some(instance) = self.instances.remove(id) else {
            debug!("destroy_bridge: {} is not tracked", id);
            return;
        };

        info!("Destroying bridge {} (port {})", id, instance.port);
        instance.client.disconnect().await;
        self.spawn_teardown(id);
    }

    /// Destroy then create; a failed create leaves the id unregistered
    pub async fn recreate_bridge(
        &mut self,
        id: &str,
        repo_url: &str,
        provisioning: Provisioning,
    ) -> Result<BridgeInstance> {
        self.destroy_bridge(id).await;
        self.create_bridge(id, repo_url, provisioning).await
    }

    pub async fn is_healthy(&self, id: &str) -> bool {
        let Some(instance) = self.instances.get(id) else {
            return false;
        };
        match instance.client.health().await {
            Ok(report) => report.is_ok(),
            Err(e) => {
                debug!("Health check for {} failed: {}", id, e);
                false
            }
        }
    }

    pub async fn get_logs(&self, id: &str, lines: usize) -> Vec<String> {
        let Some(instance) = self.instances.get(id) else {
            return Vec::new();
        };
        match instance.client.get_logs(lines).await {
            Ok(logs) => logs,
            Err(e) => {
                debug!("Fetching logs for {} failed: {}", id, e);
                Vec::new()
            }
        }
    }

    pub async fn destroy_all(&mut self) {
        for id in self.ids() {
            self.destroy_bridge(&id).await;
        }
    }

    /// Connect and check health from the orchestrator's side, bounded by the health deadline
    async fn poll_health(&self, client: &BridgeClient) -> bool {
        poll(
            &*self.clock,
            self.settings.poll_interval,
            self.settings.health_timeout,
            move || async move {
                if let Err(e) = client.connect().await {
                    debug!("Bridge on port {} not reachable yet: {}", client.port(), e);
                    return false;
                }
                matches!(client.health().await, Ok(report) if report.is_ok())
            },
        )
        .await
    }

    /// Teardowns of one id run in order, each after the previous one finished
    fn spawn_teardown(&mut self, id: &str) {
        self.teardowns.retain(|_, task| !task.is_finished());

        let launcher = self.launcher.clone();
        let previous = self.teardowns.remove(id);
        let target = id.to_string();
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            launcher.teardown(&target).await;
        });
        self.teardowns.insert(id.to_string(), task);
    }

    async fn await_teardown(&mut self, id: &str) {
        let Some(pending) = self.teardowns.remove(id) else {
            return;
        };
        debug!("Waiting for teardown of {} before rebuilding", id);
        if let Err(e) = pending.await {
            warn!("Teardown of {} did not complete: {}", id, e);
        }
    }
}

/// Forward build logs until the build unit reports its outcome
async fn await_build(id: &str, events: &mut mpsc::UnboundedReceiver<BuildEvent>) -> Result<u16> {
    while let Some(event) = events.recv().await {
        match event {
            BuildEvent::Log { level, message } => match level {
                LogLevel::Debug => debug!("[{}] {}", id, message),
                LogLevel::Info => info!("[{}] {}", id, message),
                LogLevel::Warn => warn!("[{}] {}", id, message),
                LogLevel::Error => error!("[{}] {}", id, message),
            },
            BuildEvent::Ready { port } => return Ok(port),
            BuildEvent::Error { message } => return Err(LifecycleError::Build(message)),
        }
    }
    Err(LifecycleError::BuildUnitLost(id.to_string()))
}
