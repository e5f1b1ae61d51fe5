// ABOUTME: Docker implementation of the bridge container build pipeline
// ABOUTME: Pulls the base image, builds from a tar context, starts with secrets, clones, validates, and probes readiness

use crate::error::{BuildError, Result};
use crate::events::EventSink;
use crate::launcher::BuildRequest;
use crate::plan::{build_context, container_name, image_tag, BuildPlan, CACHE_DIR};
use crate::readiness::{ready_or_crash, wait_for_handshake};
use bollard::{
    container::{
        Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
        StartContainerOptions, WaitContainerOptions,
    },
    exec::{CreateExecOptions, StartExecResults},
    image::{BuildImageOptions, CreateImageOptions, RemoveImageOptions},
    models::{HostConfig, PortBinding},
    volume::CreateVolumeOptions,
    Docker,
};
use bridgekit_client::{BridgeClient, DefaultTransportFactory, TransportFactory};
use bridgekit_config::BridgeSettings;
use bridgekit_core::Clock;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Label prefix on every container and volume bridgekit creates
pub const LABEL_PREFIX: &str = "bridgekit";

/// Timeout for pulling a base image (10 minutes)
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Log lines attached to a crash report
const CRASH_LOG_TAIL: &str = "50";

pub struct ContainerBuilder {
    docker: Docker,
    settings: BridgeSettings,
    clock: Arc<dyn Clock>,
}

impl ContainerBuilder {
    pub fn new(docker: Docker, settings: BridgeSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            docker,
            settings,
            clock,
        }
    }

    /// Run the full pipeline for one bridge; returns once the server answers the handshake
    pub async fn run(&self, request: &BuildRequest, sink: &EventSink) -> Result<()> {
        let plan = BuildPlan::new(
            &request.id,
            &request.repo_url,
            &request.provisioning,
            request.port,
            self.settings.transport,
        )?;
        let sink = &sink.clone().with_redactions(plan.secret_values());
        sink.info(format!(
            "Building bridge {} from {} on port {}",
            plan.id(),
            plan.base_image(),
            plan.port()
        ));

        self.pull_base_image(plan.base_image(), sink).await?;
        self.build_image(&plan, sink).await?;
        self.ensure_cache_volume().await?;

        let name = plan.container_name();
        self.remove_container(&name).await?;
        self.create_container(&plan).await?;
        self.docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await?;
        sink.info(format!("Started container {}", name));

        if let Some(command) = plan.clone_command() {
            sink.info("Cloning repository into the workspace");
            let (exit_code, output) = self.exec(&name, command).await?;
            if exit_code != 0 {
                return Err(BuildError::Validation(format!(
                    "repository clone exited with {}: {}",
                    exit_code,
                    sink.scrub(&output)
                )));
            }
        }

        self.validate(&plan, sink).await?;
        self.wait_ready(&plan, sink).await?;

        info!("Bridge {} ready on port {}", plan.id(), plan.port());
        Ok(())
    }

    /// Force-remove a bridge's container and image; missing ones are not an error
    pub async fn teardown(&self, id: &str) -> Result<()> {
        self.remove_container(&container_name(id)).await?;
        self.remove_image(&image_tag(id)).await
    }

    async fn pull_base_image(&self, image: &str, sink: &EventSink) -> Result<()> {
        if self.image_exists(image).await? {
            debug!("Base image {} already present", image);
            return Ok(());
        }

        sink.info(format!("Pulling base image {}", image));
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);

        let result = tokio::time::timeout(PULL_TIMEOUT, async {
            let mut last_status = String::new();
            while let Some(item) = stream.next().await {
                let info = item.map_err(|e| {
                    BuildError::Image(format!("Failed to pull image {}: {}", image, e))
                })?;
                if let Some(error) = info.error {
                    return Err(BuildError::Image(format!(
                        "Failed to pull image {}: {}",
                        image, error
                    )));
                }
                if let Some(status) = info.status {
                    if status != last_status {
                        sink.debug(format!("Pull: {}", status));
                        last_status = status;
                    }
                }
            }
            Ok(())
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(BuildError::Image(format!(
                "Timeout pulling image {} after {:?}",
                image, PULL_TIMEOUT
            ))),
        }
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(BuildError::Image(e.to_string())),
        }
    }

    async fn build_image(&self, plan: &BuildPlan, sink: &EventSink) -> Result<()> {
        if !self.settings.server_binary.is_file() {
            return Err(BuildError::Configuration(format!(
                "Server binary not found at {}",
                self.settings.server_binary.display()
            )));
        }

        let context = build_context(&plan.to_dockerfile(), &self.settings.server_binary)?;
        let tag = plan.image_tag();
        sink.info(format!("Building image {}", tag));

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: tag.clone(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };
        let mut stream = self.docker.build_image(options, None, Some(context.into()));

        while let Some(item) = stream.next().await {
            let info = item.map_err(|e| BuildError::Image(format!("Build of {} failed: {}", tag, e)))?;
            if let Some(error) = info.error {
                return Err(BuildError::Image(format!("Build of {} failed: {}", tag, error)));
            }
            if let Some(output) = info.stream {
                let line = output.trim_end();
                if !line.is_empty() {
                    sink.debug(line.to_string());
                }
            }
        }

        sink.info(format!("Built image {}", tag));
        Ok(())
    }

    async fn ensure_cache_volume(&self) -> Result<()> {
        let options = CreateVolumeOptions {
            name: self.settings.cache_volume.clone(),
            labels: HashMap::from([(format!("{}.managed", LABEL_PREFIX), "true".to_string())]),
            ..Default::default()
        };
        // Creating an existing named volume returns the existing one
        self.docker.create_volume(options).await?;
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => {
                debug!("Removed container {}", name);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_image(&self, tag: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_image(tag, Some(options), None).await {
            Ok(_) => {
                debug!("Removed image {}", tag);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn container_config(&self, plan: &BuildPlan) -> Config<String> {
        let labels = HashMap::from([
            (format!("{}.managed", LABEL_PREFIX), "true".to_string()),
            (format!("{}.bridge_id", LABEL_PREFIX), plan.id().to_string()),
        ]);

        let container_port = format!("{}/tcp", plan.port());
        let exposed_ports = HashMap::from([(container_port.clone(), HashMap::new())]);
        let port_bindings = HashMap::from([(
            container_port,
            Some(vec![PortBinding {
                host_ip: Some(self.settings.host.clone()),
                host_port: Some(plan.port().to_string()),
            }]),
        )]);

        let host_config = HostConfig {
            binds: Some(vec![format!("{}:{}", self.settings.cache_volume, CACHE_DIR)]),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        let env = plan.runtime_env();

        Config {
            image: Some(plan.image_tag()),
            env: (!env.is_empty()).then_some(env),
            labels: Some(labels),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    async fn create_container(&self, plan: &BuildPlan) -> Result<()> {
        let options = CreateContainerOptions {
            name: plan.container_name(),
            platform: None,
        };
        let container = self
            .docker
            .create_container(Some(options), self.container_config(plan))
            .await?;
        debug!("Created container {}", container.id);
        Ok(())
    }

    async fn validate(&self, plan: &BuildPlan, sink: &EventSink) -> Result<()> {
        let command = plan.validation_command();
        sink.debug(format!("Validating with {:?}", command));

        let (exit_code, output) = self.exec(&plan.container_name(), command).await?;
        if exit_code != 0 {
            return Err(BuildError::Validation(format!(
                "exit code {}: {}",
                exit_code,
                sink.scrub(&output)
            )));
        }
        Ok(())
    }

    /// Run a command in the container; returns its exit code and combined output
    async fn exec(&self, name: &str, command: Vec<String>) -> Result<(i64, String)> {
        let exec = self
            .docker
            .create_exec(
                name,
                CreateExecOptions {
                    cmd: Some(command),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = Vec::new();
        match self.docker.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { output: mut stream, .. } => {
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(LogOutput::StdOut { message })
                        | Ok(LogOutput::StdErr { message })
                        | Ok(LogOutput::Console { message }) => output.extend_from_slice(&message),
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(BuildError::Validation(
                    "Exec was detached unexpectedly".to_string(),
                ))
            }
        }

        let exit_code = self.docker.inspect_exec(&exec.id).await?.exit_code.unwrap_or(0);
        Ok((exit_code, String::from_utf8_lossy(&output).trim().to_string()))
    }

    async fn wait_ready(&self, plan: &BuildPlan, sink: &EventSink) -> Result<()> {
        sink.info(format!("Waiting for bridge handshake on port {}", plan.port()));

        let transport = DefaultTransportFactory::new(self.settings.transport)
            .open(&self.settings.host, plan.port());
        let client = BridgeClient::new(transport, plan.port());

        let name = plan.container_name();
        let ready = wait_for_handshake(
            &*self.clock,
            &client,
            self.settings.poll_interval,
            self.settings.ready_timeout,
        );
        let result = ready_or_crash(ready, self.watch_exit(&name), self.settings.ready_timeout).await;
        client.disconnect().await;

        match result {
            Err(BuildError::Crashed(reason)) => {
                let tail = self.tail_logs(&name).await;
                Err(BuildError::Crashed(if tail.is_empty() {
                    reason
                } else {
                    format!("{}\n{}", reason, tail)
                }))
            }
            other => other,
        }
    }

    /// Resolves once the container stops running
    async fn watch_exit(&self, name: &str) -> String {
        let mut stream = self.docker.wait_container(
            name,
            Some(WaitContainerOptions {
                condition: "not-running".to_string(),
            }),
        );

        match stream.next().await {
            Some(Ok(response)) => format!("container exited with status {}", response.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { error, code })) => {
                format!("container exited with status {}: {}", code, error)
            }
            Some(Err(e)) => {
                warn!("Cannot watch container {}: {}", name, e);
                std::future::pending().await
            }
            None => std::future::pending().await,
        }
    }

    async fn tail_logs(&self, name: &str) -> String {
        let mut stream = self.docker.logs(
            name,
            Some(LogsOptions {
                stdout: true,
                stderr: true,
                tail: CRASH_LOG_TAIL.to_string(),
                ..Default::default()
            }),
        );

        let mut logs = Vec::new();
        while let Some(Ok(chunk)) = stream.next().await {
            logs.extend_from_slice(&chunk.into_bytes());
        }
        String::from_utf8_lossy(&logs).trim().to_string()
    }
}
