// ABOUTME: In-process fakes of the launcher and transport seams
// ABOUTME: Lets lifecycle and agent logic run without Docker or sockets

use async_trait::async_trait;
use bridgekit_builder::{events, BridgeLauncher, BuildRequest, LaunchHandle};
use bridgekit_client::{ClientError, Transport, TransportEvent, TransportFactory};
use bridgekit_protocol::{methods, InitializeResult, RpcError, ToolResult};
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Scripted outcome of one fake build
#[derive(Debug, Clone, PartialEq)]
pub enum FakeBuild {
    Ready,
    Fail(String),
    /// Never reports back
    Hang,
    /// Ends without a terminal event
    Vanish,
}

/// Launcher that plays back scripted build outcomes
#[derive(Default)]
pub struct FakeLauncher {
    script: Mutex<VecDeque<FakeBuild>>,
    requests: Mutex<Vec<BuildRequest>>,
    teardowns: Arc<Mutex<Vec<String>>>,
    /// `launch <id>` and `teardown <id>` in completion order
    history: Mutex<Vec<String>>,
    teardown_delay: Duration,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for the next launches; unscripted launches succeed
    pub fn with_script(script: impl IntoIterator<Item = FakeBuild>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Make every teardown take this long before it completes
    pub fn with_teardown_delay(mut self, delay: Duration) -> Self {
        self.teardown_delay = delay;
        self
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn launches(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn teardowns(&self) -> Vec<String> {
        self.teardowns.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BridgeLauncher for FakeLauncher {
    fn launch(&self, request: BuildRequest) -> LaunchHandle {
        let outcome = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(FakeBuild::Ready);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.record(format!("launch {}", request.id));

        let (sink, rx) = events::channel();
        let task = tokio::spawn(async move {
            sink.info(format!("fake build of {}", request.id));
            match outcome {
                FakeBuild::Ready => sink.ready(request.port),
                FakeBuild::Fail(message) => sink.error(message),
                FakeBuild::Hang => {
                    std::future::pending::<()>().await;
                }
                FakeBuild::Vanish => {}
            }
        });

        LaunchHandle::new(rx, Some(task.abort_handle()))
    }

    async fn teardown(&self, id: &str) {
        if !self.teardown_delay.is_zero() {
            tokio::time::sleep(self.teardown_delay).await;
        }
        if let Ok(mut teardowns) = self.teardowns.lock() {
            teardowns.push(id.to_string());
        }
        self.record(format!("teardown {}", id));
    }
}

impl FakeLauncher {
    fn record(&self, entry: String) {
        if let Ok(mut history) = self.history.lock() {
            history.push(entry);
        }
    }
}

/// Shared state behind every fake transport a factory opens
#[derive(Default)]
pub struct FakeBridgeState {
    opened: Mutex<Vec<u16>>,
    unhealthy_ports: Mutex<HashSet<u16>>,
    commands: Mutex<Vec<String>>,
    failing_commands: Mutex<HashSet<String>>,
    logs: Mutex<Vec<String>>,
}

impl FakeBridgeState {
    pub fn opened_ports(&self) -> Vec<u16> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn set_unhealthy(&self, port: u16) {
        if let Ok(mut ports) = self.unhealthy_ports.lock() {
            ports.insert(port);
        }
    }

    /// Make `exec/run` of this exact command exit non-zero
    pub fn fail_command(&self, command: &str) {
        if let Ok(mut commands) = self.failing_commands.lock() {
            commands.insert(command.to_string());
        }
    }

    pub fn push_log(&self, line: &str) {
        if let Ok(mut logs) = self.logs.lock() {
            logs.push(line.to_string());
        }
    }

    fn is_healthy(&self, port: u16) -> bool {
        self.unhealthy_ports
            .lock()
            .map(|p| !p.contains(&port))
            .unwrap_or(false)
    }

    fn answer(&self, port: u16, method: &str, params: &Value) -> Result<Value, ClientError> {
        let result = match method {
            methods::INITIALIZE => {
                return Ok(serde_json::to_value(InitializeResult::for_bridge_server("test"))?)
            }
            methods::BRIDGE_HEALTH => {
                let status = if self.is_healthy(port) { "ok" } else { "degraded" };
                ToolResult::text(status, json!({ "status": status }))
            }
            methods::BRIDGE_LOGS => {
                let lines = self.logs.lock().map(|l| l.clone()).unwrap_or_default();
                let wanted = params.get("lines").and_then(Value::as_u64).unwrap_or(100) as usize;
                let tail: Vec<String> = lines
                    .iter()
                    .skip(lines.len().saturating_sub(wanted))
                    .cloned()
                    .collect();
                ToolResult::text(tail.join("\n"), json!({ "lines": tail }))
            }
            methods::EXEC_RUN => {
                let command = params
                    .get("command")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let fails = self
                    .failing_commands
                    .lock()
                    .map(|f| f.contains(&command))
                    .unwrap_or(false);
                if let Ok(mut commands) = self.commands.lock() {
                    commands.push(command);
                }
                let exit_code = if fails { 1 } else { 0 };
                ToolResult::text(
                    "",
                    json!({ "exitCode": exit_code, "stdout": "", "stderr": if fails { "failed" } else { "" } }),
                )
            }
            other => return Err(RpcError::method_not_found(other).into()),
        };
        Ok(serde_json::to_value(result)?)
    }
}

/// Factory handing out fake transports bound to a shared state
#[derive(Default, Clone)]
pub struct FakeTransportFactory {
    state: Arc<FakeBridgeState>,
}

impl FakeTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<FakeBridgeState> {
        self.state.clone()
    }
}

impl TransportFactory for FakeTransportFactory {
    fn open(&self, _host: &str, port: u16) -> Arc<dyn Transport> {
        if let Ok(mut opened) = self.state.opened.lock() {
            opened.push(port);
        }
        Arc::new(FakeTransport {
            port,
            connected: AtomicBool::new(false),
            state: self.state.clone(),
        })
    }
}

pub struct FakeTransport {
    port: u16,
    connected: AtomicBool,
    state: Arc<FakeBridgeState>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self) -> bridgekit_client::Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        _timeout: Option<Duration>,
    ) -> bridgekit_client::Result<Value> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.state.answer(self.port, method, &params)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        broadcast::channel(1).1
    }
}
