// ABOUTME: Typed RPC stub for one bridge's in-container server
// ABOUTME: Wraps a Transport with handshake, health, exec, logs, filesystem, and git calls

use crate::error::{ClientError, Result};
use crate::transport::Transport;
use bridgekit_protocol::{methods, InitializeRequest, InitializeResult, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Client name sent in the initialize handshake
const CLIENT_NAME: &str = "bridgekit-client";

/// Short timeout for handshake and health probes
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default command timeout passed to `exec/run`
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(600);

/// Extra time the client waits beyond the server-side command timeout
const EXEC_RESPONSE_GRACE: Duration = Duration::from_secs(30);

/// Output of a command run inside the bridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutput {
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub timed_out: bool,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Answer to `bridge/health`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub uptime_secs: u64,
    #[serde(default)]
    pub version: String,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// One entry returned by `fs/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    #[serde(default)]
    pub size: u64,
}

/// Answer to `fs/stat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub is_file: bool,
    pub is_dir: bool,
    pub size: u64,
    #[serde(default)]
    pub modified: Option<String>,
}

/// RPC client bound to one bridge port
pub struct BridgeClient {
    transport: Arc<dyn Transport>,
    port: u16,
}

impl BridgeClient {
    pub fn new(transport: Arc<dyn Transport>, port: u16) -> Self {
        Self { transport, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Call a method, reconnecting first if the transport has dropped
    pub async fn call_raw(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if !self.transport.is_connected() {
            debug!("Reconnecting to bridge on port {} before {}", self.port, method);
            self.transport.connect().await?;
        }
        self.transport.request(method, params, timeout).await
    }

    /// Call a bridge tool and decode its content/metadata result
    pub async fn call_tool(&self, method: &str, params: Value) -> Result<ToolResult> {
        self.call_tool_with_timeout(method, params, None).await
    }

    async fn call_tool_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<ToolResult> {
        let value = self.call_raw(method, params, timeout).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::Protocol(format!("Invalid {} result: {}", method, e)))
    }

    /// Perform the MCP handshake
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let request = InitializeRequest::new(CLIENT_NAME, env!("CARGO_PKG_VERSION"));
        let value = self
            .call_raw(
                methods::INITIALIZE,
                serde_json::to_value(request)?,
                Some(PROBE_TIMEOUT),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn health(&self) -> Result<HealthReport> {
        let result = self
            .call_tool_with_timeout(methods::BRIDGE_HEALTH, json!({}), Some(PROBE_TIMEOUT))
            .await?;
        Ok(serde_json::from_value(result.metadata)?)
    }

    pub async fn execute(&self, command: &str, cwd: Option<&str>) -> Result<ExecOutput> {
        self.execute_with_timeout(command, cwd, DEFAULT_EXEC_TIMEOUT)
            .await
    }

    pub async fn execute_with_timeout(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Duration,
    ) -> Result<ExecOutput> {
        let mut params = json!({
            "command": command,
            "timeoutSecs": timeout.as_secs(),
        });
        if let Some(cwd) = cwd {
            params["cwd"] = json!(cwd);
        }

        let result = self
            .call_tool_with_timeout(methods::EXEC_RUN, params, Some(timeout + EXEC_RESPONSE_GRACE))
            .await?;
        Ok(serde_json::from_value(result.metadata)?)
    }

    /// Last `lines` lines of the server's log buffer
    pub async fn get_logs(&self, lines: usize) -> Result<Vec<String>> {
        let result = self
            .call_tool(methods::BRIDGE_LOGS, json!({ "lines": lines }))
            .await?;
        match result.metadata.get("lines") {
            Some(lines) => Ok(serde_json::from_value(lines.clone())?),
            None => Ok(result
                .first_text()
                .lines()
                .map(str::to_string)
                .collect()),
        }
    }

    pub async fn read_file(&self, path: &str) -> Result<String> {
        let result = self.call_tool(methods::FS_READ, json!({ "path": path })).await?;
        Ok(result.first_text().to_string())
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.call_tool(methods::FS_WRITE, json!({ "path": path, "content": content }))
            .await?;
        Ok(())
    }

    pub async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let result = self.call_tool(methods::FS_LIST, json!({ "path": path })).await?;
        let entries = result
            .metadata
            .get("entries")
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(entries)?)
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        let result = self.call_tool(methods::FS_EXISTS, json!({ "path": path })).await?;
        Ok(result
            .metadata
            .get("exists")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    pub async fn stat(&self, path: &str) -> Result<FileStat> {
        let result = self.call_tool(methods::FS_STAT, json!({ "path": path })).await?;
        Ok(serde_json::from_value(result.metadata)?)
    }

    pub async fn clone_repo(&self, url: &str, path: &str, branch: Option<&str>) -> Result<ToolResult> {
        let mut params = json!({ "url": url, "path": path });
        if let Some(branch) = branch {
            params["branch"] = json!(branch);
        }
        self.call_tool_with_timeout(methods::GIT_CLONE, params, Some(DEFAULT_EXEC_TIMEOUT))
            .await
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("port", &self.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportEvent;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    /// Transport answering from a canned method → result table
    struct CannedTransport {
        connected: AtomicBool,
        connects: AtomicUsize,
        calls: Mutex<Vec<(String, Value)>>,
        answer: fn(&str, &Value) -> Value,
    }

    impl CannedTransport {
        fn new(answer: fn(&str, &Value) -> Value) -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
                answer,
            })
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn connect(&self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn request(&self, method: &str, params: Value, _timeout: Option<Duration>) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params.clone()));
            Ok((self.answer)(method, &params))
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

    #[tokio::test]
    async fn test_execute_decodes_metadata() {
        let transport = CannedTransport::new(|_, _| {
            json!({
                "content": [{"type": "text", "text": "hi\n"}],
                "metadata": {"exitCode": 0, "stdout": "hi\n", "stderr": "", "timedOut": false}
            })
        });
        let client = BridgeClient::new(transport.clone(), 7100);

        let output = client.execute("echo hi", Some("/workspace")).await.unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "hi\n");
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].0, "exec/run");
        assert_eq!(calls[0].1["cwd"], json!("/workspace"));
        assert_eq!(calls[0].1["timeoutSecs"], json!(600));
    }

    #[tokio::test]
    async fn test_call_reconnects_when_disconnected() {
        let transport = CannedTransport::new(|_, _| {
            json!({"content": [], "metadata": {"status": "ok", "uptimeSecs": 3}})
        });
        let client = BridgeClient::new(transport.clone(), 7100);

        let health = client.health().await.unwrap();
        assert!(health.is_ok());
        assert_eq!(health.uptime_secs, 3);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);

        client.health().await.unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_logs_prefers_metadata_lines() {
        let transport = CannedTransport::new(|_, params| {
            assert_eq!(params["lines"], json!(2));
            json!({
                "content": [{"type": "text", "text": "ignored"}],
                "metadata": {"lines": ["first", "second"]}
            })
        });
        let client = BridgeClient::new(transport, 7100);

        assert_eq!(client.get_logs(2).await.unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_initialize_reports_server_identity() {
        let transport = CannedTransport::new(|method, _| {
            assert_eq!(method, "initialize");
            serde_json::to_value(InitializeResult::for_bridge_server("0.1.0")).unwrap()
        });
        let client = BridgeClient::new(transport, 7100);

        assert!(client.initialize().await.unwrap().is_bridge_server());
    }

    #[tokio::test]
    async fn test_malformed_tool_result_is_protocol_error() {
        let transport = CannedTransport::new(|_, _| json!("just a string"));
        let client = BridgeClient::new(transport, 7100);

        let result = client.read_file("README.md").await;
        assert!(matches!(result, Err(ClientError::Protocol(_))));
    }
}
