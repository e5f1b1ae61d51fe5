// ABOUTME: Newline-delimited JSON-RPC over a raw TCP socket
// ABOUTME: Background reader task frames inbound bytes and routes responses to waiting requests by id

use super::{event_channel, Transport, TransportEvent, CONNECT_ATTEMPTS, CONNECT_BACKOFF};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use bridgekit_protocol::{encode_line, FrameDecoder, FrameError, Request, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Read buffer size for the socket reader task
const READ_BUFFER_SIZE: usize = 8192;

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value>>>;

/// State shared between the transport handle and its reader task
struct Shared {
    connected: AtomicBool,
    /// Bumped on every new connection so a stale reader cannot tear down a fresh one
    generation: AtomicU64,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    pending: Mutex<PendingMap>,
    reader: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<TransportEvent>,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        // No subscribers is the normal case
        let _ = self.events.send(event);
    }

    /// Route one decoded frame
    fn dispatch(&self, frame: std::result::Result<Value, FrameError>) {
        let value = match frame {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse bridge message: {}", e);
                self.emit(TransportEvent::ProtocolError {
                    message: e.to_string(),
                });
                return;
            }
        };

        let has_id = value.get("id").map(|id| !id.is_null()).unwrap_or(false);
        if !has_id {
            if let Some(method) = value.get("method").and_then(Value::as_str) {
                self.emit(TransportEvent::Notification {
                    method: method.to_string(),
                    params: value.get("params").cloned().unwrap_or(Value::Null),
                });
                return;
            }
        }

        let response = match serde_json::from_value::<Response>(value) {
            Ok(response) => response,
            Err(e) => {
                warn!("Received message that is not a JSON-RPC response: {}", e);
                self.emit(TransportEvent::ProtocolError {
                    message: format!("Invalid response envelope: {}", e),
                });
                return;
            }
        };

        let Some(id) = response.numeric_id() else {
            self.emit(TransportEvent::ProtocolError {
                message: "Response without a numeric id".to_string(),
            });
            return;
        };

        let waiter = self.pending.lock().ok().and_then(|mut p| p.remove(&id));
        match waiter {
            Some(tx) => {
                let _ = tx.send(response.into_result().map_err(ClientError::from));
            }
            None => debug!("Dropping response for unknown request id {}", id),
        }
    }

    fn fail_pending(&self, reason: &str) {
        let drained: Vec<_> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().collect(),
            Err(_) => Vec::new(),
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(ClientError::Disconnected(reason.to_string())));
        }
    }

    /// Transition to disconnected and notify listeners
    async fn mark_disconnected(&self, reason: &str, generation: Option<u64>, abort_reader: bool) {
        if let Some(generation) = generation {
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
        }

        let was_connected = self.connected.swap(false, Ordering::SeqCst);

        if abort_reader {
            if let Some(handle) = self.reader.lock().ok().and_then(|mut r| r.take()) {
                handle.abort();
            }
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        self.fail_pending(reason);

        if was_connected {
            info!("Bridge connection closed: {}", reason);
            self.emit(TransportEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
    }
}

/// JSON-RPC client transport over a raw TCP socket
pub struct SocketTransport {
    addr: String,
    request_timeout: Duration,
    next_id: AtomicU64,
    connect_lock: tokio::sync::Mutex<()>,
    shared: Arc<Shared>,
}

impl SocketTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            request_timeout: super::DEFAULT_REQUEST_TIMEOUT,
            next_id: AtomicU64::new(0),
            connect_lock: tokio::sync::Mutex::new(()),
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                writer: tokio::sync::Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                reader: Mutex::new(None),
                events: event_channel(),
            }),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn attach(&self, stream: TcpStream) {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.shared.writer.lock().await = Some(write_half);
        self.shared.connected.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            Self::read_loop(read_half, shared, generation).await;
        });
        if let Ok(mut reader) = self.shared.reader.lock() {
            if let Some(old) = reader.replace(handle) {
                old.abort();
            }
        }

        self.shared.emit(TransportEvent::Connected);
    }

    /// Read frames until the socket closes or errors
    async fn read_loop(mut read_half: OwnedReadHalf, shared: Arc<Shared>, generation: u64) {
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let reason = loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    if let Some(frame) = decoder.finish() {
                        shared.dispatch(frame);
                    }
                    break "connection closed by peer".to_string();
                }
                Ok(n) => {
                    for frame in decoder.push(&buf[..n]) {
                        shared.dispatch(frame);
                    }
                }
                Err(e) => break format!("socket error: {}", e),
            }
        };

        shared
            .mark_disconnected(&reason, Some(generation), false)
            .await;
        debug!("Bridge socket reader task ended");
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let mut last_error = String::new();
        for attempt in 1..=CONNECT_ATTEMPTS {
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    self.attach(stream).await;
                    debug!("Connected to bridge at {} (attempt {})", self.addr, attempt);
                    return Ok(());
                }
                Err(e) => {
                    debug!(
                        "Connection attempt {} to {} failed: {}",
                        attempt, self.addr, e
                    );
                    last_error = e.to_string();
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(CONNECT_BACKOFF).await;
                    }
                }
            }
        }

        Err(ClientError::ConnectFailed {
            addr: self.addr.clone(),
            attempts: CONNECT_ATTEMPTS,
            message: last_error,
        })
    }

    async fn request(&self, method: &str, params: Value, timeout: Option<Duration>) -> Result<Value> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let line = encode_line(&Request::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.insert(id, tx);
        }

        let write_result = {
            let mut writer = self.shared.writer.lock().await;
            match writer.as_mut() {
                Some(writer) => writer.write_all(&line).await,
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "writer closed",
                )),
            }
        };

        if let Err(e) = write_result {
            if let Ok(mut pending) = self.shared.pending.lock() {
                pending.remove(&id);
            }
            self.shared
                .mark_disconnected(&format!("write failed: {}", e), None, true)
                .await;
            return Err(ClientError::Io(e));
        }

        let timeout = timeout.unwrap_or(self.request_timeout);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Disconnected(
                "response channel dropped".to_string(),
            )),
            Err(_) => {
                if let Ok(mut pending) = self.shared.pending.lock() {
                    pending.remove(&id);
                }
                self.shared
                    .mark_disconnected(&format!("{} timed out", method), None, true)
                    .await;
                Err(ClientError::Timeout {
                    method: method.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    async fn disconnect(&self) {
        self.shared
            .mark_disconnected("closed by client", None, true)
            .await;
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.reader.lock().ok().and_then(|mut r| r.take()) {
            handle.abort();
        }
    }
}
