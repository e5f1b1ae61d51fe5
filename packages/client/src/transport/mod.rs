// ABOUTME: Transport trait for host-to-bridge JSON-RPC
// ABOUTME: Socket and HTTP implementations plus a factory binding a transport to a port

use crate::Result;
use async_trait::async_trait;
use bridgekit_config::TransportKind;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub mod http;
pub mod socket;

pub use http::HttpTransport;
pub use socket::SocketTransport;

/// Connection attempts made by `connect` before giving up
pub const CONNECT_ATTEMPTS: u32 = 3;

/// Fixed backoff between connection attempts
pub const CONNECT_BACKOFF: Duration = Duration::from_millis(250);

/// Default time to wait for a single RPC response
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Capacity of the transport event channel
const EVENT_CHANNEL_SIZE: usize = 64;

/// Events published to transport listeners
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    /// A frame could not be parsed; the connection stays up
    ProtocolError { message: String },
    /// Server-initiated message without an id
    Notification { method: String, params: Value },
}

/// JSON-RPC transport to one bridge server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection; a no-op when already connected
    async fn connect(&self) -> Result<()>;

    /// Send one request and wait for its correlated response
    ///
    /// `timeout` overrides the transport's default request timeout. A request
    /// that times out leaves the transport disconnected.
    async fn request(&self, method: &str, params: Value, timeout: Option<Duration>)
        -> Result<Value>;

    /// Close the connection; safe to call repeatedly
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Subscribe to connection and protocol events
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Opens transports bound to a host port
pub trait TransportFactory: Send + Sync {
    fn open(&self, host: &str, port: u16) -> Arc<dyn Transport>;
}

/// Factory producing the configured transport kind
#[derive(Debug, Clone)]
pub struct DefaultTransportFactory {
    kind: TransportKind,
    request_timeout: Duration,
}

impl DefaultTransportFactory {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn open(&self, host: &str, port: u16) -> Arc<dyn Transport> {
        match self.kind {
            TransportKind::Socket => Arc::new(
                SocketTransport::new(format!("{}:{}", host, port))
                    .with_request_timeout(self.request_timeout),
            ),
            TransportKind::Http => Arc::new(
                HttpTransport::new(format!("http://{}:{}/rpc", host, port))
                    .with_request_timeout(self.request_timeout),
            ),
        }
    }
}

pub(crate) fn event_channel() -> broadcast::Sender<TransportEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
    tx
}
