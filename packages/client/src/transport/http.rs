// ABOUTME: JSON-RPC over HTTP POST for bridges exposing the HTTP endpoint
// ABOUTME: Each request is one POST; connectivity is tracked from the outcome of the last call

use super::{event_channel, Transport, TransportEvent, CONNECT_ATTEMPTS, CONNECT_BACKOFF};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use bridgekit_protocol::{methods, Request, Response};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Timeout for the ping issued by `connect`
const CONNECT_PING_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    request_timeout: Duration,
    connected: AtomicBool,
    next_id: AtomicU64,
    events: broadcast::Sender<TransportEvent>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            request_timeout: super::DEFAULT_REQUEST_TIMEOUT,
            connected: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            events: event_channel(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn mark_disconnected(&self, reason: &str) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Bridge HTTP endpoint unreachable: {}", reason);
            let _ = self.events.send(TransportEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
    }

    async fn post(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let request = Request::new(id, method, params);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .timeout(timeout)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                self.mark_disconnected(&format!("{} timed out", method));
                return Err(ClientError::Timeout {
                    method: method.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
            Err(e) => {
                self.mark_disconnected(&e.to_string());
                return Err(ClientError::Http(e));
            }
        };

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            self.mark_disconnected(&e.to_string());
            ClientError::Http(e)
        })?;

        let envelope: Response = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                let message = format!("Invalid response from {} (HTTP {}): {}", self.url, status, e);
                warn!("{}", message);
                let _ = self.events.send(TransportEvent::ProtocolError {
                    message: message.clone(),
                });
                return Err(ClientError::Protocol(message));
            }
        };

        if envelope.numeric_id() != Some(id) {
            debug!("HTTP response id {:?} does not match request {}", envelope.id, id);
        }

        envelope.into_result().map_err(ClientError::from)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let mut last_error = String::new();
        for attempt in 1..=CONNECT_ATTEMPTS {
            match self.post(methods::PING, Value::Null, CONNECT_PING_TIMEOUT).await {
                Ok(_) => {
                    self.connected.store(true, Ordering::SeqCst);
                    let _ = self.events.send(TransportEvent::Connected);
                    debug!("Connected to bridge at {} (attempt {})", self.url, attempt);
                    return Ok(());
                }
                Err(e) => {
                    debug!("Ping attempt {} to {} failed: {}", attempt, self.url, e);
                    last_error = e.to_string();
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(CONNECT_BACKOFF).await;
                    }
                }
            }
        }

        Err(ClientError::ConnectFailed {
            addr: self.url.clone(),
            attempts: CONNECT_ATTEMPTS,
            message: last_error,
        })
    }

    async fn request(&self, method: &str, params: Value, timeout: Option<Duration>) -> Result<Value> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.post(method, params, timeout.unwrap_or(self.request_timeout))
            .await
    }

    async fn disconnect(&self) {
        self.mark_disconnected("closed by client");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
