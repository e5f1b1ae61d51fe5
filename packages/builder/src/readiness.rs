// ABOUTME: Readiness probing for a freshly started bridge
// ABOUTME: Polls the initialize handshake and aborts as soon as a crash signal arrives

use crate::error::{BuildError, Result};
use bridgekit_client::BridgeClient;
use bridgekit_core::{poll, Clock};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Poll until the server answers `initialize` with the bridge identity
pub async fn wait_for_handshake<C: Clock + ?Sized>(
    clock: &C,
    client: &BridgeClient,
    interval: Duration,
    deadline: Duration,
) -> bool {
    poll(clock, interval, deadline, move || async move {
        match client.initialize().await {
            Ok(result) if result.is_bridge_server() => true,
            Ok(result) => {
                debug!(
                    "Port {} answered as {}, not a bridge server",
                    client.port(),
                    result.server_info.name
                );
                false
            }
            Err(e) => {
                debug!("Handshake on port {} not ready: {}", client.port(), e);
                false
            }
        }
    })
    .await
}

/// Race a readiness poll against a crash signal
pub async fn ready_or_crash<R, C>(ready: R, crashed: C, deadline: Duration) -> Result<()>
where
    R: Future<Output = bool>,
    C: Future<Output = String>,
{
    tokio::select! {
        ready = ready => {
            if ready {
                Ok(())
            } else {
                Err(BuildError::Timeout { seconds: deadline.as_secs() })
            }
        }
        reason = crashed => Err(BuildError::Crashed(reason)),
    }
}
