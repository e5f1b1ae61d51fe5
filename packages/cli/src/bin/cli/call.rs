// ABOUTME: `bridgekit call` sends a single JSON-RPC request to a running bridge
// ABOUTME: Prints the raw result as pretty JSON

use anyhow::{Context, Result};
use bridgekit_client::{BridgeClient, DefaultTransportFactory, TransportFactory};
use bridgekit_config::BridgeSettings;
use serde_json::Value;

pub async fn run(host: Option<String>, port: u16, method: &str, params: &str) -> Result<()> {
    let settings = BridgeSettings::from_env()?;
    let params: Value = serde_json::from_str(params).context("Params must be a JSON object")?;
    if !params.is_object() {
        anyhow::bail!("Params must be a JSON object");
    }

    let host = host.unwrap_or(settings.host);
    let transport = DefaultTransportFactory::new(settings.transport).open(&host, port);
    let client = BridgeClient::new(transport, port);
    client.connect().await?;

    let result = client.call_raw(method, params, None).await;
    client.disconnect().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}
