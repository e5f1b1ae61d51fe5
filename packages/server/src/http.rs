// ABOUTME: HTTP front end: one JSON-RPC envelope per POST to / or /rpc
// ABOUTME: Notifications are acknowledged with 204 and no body

use crate::dispatch::Dispatcher;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::post;
use axum::{Json, Router};
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", post(rpc))
        .route("/rpc", post(rpc))
        .with_state(dispatcher)
}

async fn rpc(State(dispatcher): State<Arc<Dispatcher>>, body: String) -> HttpResponse {
    match dispatcher.handle_line(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> io::Result<()> {
    info!("HTTP transport listening on {}", listener.local_addr()?);
    axum::serve(listener, router(dispatcher)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogBuffer;
    use crate::paths::PathJail;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use bridgekit_protocol::Response;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(root: &TempDir) -> Router {
        let jail = PathJail::new(root.path(), root.path().join("skills"));
        router(Arc::new(Dispatcher::new(jail, LogBuffer::new(8))))
    }

    async fn post_body(app: Router, uri: &str, body: String) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                HttpRequest::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_rpc_endpoint_answers_ping() {
        let root = TempDir::new().unwrap();
        let body = json!({"jsonrpc": "2.0", "id": 4, "method": "ping"}).to_string();

        let (status, bytes) = post_body(app(&root), "/rpc", body).await;

        assert_eq!(status, StatusCode::OK);
        let response: Response = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(response.numeric_id(), Some(4));
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_root_path_is_an_alias() {
        let root = TempDir::new().unwrap();
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "bridge/health"}).to_string();

        let (status, bytes) = post_body(app(&root), "/", body).await;

        assert_eq!(status, StatusCode::OK);
        let response: Response = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(response.result.unwrap()["metadata"]["status"], json!("ok"));
    }

    #[tokio::test]
    async fn test_notification_gets_no_content() {
        let root = TempDir::new().unwrap();
        let body = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();

        let (status, bytes) = post_body(app(&root), "/rpc", body).await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(bytes.is_empty());
    }
}
