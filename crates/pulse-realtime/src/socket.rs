//! WebSocket endpoint for the persistent per-user event channel.
//!
//! Authentication of the upgrade request is the API gateway's concern;
//! this endpoint trusts the `user_id` it is handed.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use pulse_core::types::UserId;

use crate::connection::heartbeat::run_heartbeat;
use crate::server::RealtimeEngine;

/// Parameters accepted on the `/ws` upgrade request.
#[derive(Debug, Deserialize)]
struct ConnectParams {
    /// The authenticated user opening the channel.
    user_id: UserId,
}

/// Builds the realtime router.
pub fn router(engine: Arc<RealtimeEngine>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ws_handler(
    State(engine): State<Arc<RealtimeEngine>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(engine, socket, params.user_id))
}

/// Pumps one WebSocket connection until it dies, then unregisters it.
async fn handle_socket(engine: Arc<RealtimeEngine>, socket: WebSocket, user_id: UserId) {
    let (handle, mut outbound_rx) = engine.connections.register(user_id).await;
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    error!(error = %e, "Failed to serialize outbound event");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut heartbeat = tokio::spawn(run_heartbeat(handle.clone(), engine.config.clone()));

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    engine.connections.handle_inbound(&handle.id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %handle.id, error = %e, "Socket read error");
                    break;
                }
            },
            // Heartbeat exit means the connection missed its pong deadline.
            _ = &mut heartbeat => break,
            // Writer exit means the sink is gone.
            _ = &mut writer => break,
        }
    }

    engine.connections.unregister(&handle.id).await;
    writer.abort();
    heartbeat.abort();
    debug!(conn_id = %handle.id, user_id = %user_id, "Socket task ended");
}
