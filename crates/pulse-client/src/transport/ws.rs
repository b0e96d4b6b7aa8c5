//! WebSocket transport speaking the JSON frame protocol.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use pulse_core::events::{ClientEvent, ServerEvent};
use pulse_core::types::UserId;
use pulse_core::{AppError, AppResult};

use super::{SignalTransport, TransportSink};

/// Connects to the dispatcher's `/ws` endpoint.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    /// Creates a transport for a user against a base URL such as
    /// `ws://chat.example.com:8420`.
    pub fn new(base_url: &str, user_id: UserId) -> Self {
        Self {
            url: format!("{}/ws?user_id={}", base_url.trim_end_matches('/'), user_id),
        }
    }
}

#[async_trait]
impl SignalTransport for WsTransport {
    async fn connect(&self) -> AppResult<(Box<dyn TransportSink>, mpsc::Receiver<ServerEvent>)> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| AppError::transport(format!("WebSocket connect failed: {e}")))?;
        debug!(url = %self.url, "WebSocket connected");

        let (sink, mut read) = stream.split();
        let (frames_tx, frames_rx) = mpsc::channel(64);

        // Reader task: parse inbound text frames until the socket dies;
        // dropping `frames_tx` ends the queue and signals the supervisor.
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str(text.as_str()) {
                        Ok(event) => {
                            if frames_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Dropping unparseable frame");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        });

        Ok((Box::new(WsSink { sink }), frames_rx))
    }
}

/// Send half of one live WebSocket connection.
struct WsSink {
    sink: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, event: ClientEvent) -> AppResult<()> {
        let frame = serde_json::to_string(&event)?;
        self.sink
            .send(Message::text(frame))
            .await
            .map_err(|e| AppError::transport(format!("WebSocket send failed: {e}")))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}
