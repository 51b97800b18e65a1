//! WebSocket transport for live subscribers.

use super::Broadcaster;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

pub const WS_PATH: &str = "/ws/logs";

pub fn router(broadcaster: Arc<Broadcaster>) -> Router {
    Router::new()
        .route(WS_PATH, get(ws_handler))
        .with_state(broadcaster)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(broadcaster): State<Arc<Broadcaster>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Pump records out and answer `ping` until either side goes away.
async fn handle_socket(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let mut subscription = broadcaster.connect();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            outgoing = subscription.recv() => {
                let Some(payload) = outgoing else {
                    debug!("Subscriber {} was dropped by the broadcaster", subscription.id());
                    break;
                };
                if ws_tx.send(Message::Text(payload.as_ref().into())).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) if text.as_str() == "ping" => {
                    if ws_tx.send(Message::Text("pong".into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error for subscriber {}: {}", subscription.id(), e);
                    break;
                }
            }
        }
    }

    broadcaster.disconnect(subscription.id());
}
