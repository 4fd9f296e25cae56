//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time;

use crate::engine::dispatch::AlertDelivery;
use crate::engine::ConnectionContext;
use crate::error::AlertError;
use crate::AppState;

use super::events::ServerMessage;
use super::handler::handle_text;

/// Close code sent when a session stays silent past the idle timeout.
const CLOSE_IDLE_TIMEOUT: u16 = 4009;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/alerts", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let ctx = ConnectionContext::new();
    let (mut ws_tx, ws_rx) = socket.split();
    let deliveries = state.sessions.register(&ctx.connection_id);

    tracing::info!(connection_id = %ctx.connection_id, "device session established");

    if send_json(&mut ws_tx, &ServerMessage::connected(&ctx.connection_id))
        .await
        .is_ok()
    {
        run_session(&state, &ctx, ws_tx, ws_rx, deliveries).await;
    }

    // The delivery receiver is gone by now, so broadcasts racing this
    // cleanup fail as `Closed` instead of counting as delivered.
    if let Err(err) = state.engine.disconnect(&ctx).await {
        tracing::error!(connection_id = %ctx.connection_id, %err, "failed to drop device location");
    }
    state.sessions.unregister(&ctx.connection_id);

    tracing::info!(connection_id = %ctx.connection_id, "device session ended");
}

/// Main session loop: answer inbound frames, forward routed alerts, enforce idleness.
async fn run_session(
    state: &AppState,
    ctx: &ConnectionContext,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut deliveries: mpsc::Receiver<Arc<AlertDelivery>>,
) {
    let idle_timeout = state.config.idle_timeout;
    let idle_deadline = time::sleep(idle_timeout);
    tokio::pin!(idle_deadline);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        idle_deadline.as_mut().reset(time::Instant::now() + idle_timeout);
                        let reply = handle_text(&state.engine, ctx, text.as_str()).await;
                        if send_json(&mut ws_tx, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        idle_deadline.as_mut().reset(time::Instant::now() + idle_timeout);
                        let reply = ServerMessage::error(&AlertError::invalid_format());
                        if send_json(&mut ws_tx, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        idle_deadline.as_mut().reset(time::Instant::now() + idle_timeout);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %ctx.connection_id, "ws read error");
                        break;
                    }
                }
            }

            delivery = deliveries.recv() => {
                match delivery {
                    Some(delivery) => {
                        if send_json(&mut ws_tx, delivery.as_ref()).await.is_err() {
                            break;
                        }
                    }
                    // Route replaced or router dropped.
                    None => break,
                }
            }

            // Outbound deliveries do not count as activity.
            () = &mut idle_deadline => {
                tracing::debug!(connection_id = %ctx.connection_id, "idle timeout, closing session");
                let _ = send_close(&mut ws_tx, CLOSE_IDLE_TIMEOUT, "Idle timeout").await;
                break;
            }
        }
    }
}

async fn send_json<T: Serialize>(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
