#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use alert_api::config::Config;
use alert_api::db::{MemoryClaimStore, MemoryLocationIndex};
use alert_api::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// App state over in-memory backends, with handles to inspect them.
pub struct TestContext {
    pub state: AppState,
    pub locations: Arc<MemoryLocationIndex>,
    pub claims: Arc<MemoryClaimStore>,
}

pub fn test_state(config: Config) -> TestContext {
    let locations = Arc::new(MemoryLocationIndex::new());
    let claims = Arc::new(MemoryClaimStore::new());
    let state = AppState::new(locations.clone(), claims.clone(), config);
    TestContext {
        state,
        locations,
        claims,
    }
}

/// Start an actual TCP server for WebSocket testing. The server runs in the background.
pub async fn start_ws_server(config: Config) -> (SocketAddr, TestContext) {
    let ctx = test_state(config);
    let app = alert_api::routes::router().with_state(ctx.state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, ctx)
}

/// Connect to the alert socket and consume the `connected` greeting.
/// Returns the stream and the server-assigned connection ID.
pub async fn connect(addr: SocketAddr) -> (WsClient, String) {
    let url = format!("ws://{addr}/ws/alerts");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    let greeting = recv_json(&mut ws).await;
    assert_eq!(greeting["status"], "connected");
    let connection_id = greeting["connection_id"]
        .as_str()
        .expect("connection_id present")
        .to_string();
    assert!(connection_id.starts_with("conn_"));
    (ws, connection_id)
}

pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Read the next text frame as JSON, failing after 5 seconds.
pub async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for message")
        .expect("stream ended")
        .expect("ws read error");
    let text = msg.into_text().expect("not text");
    serde_json::from_str(&text).expect("parse json")
}

/// Assert nothing arrives on `ws` within `wait`.
pub async fn assert_silent(ws: &mut WsClient, wait: Duration) {
    if let Ok(Some(msg)) = time::timeout(wait, ws.next()).await {
        panic!("expected no message, got {msg:?}");
    }
}

/// Connect a device and report its location.
pub async fn connect_device(addr: SocketAddr, lat: f64, lon: f64) -> (WsClient, String) {
    let (mut ws, id) = connect(addr).await;
    send_json(&mut ws, serde_json::json!({ "latitude": lat, "longitude": lon })).await;
    let ack = recv_json(&mut ws).await;
    assert_eq!(ack, serde_json::json!({ "status": "location stored" }));
    (ws, id)
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

/// Router over fresh in-memory backends, for `axum_test::TestServer`.
pub fn test_app(config: Config) -> (axum::Router, TestContext) {
    let ctx = test_state(config);
    let app = alert_api::routes::router().with_state(ctx.state.clone());
    (app, ctx)
}
