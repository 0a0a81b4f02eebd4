//! # Display Hub Server
//!
//! WebSocket server on the terminal that customer displays connect to.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Display Hub Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      DisplayHub (Axum)                          │   │
//! │  │                                                                 │   │
//! │  │  /ws endpoint ──▶ WebSocket upgrade                            │   │
//! │  │                        │                                        │   │
//! │  │                        ▼                                        │   │
//! │  │              ┌─────────────────┐                                │   │
//! │  │              │ DisplayConnection│ ◀──── one per display          │   │
//! │  │              └────────┬────────┘                                │   │
//! │  │                       │  publisher.subscribe()                  │   │
//! │  │         ┌─────────────┼─────────────┐                          │   │
//! │  │         ▼             ▼             ▼                          │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐                      │   │
//! │  │   │ Facing   │  │ Pole     │  │ Tablet   │   Customer displays  │   │
//! │  │   │ screen   │  │ display  │  │          │                      │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Connection Flow:                                                       │
//! │  1. Display connects and sends hello { displayId, storeId }            │
//! │  2. Hub rejects a foreign store with error STORE_MISMATCH              │
//! │  3. Hub replies welcome, then replays the latest event                 │
//! │  4. Hub forwards every published event; lagging displays skip ahead    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::error::{DisplayError, DisplayResult};
use crate::protocol::{ControlMessage, DisplayEnvelope, HelloPayload, WelcomePayload, PROTOCOL_VERSION};
use crate::publisher::DisplayPublisher;

// =============================================================================
// Constants
// =============================================================================

/// Default port for the display hub.
pub const DEFAULT_HUB_PORT: u16 = 8766;

const PING_INTERVAL: Duration = Duration::from_secs(30);

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Displays only send handshakes and keepalives.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

// =============================================================================
// Hub Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub port: u16,
    pub bind_addr: String,
    /// Terminal id sent in `welcome`.
    pub terminal_id: String,
    /// Displays announcing another store are rejected.
    pub store_id: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            port: DEFAULT_HUB_PORT,
            bind_addr: "0.0.0.0".to_string(),
            terminal_id: "terminal".to_string(),
            store_id: "default-store".to_string(),
        }
    }
}

impl HubConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Connected Displays
// =============================================================================

#[derive(Debug, Clone)]
pub struct ConnectedDisplay {
    pub display_id: String,
    pub addr: SocketAddr,
    pub connected_at: std::time::Instant,
}

struct HubState {
    config: HubConfig,
    publisher: DisplayPublisher,
    displays: RwLock<HashMap<String, ConnectedDisplay>>,
}

// =============================================================================
// Hub Server
// =============================================================================

/// Serves the publisher's event stream to customer displays.
pub struct DisplayHub {
    state: Arc<HubState>,
}

/// Handle for a running hub.
#[derive(Clone)]
pub struct HubHandle {
    state: Arc<HubState>,
    local_addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
}

impl HubHandle {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` URL displays should connect to.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.local_addr)
    }

    pub async fn display_count(&self) -> usize {
        self.state.displays.read().await.len()
    }

    pub async fn display_ids(&self) -> Vec<String> {
        self.state.displays.read().await.keys().cloned().collect()
    }

    pub async fn shutdown(&self) -> DisplayResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| DisplayError::ChannelError("Hub shutdown channel closed".into()))
    }
}

impl DisplayHub {
    pub fn new(config: HubConfig, publisher: DisplayPublisher) -> Self {
        DisplayHub {
            state: Arc::new(HubState {
                config,
                publisher,
                displays: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Binds the listener and serves in the background.
    pub async fn start(self) -> DisplayResult<HubHandle> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(self.state.clone());

        let bind_addr = self.state.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| DisplayError::BindFailed {
                addr: bind_addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| DisplayError::BindFailed {
            addr: bind_addr.clone(),
            reason: e.to_string(),
        })?;

        info!(addr = %local_addr, store_id = %self.state.config.store_id, "Display hub started");

        tokio::spawn(async move {
            let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await;
                    info!("Display hub shutting down");
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "Display hub stopped with error");
            }
        });

        Ok(HubHandle {
            state: self.state,
            local_addr,
            shutdown_tx,
        })
    }
}

// =============================================================================
// WebSocket Handler
// =============================================================================

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<HubState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    debug!(addr = %addr, "Display connecting");
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn handle_socket(socket: WebSocket, state: Arc<HubState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    let hello = match receive_hello(&mut receiver).await {
        Ok(hello) => hello,
        Err(e) => {
            warn!(addr = %addr, error = %e, "No valid hello, closing display connection");
            return;
        }
    };

    if let Some(rejection) = check_hello(&hello, &state.config) {
        warn!(
            display_id = %hello.display_id,
            display_store = %hello.store_id,
            our_store = %state.config.store_id,
            "Rejecting display"
        );
        let _ = send_control(&mut sender, &rejection).await;
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    let display_id = hello.display_id.clone();
    // Subscribe before replaying so nothing published in between is lost.
    let mut events = state.publisher.subscribe();

    let welcome = ControlMessage::Welcome(WelcomePayload {
        terminal_id: state.config.terminal_id.clone(),
        store_id: state.config.store_id.clone(),
        server_time: chrono::Utc::now().to_rfc3339(),
    });
    if let Err(e) = send_control(&mut sender, &welcome).await {
        warn!(display_id = %display_id, error = %e, "Failed to send welcome");
        return;
    }

    let replay_seq = match state.publisher.latest() {
        Some(latest) => {
            if let Err(e) = send_event(&mut sender, &latest).await {
                warn!(display_id = %display_id, error = %e, "Failed to replay latest event");
                return;
            }
            latest.seq
        }
        None => 0,
    };

    state.displays.write().await.insert(
        display_id.clone(),
        ConnectedDisplay {
            display_id: display_id.clone(),
            addr,
            connected_at: std::time::Instant::now(),
        },
    );
    info!(display_id = %display_id, addr = %addr, replay_seq, "Display connected");

    let mut ping = interval(PING_INTERVAL);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(envelope) => {
                    if envelope.seq <= replay_seq {
                        continue;
                    }
                    if send_event(&mut sender, &envelope).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Snapshots make the skipped events redundant.
                    warn!(display_id = %display_id, skipped, "Display lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(display_id = %display_id, "Display disconnected");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(display_id = %display_id, error = %e, "Display socket error");
                    break;
                }
            },

            _ = ping.tick() => {
                if sender.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    if state.displays.write().await.remove(&display_id).is_some() {
        debug!(display_id = %display_id, "Display removed");
    }
}

/// Returns the rejection to send, if the display may not connect.
fn check_hello(hello: &HelloPayload, config: &HubConfig) -> Option<ControlMessage> {
    if hello.store_id != config.store_id {
        return Some(ControlMessage::Error {
            code: ControlMessage::STORE_MISMATCH.to_string(),
            message: "Store ID does not match".to_string(),
        });
    }
    if hello.protocol_version != PROTOCOL_VERSION {
        return Some(ControlMessage::Error {
            code: ControlMessage::UNSUPPORTED_VERSION.to_string(),
            message: format!(
                "Protocol version {} not supported (expected {})",
                hello.protocol_version, PROTOCOL_VERSION
            ),
        });
    }
    None
}

async fn receive_hello(receiver: &mut SplitStream<WebSocket>) -> DisplayResult<HelloPayload> {
    match tokio::time::timeout(HELLO_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(msg))) => {
            let text = match msg {
                Message::Text(t) => t.to_string(),
                Message::Binary(b) => String::from_utf8_lossy(&b).to_string(),
                _ => return Err(DisplayError::InvalidMessage("Expected text message".into())),
            };
            match serde_json::from_str::<ControlMessage>(&text)
                .map_err(|e| DisplayError::InvalidMessage(format!("Invalid hello: {e}")))?
            {
                ControlMessage::Hello(payload) => Ok(payload),
                _ => Err(DisplayError::InvalidMessage("Expected hello".into())),
            }
        }
        Ok(Some(Err(e))) => Err(DisplayError::WebSocketError(e.to_string())),
        Ok(None) => Err(DisplayError::Disconnected),
        Err(_) => Err(DisplayError::Timeout(HELLO_TIMEOUT.as_secs())),
    }
}

async fn send_control(sender: &mut SplitSink<WebSocket, Message>, msg: &ControlMessage) -> DisplayResult<()> {
    let json = msg.to_json()?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| DisplayError::WebSocketError(e.to_string()))
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, envelope: &DisplayEnvelope) -> DisplayResult<()> {
    let json = envelope.to_json()?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| DisplayError::WebSocketError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Frame;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn local_config(store_id: &str) -> HubConfig {
        HubConfig {
            port: 0,
            bind_addr: "127.0.0.1".to_string(),
            terminal_id: "t-1".to_string(),
            store_id: store_id.to_string(),
        }
    }

    async fn next_frame<S>(stream: &mut S) -> Frame
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Frame::parse(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[test]
    fn test_hub_config_bind_address() {
        let config = local_config("s-1");
        assert_eq!(config.bind_address(), "127.0.0.1:0");
        assert_eq!(HubConfig::default().port, DEFAULT_HUB_PORT);
    }

    #[test]
    fn test_check_hello() {
        let config = local_config("s-1");
        assert!(check_hello(&HelloPayload::new("d-1", "s-1"), &config).is_none());
        assert!(matches!(
            check_hello(&HelloPayload::new("d-1", "s-2"), &config),
            Some(ControlMessage::Error { code, .. }) if code == ControlMessage::STORE_MISMATCH
        ));
    }

    #[tokio::test]
    async fn test_late_display_gets_latest_event_then_live_events() {
        let publisher = DisplayPublisher::with_source("t-1");
        publisher.cart_cleared();

        let hub = DisplayHub::new(local_config("s-1"), publisher.clone()).start().await.unwrap();
        let (mut ws, _) = connect_async(hub.ws_url()).await.unwrap();
        ws.send(WsMessage::Text(
            ControlMessage::Hello(HelloPayload::new("d-1", "s-1")).to_json().unwrap().into(),
        ))
        .await
        .unwrap();

        assert!(matches!(next_frame(&mut ws).await, Frame::Control(ControlMessage::Welcome(_))));
        match next_frame(&mut ws).await {
            Frame::Event(env) => assert_eq!((env.kind.as_str(), env.seq), ("cart_cleared", 1)),
            other => panic!("expected replay, got {other:?}"),
        }

        // Wait until the hub has registered the display before publishing.
        while hub.display_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        publisher.cart_cleared();
        match next_frame(&mut ws).await {
            Frame::Event(env) => assert_eq!(env.seq, 2),
            other => panic!("expected live event, got {other:?}"),
        }

        hub.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_store_rejected() {
        let hub = DisplayHub::new(local_config("s-1"), DisplayPublisher::new()).start().await.unwrap();
        let (mut ws, _) = connect_async(hub.ws_url()).await.unwrap();
        ws.send(WsMessage::Text(
            ControlMessage::Hello(HelloPayload::new("d-1", "s-other")).to_json().unwrap().into(),
        ))
        .await
        .unwrap();

        match next_frame(&mut ws).await {
            Frame::Control(ControlMessage::Error { code, .. }) => assert_eq!(code, ControlMessage::STORE_MISMATCH),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(hub.display_count().await, 0);
    }
}
