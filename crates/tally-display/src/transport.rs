//! # Display Transport
//!
//! WebSocket client that keeps a customer display attached to its hub.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Display Connection States                            │
//! │                                                                         │
//! │  ┌────────────┐    connect()    ┌────────────┐  hello ► welcome        │
//! │  │Disconnected│ ──────────────► │ Connecting │ ─────────────┐          │
//! │  └────────────┘                 └─────┬──────┘              ▼          │
//! │        ▲                              │ failure      ┌────────────┐    │
//! │        │                              ▼              │ Connected  │    │
//! │        │                        ┌────────────┐       └─────┬──────┘    │
//! │        │                        │  Backoff   │ ◄───────────┘           │
//! │        │                        └─────┬──────┘   disconnect/error      │
//! │        │     rejected by hub          │ timer expired                  │
//! │        └──────────────────────────────┘ (reconnect)                    │
//! │                                                                         │
//! │  BACKOFF: exponential, 500ms → 1s → 2s ... capped at max_backoff       │
//! │  A STORE_MISMATCH rejection stops the transport; retrying cannot help. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events are forwarded as received. Ordering and de-duplication (the hub
//! replays its latest event on every reconnect) are the subscriber's job.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::{DisplayError, DisplayResult};
use crate::protocol::{ControlMessage, DisplayEnvelope, Frame, HelloPayload};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Transport State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
    /// The hub refused this display; the transport has stopped.
    Rejected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff => write!(f, "backoff"),
            ConnectionState::Rejected => write!(f, "rejected"),
        }
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Hub URL, e.g. `ws://192.168.1.20:8766/ws`.
    pub url: String,
    pub connect_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_retries: 0,
        }
    }
}

// =============================================================================
// Transport Handle
// =============================================================================

#[derive(Clone)]
pub struct TransportHandle {
    state: Arc<RwLock<ConnectionState>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl TransportHandle {
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    pub async fn shutdown(&self) -> DisplayResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| DisplayError::ChannelError("Failed to send shutdown signal".into()))
    }
}

// =============================================================================
// Display Transport
// =============================================================================

/// Reconnecting hub client.
///
/// ## Usage
/// ```rust,ignore
/// let (handle, events) = DisplayTransport::spawn(config, HelloPayload::new("pole-1", "store-1"));
/// let (subscriber, view) = DisplaySubscriber::new(Duration::from_secs(5));
/// tokio::spawn(subscriber.run(events));
/// ```
pub struct DisplayTransport {
    config: TransportConfig,
    hello: HelloPayload,
    state: Arc<RwLock<ConnectionState>>,
    events_tx: mpsc::Sender<DisplayEnvelope>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl DisplayTransport {
    /// Spawns the connection task. Returns a handle and the event stream.
    pub fn spawn(config: TransportConfig, hello: HelloPayload) -> (TransportHandle, mpsc::Receiver<DisplayEnvelope>) {
        let (events_tx, events_rx) = mpsc::channel::<DisplayEnvelope>(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let transport = DisplayTransport {
            config,
            hello,
            state: state.clone(),
            events_tx,
            shutdown_rx,
        };
        tokio::spawn(transport.run());

        (TransportHandle { state, shutdown_tx }, events_rx)
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    async fn run(mut self) {
        info!(url = %self.config.url, display_id = %self.hello.display_id, "Display transport starting");

        let mut backoff = self.create_backoff();
        let mut retry_count = 0u32;
        let mut final_state = ConnectionState::Disconnected;

        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                break;
            }

            self.set_state(ConnectionState::Connecting).await;
            match self.connect_with_timeout().await {
                Ok(ws) => {
                    match self.session(ws, &mut backoff, &mut retry_count).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Closed) => info!("Hub closed the connection"),
                        Err(e) if !e.is_retryable() => {
                            error!(error = %e, "Display transport stopping");
                            if matches!(e, DisplayError::Rejected { .. }) {
                                final_state = ConnectionState::Rejected;
                            }
                            break;
                        }
                        Err(e) => warn!(error = %e, "Display connection lost"),
                    }
                }
                Err(e) => warn!(error = %e, "Failed to connect to display hub"),
            }

            self.set_state(ConnectionState::Backoff).await;

            if self.config.max_retries > 0 {
                retry_count += 1;
                if retry_count >= self.config.max_retries {
                    error!(max_retries = self.config.max_retries, "Max reconnection attempts reached");
                    break;
                }
            }

            let Some(delay) = backoff.next_backoff() else {
                error!("Backoff exhausted");
                break;
            };
            debug!(?delay, attempt = retry_count, "Waiting before reconnect");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_rx.recv() => break,
            }
        }

        self.set_state(final_state).await;
        info!(state = %final_state, "Display transport stopped");
    }

    async fn connect_with_timeout(&self) -> DisplayResult<WsStream> {
        match timeout(self.config.connect_timeout, connect_async(&self.config.url)).await {
            Ok(Ok((ws, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(ws)
            }
            Ok(Err(e)) => Err(DisplayError::from(e)),
            Err(_) => Err(DisplayError::Timeout(self.config.connect_timeout.as_secs())),
        }
    }

    /// Handshakes and forwards events until the connection ends.
    async fn session(
        &mut self,
        ws: WsStream,
        backoff: &mut ExponentialBackoff,
        retry_count: &mut u32,
    ) -> DisplayResult<SessionEnd> {
        let (mut write, mut read) = ws.split();

        let hello = ControlMessage::Hello(self.hello.clone()).to_json()?;
        write.send(WsMessage::Text(hello.into())).await?;

        loop {
            tokio::select! {
                incoming = read.next() => {
                    let message = match incoming {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return Err(DisplayError::from(e)),
                        None => return Ok(SessionEnd::Closed),
                    };
                    match message {
                        WsMessage::Text(text) => match Frame::parse(&text) {
                            Ok(Frame::Control(ControlMessage::Welcome(welcome))) => {
                                info!(terminal_id = %welcome.terminal_id, "Display attached to terminal");
                                *self.state.write().await = ConnectionState::Connected;
                                backoff.reset();
                                *retry_count = 0;
                            }
                            Ok(Frame::Control(ControlMessage::Error { code, message })) => {
                                return Err(DisplayError::Rejected { code, message });
                            }
                            Ok(Frame::Control(ControlMessage::Hello(_))) => {
                                debug!("Ignoring hello from hub");
                            }
                            Ok(Frame::Event(envelope)) => {
                                debug!(kind = %envelope.kind, seq = envelope.seq, "Display event received");
                                if self.events_tx.send(envelope).await.is_err() {
                                    return Err(DisplayError::ChannelError("Event receiver dropped".into()));
                                }
                            }
                            Err(e) => warn!(error = %e, "Unreadable frame from hub"),
                        },
                        WsMessage::Ping(data) => write.send(WsMessage::Pong(data)).await?,
                        WsMessage::Close(frame) => {
                            debug!(?frame, "Received close frame");
                            return Ok(SessionEnd::Closed);
                        }
                        _ => {}
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

enum SessionEnd {
    Closed,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{DisplayHub, HubConfig};
    use crate::publisher::DisplayPublisher;

    fn hub_config(store_id: &str) -> HubConfig {
        HubConfig {
            port: 0,
            bind_addr: "127.0.0.1".to_string(),
            terminal_id: "t-1".to_string(),
            store_id: store_id.to_string(),
        }
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Rejected.to_string(), "rejected");
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 0);
    }

    #[tokio::test]
    async fn test_receives_replayed_event() {
        let publisher = DisplayPublisher::with_source("t-1");
        publisher.cart_cleared();
        let hub = DisplayHub::new(hub_config("s-1"), publisher).start().await.unwrap();

        let config = TransportConfig {
            url: hub.ws_url(),
            ..Default::default()
        };
        let (handle, mut events) = DisplayTransport::spawn(config, HelloPayload::new("d-1", "s-1"));

        let envelope = events.recv().await.unwrap();
        assert_eq!(envelope.kind, "cart_cleared");
        assert!(handle.is_connected().await);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejection_stops_transport() {
        let hub = DisplayHub::new(hub_config("s-1"), DisplayPublisher::new()).start().await.unwrap();
        let config = TransportConfig {
            url: hub.ws_url(),
            initial_backoff: Duration::from_millis(10),
            ..Default::default()
        };
        let (handle, mut events) = DisplayTransport::spawn(config, HelloPayload::new("d-1", "s-other"));

        // The event channel closes once the transport task ends.
        assert!(events.recv().await.is_none());
        assert_eq!(handle.state().await, ConnectionState::Rejected);
    }
}
