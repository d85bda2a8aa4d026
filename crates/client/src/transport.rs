//! Transport seam for the chat session
//!
//! The session driver talks to the server through the [`Transport`] trait so
//! the reconnect logic can be exercised against an in-memory channel pair in
//! tests. Production uses [`WsConnector`] over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shoptalk_shared::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::{ChatClientError, ChatClientResult};

/// A live, framed connection carrying chat events.
#[async_trait]
pub trait Transport: Send {
    /// Send one client event. An error means the connection is dead.
    async fn send(&mut self, event: &ClientEvent) -> ChatClientResult<()>;

    /// Receive the next server event. `None` means the peer closed cleanly.
    async fn recv(&mut self) -> Option<ChatClientResult<ServerEvent>>;

    /// Close the connection. Best effort.
    async fn close(&mut self);
}

/// Factory producing fresh transports, one per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> ChatClientResult<Box<dyn Transport>>;
}

/// WebSocket connector for a fixed endpoint URL
/// (e.g. `ws://host:4000/ws/customer` or the operator URL with its token).
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> ChatClientResult<Box<dyn Transport>> {
        let (stream, _response) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(handshake_error)?;
        Ok(Box::new(WsTransport { stream }))
    }
}

/// A pre-upgrade rejection of the credentials is not a transport fault;
/// reconnecting with the same token would only be refused again.
fn handshake_error(err: tokio_tungstenite::tungstenite::Error) -> ChatClientError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Http(ref response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            ChatClientError::NotAuthorized
        }
        other => ChatClientError::Transport(other.to_string()),
    }
}

struct WsTransport {
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, event: &ClientEvent) -> ChatClientResult<()> {
        let json = serde_json::to_string(event)
            .map_err(|e| ChatClientError::Protocol(e.to_string()))?;
        self.stream
            .send(WsMessage::Text(json))
            .await
            .map_err(|e| ChatClientError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ChatClientResult<ServerEvent>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => {
                    return Some(
                        serde_json::from_str(&text)
                            .map_err(|e| ChatClientError::Protocol(e.to_string())),
                    );
                }
                Ok(WsMessage::Close(_)) => return None,
                // Pings are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(ChatClientError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// In-memory transport backed by channels. The returned [`ChannelPeer`] plays
/// the server: it observes sent client events and injects server events.
/// Dropping the peer's sender half reads as a clean close.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<ClientEvent>,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Server half of a [`ChannelTransport`] pair.
pub struct ChannelPeer {
    pub from_client: mpsc::UnboundedReceiver<ClientEvent>,
    pub to_client: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelTransport {
    pub fn pair() -> (ChannelTransport, ChannelPeer) {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        (
            ChannelTransport {
                tx: client_tx,
                rx: server_rx,
            },
            ChannelPeer {
                from_client: client_rx,
                to_client: server_tx,
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, event: &ClientEvent) -> ChatClientResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| ChatClientError::Transport("peer gone".into()))
    }

    async fn recv(&mut self) -> Option<ChatClientResult<ServerEvent>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}
