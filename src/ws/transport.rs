#![expect(
    clippy::module_name_repetitions,
    reason = "Transport types expose their domain in the name for clarity"
)]

//! Capability seam over the underlying socket.
//!
//! The channel client never touches `tokio-tungstenite` directly; it drives a
//! boxed [`TransportConnection`] obtained from a [`Transport`]. Production
//! code uses [`WebSocketTransport`]; tests substitute a scripted fake to get
//! deterministic connections and closures.

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::Result;
use crate::ws::error::WsError;

/// Normal closure (RFC 6455): explicit, intentional shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Going away: the endpoint is leaving (tab closed, server shutting down).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Synthetic code for a connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// True for close codes that represent an intentional shutdown.
///
/// Everything else is an abnormal closure and eligible for reconnection.
#[must_use]
pub const fn is_clean_close(code: u16) -> bool {
    matches!(code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
}

/// Close code and reason attached to a transport closure.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    #[must_use]
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Events surfaced by an open transport connection.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Text frame from the peer
    Message(String),
    /// The connection closed; carries the peer's close frame when one was seen
    Closed(Option<CloseReason>),
}

/// Factory for transport connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `url`, completing the upgrade handshake.
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportConnection>>;
}

/// A single live connection.
#[async_trait]
pub trait TransportConnection: Send {
    /// Next inbound event. `None` means the stream ended without any frame;
    /// callers treat that the same as an abnormal closure.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Send a text frame to the peer.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the connection with the given code and reason.
    async fn close(&mut self, close: CloseReason) -> Result<()>;
}

/// Production transport backed by `tokio-tungstenite`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportConnection>> {
        let (stream, _) = connect_async(url).await.map_err(WsError::Connection)?;
        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: WsStream,
}

#[async_trait]
impl TransportConnection for TungsteniteConnection {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(TransportEvent::Message(text.to_string()));
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| CloseReason::new(u16::from(f.code), f.reason.to_string()));
                    return Some(TransportEvent::Closed(reason));
                }
                Ok(_) => {
                    // Binary frames and ping/pong are not part of the channel protocol.
                }
                Err(e) => {
                    // The closure below, not the error itself, drives the state machine.
                    tracing::warn!(error = %e, "WebSocket read failed");
                    return Some(TransportEvent::Closed(None));
                }
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(Into::into)
    }

    async fn close(&mut self, close: CloseReason) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(close.code),
            reason: close.reason.into(),
        };
        self.stream.close(Some(frame)).await.map_err(Into::into)
    }
}
