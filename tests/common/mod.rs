#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    dead_code,
    reason = "Not every test file uses every server helper"
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// Mock channel backend.
///
/// Accepts WebSocket upgrades, records the upgrade request URI and every
/// inbound frame, broadcasts outbound frames to all connected clients, and
/// can drop every live connection without a close handshake to simulate an
/// abrupt network failure.
pub struct MockChannelServer {
    addr: SocketAddr,
    /// Broadcast frames to ALL connected clients
    message_tx: broadcast::Sender<String>,
    /// Signals every live connection to drop abruptly
    kill_tx: broadcast::Sender<()>,
    /// Frames received from clients
    inbound_rx: mpsc::UnboundedReceiver<String>,
    /// Close frames received from clients, as (code, reason)
    close_rx: mpsc::UnboundedReceiver<(u16, String)>,
    /// Upgrade request URIs, one per accepted connection
    request_rx: mpsc::UnboundedReceiver<String>,
    /// Total number of accepted connections
    connections: Arc<AtomicU32>,
}

impl MockChannelServer {
    /// Start a mock server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<String>(100);
        let (kill_tx, _) = broadcast::channel::<()>(16);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicU32::new(0));

        let broadcast_tx = message_tx.clone();
        let kill = kill_tx.clone();
        let conn_count = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let req_tx = request_tx.clone();
                let callback =
                    move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        drop(req_tx.send(req.uri().to_string()));
                        Ok(resp)
                    };
                let Ok(ws_stream) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    continue;
                };

                conn_count.fetch_add(1, Ordering::SeqCst);

                let (mut write, mut read) = ws_stream.split();
                let inbound = inbound_tx.clone();
                let closes = close_tx.clone();
                let mut outbound = broadcast_tx.subscribe();
                let mut kill_rx = kill.subscribe();

                // One task per connection
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = kill_rx.recv() => {
                                // Drop without a close handshake
                                break;
                            }
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    drop(inbound.send(text.to_string()));
                                }
                                Some(Ok(Message::Close(frame))) => {
                                    let (code, reason) = frame.map_or(
                                        (1005, String::new()),
                                        |f| (u16::from(f.code), f.reason.to_string()),
                                    );
                                    drop(closes.send((code, reason)));
                                    break;
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            out = outbound.recv() => match out {
                                Ok(text) => {
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            addr,
            message_tx,
            kill_tx,
            inbound_rx,
            close_rx,
            request_rx,
            connections,
        }
    }

    /// Base WebSocket URL of this server.
    pub fn endpoint(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send a frame to all connected clients.
    pub fn send(&self, message: &str) {
        drop(self.message_tx.send(message.to_owned()));
    }

    /// Drop every live connection without a close handshake.
    pub fn kill_connections(&self) {
        drop(self.kill_tx.send(()));
    }

    /// Total number of connections accepted so far.
    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Receive the next frame sent by a client.
    pub async fn recv_inbound(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.inbound_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Receive the next close frame sent by a client.
    pub async fn recv_close(&mut self) -> Option<(u16, String)> {
        timeout(Duration::from_secs(2), self.close_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Receive the next upgrade request URI.
    pub async fn recv_request(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.request_rx.recv())
            .await
            .ok()
            .flatten()
    }
}
