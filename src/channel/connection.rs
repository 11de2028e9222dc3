#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::ReentrantMutex;
use secrecy::{ExposeSecret as _, SecretString};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::listeners::{ChannelStatus, ListenerRegistry};
use crate::Result;
use crate::error::Error;
use crate::ws::config::Config;
use crate::ws::error::WsError;
use crate::ws::transport::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CloseReason, Transport, TransportConnection, TransportEvent,
    is_clean_close,
};

/// Close reason sent for an explicit disconnect.
pub(crate) const MANUAL_CLOSURE: &str = "manual closure";
/// Close reason sent when a new connect replaces a live session.
pub(crate) const SUPERSEDED: &str = "superseded";

/// Connection lifecycle state.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none pending
    Idle,
    /// Transport handshake in progress
    Connecting,
    /// Successfully connected
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// Local teardown in progress
    Closing,
    /// Connection lost, refused, or permanently given up on
    Closed,
    /// Waiting out the fixed delay before the next attempt
    ReconnectScheduled {
        /// 1-based number of the attempt about to run
        attempt: u32,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// Parameters of the most recent connect request, retained so retries run
/// with identical parameters.
pub(crate) struct ChannelDescriptor {
    pub token: SecretString,
    pub channel: String,
}

/// State a session task shares with the client handle.
pub(crate) struct Shared {
    pub config: Config,
    pub endpoint: Url,
    pub transport: Arc<dyn Transport>,
    pub listeners: ListenerRegistry,
    pub state_tx: watch::Sender<ConnectionState>,
    /// Serializes dispatch with epoch bumps. Re-entrant so a listener may
    /// call back into the client from inside its own callback.
    pub gate: ReentrantMutex<()>,
    /// Bumped by every connect/disconnect; a session whose epoch is behind
    /// must neither dispatch nor publish state.
    pub epoch: AtomicU64,
}

/// One `connect` call's worth of connection lifecycle.
pub(crate) struct Session {
    pub shared: Arc<Shared>,
    pub epoch: u64,
    pub descriptor: ChannelDescriptor,
    pub teardown: CancellationToken,
    pub teardown_reason: Arc<OnceLock<&'static str>>,
}

impl Session {
    fn is_stale(&self) -> bool {
        self.shared.epoch.load(Ordering::SeqCst) != self.epoch
    }

    fn set_state(&self, state: ConnectionState) {
        let _gate = self.shared.gate.lock();
        if self.is_stale() {
            return;
        }
        _ = self.shared.state_tx.send(state);
    }

    fn notify_status(&self, connected: bool) {
        let status = ChannelStatus {
            connected,
            channel: self.descriptor.channel.clone(),
        };
        let _gate = self.shared.gate.lock();
        if self.is_stale() {
            return;
        }
        self.shared.listeners.notify_connection(&status);
    }

    fn dispatch_frame(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(payload) => {
                let _gate = self.shared.gate.lock();
                if self.is_stale() {
                    return;
                }
                self.shared.listeners.notify_message(&payload);
            }
            Err(e) => {
                let error = WsError::MessageParse(e);
                tracing::warn!(
                    channel = %self.descriptor.channel,
                    error = %error,
                    "dropping malformed frame"
                );
            }
        }
    }
}

enum PumpOutcome {
    /// Teardown was requested locally (disconnect, supersede, or drop)
    Teardown,
    /// The peer closed the connection, or the transport failed
    PeerClosed(Option<CloseReason>),
}

/// Build `<endpoint>/<channel>?token=<token>`.
pub(crate) fn channel_url(endpoint: &Url, descriptor: &ChannelDescriptor) -> Result<Url> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|()| Error::validation("endpoint cannot serve as a base URL"))?
        .pop_if_empty()
        .push(&descriptor.channel);
    url.query_pairs_mut()
        .append_pair("token", descriptor.token.expose_secret());
    Ok(url)
}

/// Drive one session: connect, pump events, and retry abnormal closures with
/// the configured fixed delay until the budget runs out or teardown fires.
pub(crate) async fn run_session(
    session: Session,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    predecessors: Vec<JoinHandle<()>>,
) {
    // Superseded sessions own their sockets until they finish closing; wait
    // them out so at most one non-closed handle exists.
    for task in predecessors {
        _ = task.await;
    }

    let max_attempts = session.shared.config.reconnect.max_attempts;
    let delay = session.shared.config.reconnect.delay;
    let mut attempt = 0_u32;

    loop {
        if session.is_stale() || session.teardown.is_cancelled() {
            return;
        }
        session.set_state(ConnectionState::Connecting);

        let url = match channel_url(&session.shared.endpoint, &session.descriptor) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(
                    channel = %session.descriptor.channel,
                    error = %e,
                    "unable to build channel URL"
                );
                session.set_state(ConnectionState::Closed);
                return;
            }
        };

        let connected = tokio::select! {
            () = session.teardown.cancelled() => return,
            result = session.shared.transport.connect(url.as_str()) => result,
        };

        match connected {
            Ok(mut conn) => {
                attempt = 0;
                session.set_state(ConnectionState::Open {
                    since: Instant::now(),
                });
                session.notify_status(true);
                tracing::debug!(channel = %session.descriptor.channel, "channel connected");

                match pump(&session, conn.as_mut(), &mut outbound_rx).await {
                    PumpOutcome::Teardown => {
                        session.set_state(ConnectionState::Closing);
                        let reason = session
                            .teardown_reason
                            .get()
                            .copied()
                            .unwrap_or(MANUAL_CLOSURE);
                        if let Err(e) = conn.close(CloseReason::new(CLOSE_NORMAL, reason)).await {
                            tracing::debug!(error = %e, "close handshake failed");
                        }
                        return;
                    }
                    PumpOutcome::PeerClosed(close) => {
                        let code = close.as_ref().map_or(CLOSE_ABNORMAL, |c| c.code);
                        tracing::debug!(
                            channel = %session.descriptor.channel,
                            code,
                            "channel disconnected"
                        );
                        session.set_state(ConnectionState::Closed);
                        session.notify_status(false);
                        if is_clean_close(code) {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    channel = %session.descriptor.channel,
                    error = %e,
                    "unable to connect"
                );
                session.set_state(ConnectionState::Closed);
                session.notify_status(false);
            }
        }

        attempt += 1;
        if attempt > max_attempts {
            tracing::warn!(
                channel = %session.descriptor.channel,
                max_attempts,
                "reconnect attempts exhausted"
            );
            return;
        }

        tracing::debug!(
            channel = %session.descriptor.channel,
            attempt,
            max_attempts,
            delay = ?delay,
            "scheduling reconnect"
        );
        session.set_state(ConnectionState::ReconnectScheduled { attempt });
        tokio::select! {
            () = session.teardown.cancelled() => return,
            () = sleep(delay) => {}
        }
    }
}

/// Forward events while the connection is open.
async fn pump(
    session: &Session,
    conn: &mut dyn TransportConnection,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
) -> PumpOutcome {
    loop {
        tokio::select! {
            () = session.teardown.cancelled() => return PumpOutcome::Teardown,
            event = conn.next_event() => match event {
                Some(TransportEvent::Message(text)) => session.dispatch_frame(&text),
                Some(TransportEvent::Closed(close)) => return PumpOutcome::PeerClosed(close),
                None => return PumpOutcome::PeerClosed(None),
            },
            Some(text) = outbound_rx.recv() => {
                if let Err(e) = conn.send_text(text).await {
                    // A single failed send does not tear the connection down.
                    tracing::warn!(error = %e, "failed to send outbound frame");
                }
            }
        }
    }
}
