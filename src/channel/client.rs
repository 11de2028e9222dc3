#![expect(
    clippy::module_name_repetitions,
    reason = "The client type carries its domain in the name for clarity"
)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, ReentrantMutex};
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::connection::{
    ChannelDescriptor, ConnectionState, MANUAL_CLOSURE, SUPERSEDED, Session, Shared, channel_url,
    run_session,
};
use super::listeners::{ConnectionListener, ListenerRegistry, MessageListener};
use crate::error::Error;
use crate::ws::config::Config;
use crate::ws::transport::{Transport, WebSocketTransport};
use crate::{DEFAULT_ENDPOINT, Result};

/// Resilient client for one logical event channel.
///
/// The client owns at most one live connection at a time: `connect` replaces
/// any previous connection, abnormal closures are retried on a fixed delay up
/// to a configured budget, and inbound events fan out to registered
/// listeners. Listener sets survive reconnects and disconnects.
///
/// Cloning is cheap; clones share the connection and the listener sets.
///
/// # Examples
///
/// ```rust, no_run
/// use shopstream_client_sdk::DEFAULT_CHANNEL;
/// use shopstream_client_sdk::channel::{ChannelClient, MessageListener};
/// use shopstream_client_sdk::ws::config::Config;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = ChannelClient::new("wss://channels.shopstream.dev", Config::default())?;
///
///     let listener = MessageListener::new(|event| {
///         tracing::info!(%event, "channel event");
///     });
///     client.add_message_listener(&listener);
///
///     client.connect("bearer-token-from-login", DEFAULT_CHANNEL);
///     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
///     client.disconnect();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ChannelClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    shared: Arc<Shared>,
    state_rx: watch::Receiver<ConnectionState>,
    session: Mutex<SessionSlot>,
}

/// Live session plus the tail of the previous one, kept so a successor can
/// wait for the old socket to finish closing.
#[derive(Default)]
struct SessionSlot {
    active: Option<SessionHandle>,
    draining: Option<JoinHandle<()>>,
}

struct SessionHandle {
    outbound_tx: mpsc::UnboundedSender<String>,
    teardown: CancellationToken,
    teardown_reason: Arc<OnceLock<&'static str>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Request teardown with the given close reason; returns the task so the
    /// successor can wait for the socket to finish closing.
    fn cancel(self, reason: &'static str) -> JoinHandle<()> {
        _ = self.teardown_reason.set(reason);
        self.teardown.cancel();
        self.task
    }
}

impl Default for ChannelClient {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, Config::default())
            .expect("channel client with default endpoint should succeed")
    }
}

impl ChannelClient {
    /// Create a client against `endpoint`, the base WebSocket URL without a
    /// channel path (e.g. `wss://channels.shopstream.dev`).
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        Self::with_transport(endpoint, config, Arc::new(WebSocketTransport))
    }

    /// Create a client with a custom [`Transport`], e.g. an in-memory fake in
    /// tests.
    pub fn with_transport(
        endpoint: &str,
        config: Config,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::validation("endpoint cannot serve as a base URL"));
        }

        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        Ok(Self {
            inner: Arc::new(ClientInner {
                shared: Arc::new(Shared {
                    config,
                    endpoint,
                    transport,
                    listeners: ListenerRegistry::default(),
                    state_tx,
                    gate: ReentrantMutex::new(()),
                    epoch: AtomicU64::new(0),
                }),
                state_rx,
                session: Mutex::new(SessionSlot::default()),
            }),
        })
    }

    /// Open (or replace) the connection for `channel`, authenticating with
    /// the opaque bearer `token`.
    ///
    /// Fire-and-forget: the connection is established on a background task
    /// and failures surface through status notifications and the reconnect
    /// path. Returns `false` only when the attempt could not start at all
    /// (empty token or channel, or a channel name the endpoint cannot carry).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, token: &str, channel: &str) -> bool {
        if token.is_empty() || channel.is_empty() {
            tracing::warn!("connect requires a non-empty token and channel");
            return false;
        }

        let descriptor = ChannelDescriptor {
            token: SecretString::from(token.to_owned()),
            channel: channel.to_owned(),
        };
        if let Err(e) = channel_url(&self.inner.shared.endpoint, &descriptor) {
            tracing::warn!(error = %e, "unable to build channel URL");
            return false;
        }

        // Gate before session lock, everywhere: a dispatching listener may
        // re-enter connect/disconnect on the gate-holding thread.
        let _gate = self.inner.shared.gate.lock();
        let epoch = self.inner.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        _ = self.inner.shared.state_tx.send(ConnectionState::Connecting);

        let mut slot = self.inner.session.lock();
        let mut predecessors = Vec::new();
        if let Some(handle) = slot.draining.take() {
            predecessors.push(handle);
        }
        if let Some(active) = slot.active.take() {
            predecessors.push(active.cancel(SUPERSEDED));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let teardown = CancellationToken::new();
        let teardown_reason = Arc::new(OnceLock::new());
        let session = Session {
            shared: Arc::clone(&self.inner.shared),
            epoch,
            descriptor,
            teardown: teardown.clone(),
            teardown_reason: Arc::clone(&teardown_reason),
        };
        let task = tokio::spawn(run_session(session, outbound_rx, predecessors));

        slot.active = Some(SessionHandle {
            outbound_tx,
            teardown,
            teardown_reason,
            task,
        });
        true
    }

    /// Close the connection and suppress any pending reconnect.
    ///
    /// Idempotent. After this returns, no message or status notification is
    /// delivered for the closed connection and no reconnect attempt fires;
    /// listener sets are left untouched.
    pub fn disconnect(&self) {
        let _gate = self.inner.shared.gate.lock();
        let mut slot = self.inner.session.lock();
        let Some(active) = slot.active.take() else {
            return;
        };

        self.inner.shared.epoch.fetch_add(1, Ordering::SeqCst);
        _ = self.inner.shared.state_tx.send(ConnectionState::Closing);
        slot.draining = Some(active.cancel(MANUAL_CLOSURE));
        _ = self.inner.shared.state_tx.send(ConnectionState::Idle);
    }

    /// Whether the channel is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    ///
    /// Useful for reacting to reconnections without registering a callback.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state_tx.subscribe()
    }

    /// Serialize `payload` to a JSON text frame and send it.
    ///
    /// Returns `false` when the payload cannot be serialized or the channel
    /// is not open; a failure is logged, never raised.
    pub fn send<P: Serialize>(&self, payload: &P) -> bool {
        match serde_json::to_string(payload) {
            Ok(text) => self.send_text(text),
            Err(e) => {
                tracing::warn!(error = %e, "unable to serialize outbound payload");
                false
            }
        }
    }

    /// Send a raw text frame, unchanged.
    pub fn send_text<S: Into<String>>(&self, text: S) -> bool {
        if !self.is_connected() {
            tracing::warn!("cannot send, channel is not connected");
            return false;
        }
        let slot = self.inner.session.lock();
        match slot.active.as_ref() {
            Some(active) => active.outbound_tx.send(text.into()).is_ok(),
            None => false,
        }
    }

    /// Register a message listener. Returns `false` if it was already
    /// registered.
    pub fn add_message_listener(&self, listener: &MessageListener) -> bool {
        self.inner.shared.listeners.add_message(listener)
    }

    /// Remove a message listener. Returns `false` if it was not registered.
    pub fn remove_message_listener(&self, listener: &MessageListener) -> bool {
        self.inner.shared.listeners.remove_message(listener)
    }

    /// Register a connection status listener. Returns `false` if it was
    /// already registered.
    pub fn add_connection_listener(&self, listener: &ConnectionListener) -> bool {
        self.inner.shared.listeners.add_connection(listener)
    }

    /// Remove a connection status listener. Returns `false` if it was not
    /// registered.
    pub fn remove_connection_listener(&self, listener: &ConnectionListener) -> bool {
        self.inner.shared.listeners.remove_connection(listener)
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let mut slot = self.session.lock();
        if let Some(active) = slot.active.take() {
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            drop(active.cancel(MANUAL_CLOSURE));
        }
    }
}
