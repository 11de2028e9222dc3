//! Observer sets for inbound events and connection status changes.
//!
//! Listener identity is the handle itself: a [`MessageListener`] wraps its
//! callback in an `Arc`, and clones share that identity, so the clone handed
//! to the client can later be used to remove the original registration.
//! Registration is idempotent and removal of an unknown handle is a no-op;
//! both report whether the set actually changed.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Connection status change delivered to connection listeners.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Whether the channel is currently connected
    pub connected: bool,
    /// Logical channel name the status refers to
    pub channel: String,
}

/// Handle to a registered callback for inbound channel events.
#[derive(Clone)]
pub struct MessageListener(Arc<dyn Fn(&Value) + Send + Sync>);

impl MessageListener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

/// Handle to a registered callback for connection status changes.
#[derive(Clone)]
pub struct ConnectionListener(Arc<dyn Fn(&ChannelStatus) + Send + Sync>);

impl ConnectionListener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&ChannelStatus) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

/// Message and connection observer sets with snapshot dispatch.
///
/// Dispatch iterates a snapshot taken under the lock, so listeners may add or
/// remove registrations from inside their own callbacks. A panicking listener
/// is caught, logged, and never interrupts delivery to the rest.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    message: RwLock<Vec<MessageListener>>,
    connection: RwLock<Vec<ConnectionListener>>,
}

impl ListenerRegistry {
    pub(crate) fn add_message(&self, listener: &MessageListener) -> bool {
        let mut set = self.message.write();
        if set.iter().any(|l| l.key() == listener.key()) {
            return false;
        }
        set.push(listener.clone());
        true
    }

    pub(crate) fn remove_message(&self, listener: &MessageListener) -> bool {
        let mut set = self.message.write();
        let before = set.len();
        set.retain(|l| l.key() != listener.key());
        set.len() != before
    }

    pub(crate) fn add_connection(&self, listener: &ConnectionListener) -> bool {
        let mut set = self.connection.write();
        if set.iter().any(|l| l.key() == listener.key()) {
            return false;
        }
        set.push(listener.clone());
        true
    }

    pub(crate) fn remove_connection(&self, listener: &ConnectionListener) -> bool {
        let mut set = self.connection.write();
        let before = set.len();
        set.retain(|l| l.key() != listener.key());
        set.len() != before
    }

    pub(crate) fn notify_message(&self, payload: &Value) {
        let snapshot = self.message.read().clone();
        for listener in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| (listener.0)(payload))).is_err() {
                tracing::warn!("message listener panicked; continuing with remaining listeners");
            }
        }
    }

    pub(crate) fn notify_connection(&self, status: &ChannelStatus) {
        let snapshot = self.connection.read().clone();
        for listener in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| (listener.0)(status))).is_err() {
                tracing::warn!("connection listener panicked; continuing with remaining listeners");
            }
        }
    }
}
