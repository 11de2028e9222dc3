//! Generic WebSocket infrastructure.
//!
//! This module provides the transport seam the channel client is built on:
//!
//! - [`Transport`] / [`TransportConnection`]: capability traits over the
//!   underlying socket, so the core logic can run against an in-memory fake
//! - [`WebSocketTransport`]: the production implementation on
//!   `tokio-tungstenite`
//! - [`Config`]: reconnection policy configuration

pub mod config;
pub mod error;
pub mod transport;

pub use config::{Config, ReconnectConfig};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use transport::{
    CloseReason, Transport, TransportConnection, TransportEvent, WebSocketTransport,
};
