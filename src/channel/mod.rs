#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Resilient channel client.
//!
//! A [`ChannelClient`] maintains a single persistent connection to a named
//! event channel on the Shopstream real-time backend. It survives transient
//! network failures with a bounded fixed-delay reconnect policy and fans
//! every inbound event out to independently registered listeners.
//!
//! # Example
//!
//! ```rust, no_run
//! use shopstream_client_sdk::DEFAULT_CHANNEL;
//! use shopstream_client_sdk::channel::{ChannelClient, ConnectionListener, MessageListener};
//! use shopstream_client_sdk::ws::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ChannelClient::new("wss://channels.shopstream.dev", Config::default())?;
//!
//!     let on_status = ConnectionListener::new(|status| {
//!         tracing::info!(connected = status.connected, channel = %status.channel, "status");
//!     });
//!     client.add_connection_listener(&on_status);
//!
//!     let on_event = MessageListener::new(|event| {
//!         tracing::info!(%event, "channel event");
//!     });
//!     client.add_message_listener(&on_event);
//!
//!     client.connect("bearer-token-from-login", DEFAULT_CHANNEL);
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod connection;
pub mod listeners;

pub use client::ChannelClient;
pub use connection::ConnectionState;
pub use listeners::{ChannelStatus, ConnectionListener, MessageListener};
