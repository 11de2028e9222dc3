//! Connect to a channel backend and print every event for a minute.
//!
//! Run against a local backend:
//! ```sh
//! RUST_LOG=debug CHANNEL_TOKEN=dev-token cargo run --example listen
//! ```

use std::time::Duration;

use shopstream_client_sdk::channel::{ChannelClient, ConnectionListener, MessageListener};
use shopstream_client_sdk::ws::config::Config;
use shopstream_client_sdk::{DEFAULT_CHANNEL, DEFAULT_ENDPOINT};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let endpoint =
        std::env::var("CHANNEL_WS_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_owned());
    let token = std::env::var("CHANNEL_TOKEN").unwrap_or_else(|_| "dev-token".to_owned());

    let client = ChannelClient::new(&endpoint, Config::default())?;

    let on_status = ConnectionListener::new(|status| {
        info!(connected = status.connected, channel = %status.channel, "status change");
    });
    client.add_connection_listener(&on_status);

    let on_event = MessageListener::new(|event| {
        info!(%event, "channel event");
    });
    client.add_message_listener(&on_event);

    if !client.connect(&token, DEFAULT_CHANNEL) {
        anyhow::bail!("could not start the connection attempt");
    }

    tokio::time::sleep(Duration::from_secs(60)).await;
    client.disconnect();
    Ok(())
}
