#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod channel;
pub mod error;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// WebSocket endpoint of a locally running channel backend.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:5000";

/// Channel every storefront client subscribes to unless told otherwise.
pub const DEFAULT_CHANNEL: &str = "global-updates";
