//! Reconnecting WebSocket transport
//!
//! Shared by the chain log subscription and the CLOB market price stream.
//! Both peers require a subscribe message after connecting, so the client
//! exposes a bidirectional channel pair and replays connection status events
//! (`Connected`, `Reconnecting`, `Disconnected`) to the consumer so it can
//! re-subscribe after transport loss.

mod client;
mod types;

pub use client::WsClient;
pub use types::{WsConfig, WsError, WsMessage};
