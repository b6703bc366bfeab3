//! Discord adapter: REST for reading channel history, gateway WebSocket for the bot's session.
//!
//! `DiscordSession::open` validates the token, identifies on the gateway, and keeps the
//! connection alive until `close`. Message reads go over REST only.

mod api;
mod gateway;
mod protocol;
mod session;

pub use api::DiscordApi;
pub use gateway::GatewaySession;
pub use protocol::{GatewayPayload, User};
pub use session::DiscordSession;
