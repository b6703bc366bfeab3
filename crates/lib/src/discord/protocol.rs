//! Discord Gateway v10 payloads and opcodes (the subset this service speaks).

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_RECONNECT: u8 = 7;
pub const OP_INVALID_SESSION: u8 = 9;
pub const OP_HELLO: u8 = 10;
pub const OP_HEARTBEAT_ACK: u8 = 11;

/// Gateway envelope, used in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Value>,
    /// Sequence number; only set on dispatches.
    #[serde(default)]
    pub s: Option<u64>,
    /// Event name (e.g. "READY"); only set on dispatches.
    #[serde(default)]
    pub t: Option<String>,
}

impl GatewayPayload {
    pub fn heartbeat(seq: Option<u64>) -> Self {
        Self {
            op: OP_HEARTBEAT,
            d: seq.map(Value::from),
            s: None,
            t: None,
        }
    }

    pub fn identify(token: &str, intents: u64) -> Self {
        let d = serde_json::json!({
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "chanlog",
                "device": "chanlog",
            },
        });
        Self {
            op: OP_IDENTIFY,
            d: Some(d),
            s: None,
            t: None,
        }
    }

    pub fn is_dispatch(&self, event: &str) -> bool {
        self.op == OP_DISPATCH && self.t.as_deref() == Some(event)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelloData {
    /// Milliseconds between heartbeats.
    pub heartbeat_interval: u64,
}

/// The `d` field of the READY dispatch (fields we read).
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyEvent {
    pub user: User,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A Discord user (the bot itself, from READY).
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}
