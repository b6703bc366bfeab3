//! Message source: the one remote capability the HTTP handler depends on.
//!
//! The Discord session implements this; tests substitute in-process fakes.

use async_trait::async_trait;
use serde_json::Value;

/// Errors from opening, querying, or closing a remote message source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("gateway: {0}")]
    Gateway(String),

    #[error("invalid url: {0}")]
    Url(String),
}

/// Open session to a chat platform. Shared read-only across requests; closed once at shutdown.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch up to `limit` of the most recent messages in `channel_id`, in the order the remote returns them.
    async fn fetch_messages(&self, channel_id: &str, limit: u32) -> Result<Vec<Value>, SourceError>;

    /// Release the session. Calling it again after a successful close is a no-op.
    async fn close(&self) -> Result<(), SourceError>;
}
