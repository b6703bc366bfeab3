//! Discord session: the process-lifetime connection handle behind `MessageSource`.

use crate::config::DiscordConfig;
use crate::discord::api::DiscordApi;
use crate::discord::gateway::GatewaySession;
use crate::discord::protocol::User;
use crate::source::{MessageSource, SourceError};
use async_trait::async_trait;
use serde_json::Value;

pub struct DiscordSession {
    api: DiscordApi,
    gateway: GatewaySession,
}

impl DiscordSession {
    /// Validate the token, open the gateway connection, and identify. Any failure here is fatal to startup.
    pub async fn open(config: &DiscordConfig, token: &str) -> Result<Self, SourceError> {
        let api = DiscordApi::new(token, &config.api_base)?;
        let gateway_url = match config.gateway_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                // The override skips /gateway/bot, so check the token on a cheap REST call instead.
                api.current_user().await?;
                url.to_string()
            }
            _ => api.gateway_url().await?,
        };
        let gateway = GatewaySession::connect(&gateway_url, token, config.intents).await?;
        log::info!("connected as {}", gateway.user().username);
        Ok(Self { api, gateway })
    }

    pub fn user(&self) -> &User {
        self.gateway.user()
    }
}

#[async_trait]
impl MessageSource for DiscordSession {
    async fn fetch_messages(&self, channel_id: &str, limit: u32) -> Result<Vec<Value>, SourceError> {
        self.api.channel_messages(channel_id, limit).await
    }

    async fn close(&self) -> Result<(), SourceError> {
        self.gateway.close().await
    }
}
