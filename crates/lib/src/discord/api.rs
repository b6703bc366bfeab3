//! Discord REST API client: gateway discovery and channel history.

use crate::discord::protocol::User;
use crate::source::SourceError;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

const USER_AGENT_VALUE: &str = concat!("DiscordBot (chanlog, ", env!("CARGO_PKG_VERSION"), ")");

#[derive(Debug, Deserialize)]
struct GatewayBotResponse {
    url: String,
}

/// REST client authenticated as a bot.
#[derive(Clone)]
pub struct DiscordApi {
    client: reqwest::Client,
    token: String,
    base: Url,
}

impl DiscordApi {
    pub fn new(token: &str, api_base: &str) -> Result<Self, SourceError> {
        let base = Url::parse(api_base.trim())
            .map_err(|e| SourceError::Url(format!("{}: {}", api_base, e)))?;
        if base.cannot_be_a_base() {
            return Err(SourceError::Url(format!("{}: not a base url", api_base)));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
            base,
        })
    }

    /// Base URL with `segments` appended, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Url(format!("{}: not a base url", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        let res = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res.json::<T>().await?)
    }

    /// `GET /gateway/bot`: the WebSocket URL to connect to. Fails on a rejected token.
    pub async fn gateway_url(&self) -> Result<String, SourceError> {
        let url = self.endpoint(&["gateway", "bot"])?;
        let res: GatewayBotResponse = self.get_json(url).await?;
        Ok(res.url)
    }

    /// `GET /users/@me`: the bot user the token belongs to.
    pub async fn current_user(&self) -> Result<User, SourceError> {
        let url = self.endpoint(&["users", "@me"])?;
        self.get_json(url).await
    }

    /// `GET /channels/{id}/messages?limit=N`: the most recent messages, newest first as Discord returns them.
    pub async fn channel_messages(&self, channel_id: &str, limit: u32) -> Result<Vec<Value>, SourceError> {
        let mut url = self.endpoint(&["channels", channel_id, "messages"])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_segments_to_versioned_base() {
        let api = DiscordApi::new("t", "https://discord.com/api/v10").unwrap();
        let url = api.endpoint(&["channels", "123", "messages"]).unwrap();
        assert_eq!(url.as_str(), "https://discord.com/api/v10/channels/123/messages");
    }

    #[test]
    fn endpoint_tolerates_trailing_slash_in_base() {
        let api = DiscordApi::new("t", "http://127.0.0.1:9000/api/v10/").unwrap();
        let url = api.endpoint(&["gateway", "bot"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/api/v10/gateway/bot");
    }

    #[test]
    fn channel_id_cannot_escape_its_path_segment() {
        let api = DiscordApi::new("t", "https://discord.com/api/v10").unwrap();
        let url = api.endpoint(&["channels", "../users/@me?x=1", "messages"]).unwrap();
        assert!(url.path().starts_with("/api/v10/channels/"));
        assert!(url.query().is_none());
        assert!(url.path().ends_with("/messages"));
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(matches!(DiscordApi::new("t", "not a url"), Err(SourceError::Url(_))));
        assert!(matches!(DiscordApi::new("t", "mailto:x@example.com"), Err(SourceError::Url(_))));
    }
}
