//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.chanlog/config.json`) and environment.
//! Every field has a default, so a missing file is a valid (token-less) configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Discord credential and endpoints.
    #[serde(default)]
    pub discord: DiscordConfig,
}

/// HTTP bind, port, and shutdown settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_server_bind")]
    pub bind: String,

    /// HTTP port (default 8080).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// How long in-flight requests may run after a shutdown signal before they are abandoned.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_server_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
            port: default_server_port(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Discord bot settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    /// Bot token. Overridden by DISCORD_BOT_TOKEN env and by `--token`.
    #[serde(default)]
    pub token: Option<String>,

    /// REST API base (default https://discord.com/api/v10).
    #[serde(default = "default_discord_api_base")]
    pub api_base: String,

    /// Gateway WebSocket URL. When unset, it is discovered via `GET /gateway/bot`.
    #[serde(default)]
    pub gateway_url: Option<String>,

    /// Gateway intents bitmask sent in Identify (default GUILD_MESSAGES).
    #[serde(default = "default_discord_intents")]
    pub intents: u64,
}

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// GUILD_MESSAGES (1 << 9).
pub const INTENT_GUILD_MESSAGES: u64 = 1 << 9;

fn default_discord_api_base() -> String {
    DISCORD_API_BASE.to_string()
}

fn default_discord_intents() -> u64 {
    INTENT_GUILD_MESSAGES
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_discord_api_base(),
            gateway_url: None,
            intents: default_discord_intents(),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

/// Resolve the bot token: the `--token` flag wins, then env DISCORD_BOT_TOKEN, then config.
pub fn resolve_discord_token(cli_token: Option<&str>, config: &Config) -> Option<String> {
    non_empty(cli_token)
        .or_else(|| non_empty(std::env::var("DISCORD_BOT_TOKEN").ok().as_deref()))
        .or_else(|| non_empty(config.discord.token.as_deref()))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CHANLOG_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".chanlog").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, else the default path (or CHANLOG_CONFIG_PATH).
/// Missing file => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_bind_port_and_timeout() {
        let s = ServerConfig::default();
        assert_eq!(s.bind, "0.0.0.0");
        assert_eq!(s.port, 8080);
        assert_eq!(s.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn default_discord_targets_v10_with_guild_messages() {
        let d = DiscordConfig::default();
        assert_eq!(d.api_base, "https://discord.com/api/v10");
        assert_eq!(d.intents, 512);
        assert!(d.token.is_none());
        assert!(d.gateway_url.is_none());
    }

    #[test]
    fn parse_partial_camel_case_config() {
        let config: Config = serde_json::from_str(
            r#"{"server":{"port":9090,"shutdownTimeoutSecs":1},"discord":{"token":"abc","gatewayUrl":"ws://127.0.0.1:1/"}}"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.shutdown_timeout_secs, 1);
        assert_eq!(config.discord.token.as_deref(), Some("abc"));
        assert_eq!(config.discord.gateway_url.as_deref(), Some("ws://127.0.0.1:1/"));
        assert_eq!(config.discord.api_base, DISCORD_API_BASE);
    }

    #[test]
    fn cli_token_wins_and_is_trimmed() {
        let mut config = Config::default();
        config.discord.token = Some("from-config".to_string());
        assert_eq!(
            resolve_discord_token(Some("  from-flag "), &config).as_deref(),
            Some("from-flag")
        );
    }

    #[test]
    fn blank_cli_token_is_ignored() {
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("t")).as_deref(), Some("t"));
    }

    // The only test that touches DISCORD_BOT_TOKEN; every env-dependent case lives here so
    // parallel tests never observe a half-set variable.
    #[test]
    fn token_precedence_flag_then_env_then_config() {
        let mut config = Config::default();
        config.discord.token = Some(" from-config ".to_string());

        std::env::remove_var("DISCORD_BOT_TOKEN");
        assert_eq!(
            resolve_discord_token(Some("  "), &config).as_deref(),
            Some("from-config")
        );
        assert_eq!(resolve_discord_token(None, &config).as_deref(), Some("from-config"));

        std::env::set_var("DISCORD_BOT_TOKEN", "from-env");
        assert_eq!(resolve_discord_token(Some(""), &config).as_deref(), Some("from-env"));
        assert_eq!(
            resolve_discord_token(Some("from-flag"), &config).as_deref(),
            Some("from-flag")
        );

        std::env::set_var("DISCORD_BOT_TOKEN", "   ");
        assert_eq!(
            resolve_discord_token(None, &config).as_deref(),
            Some("from-config")
        );
        config.discord.token = Some("\t".to_string());
        assert_eq!(resolve_discord_token(Some(" "), &config), None);

        std::env::remove_var("DISCORD_BOT_TOKEN");
        config.discord.token = None;
        assert_eq!(resolve_discord_token(None, &config), None);
    }

    #[test]
    fn load_config_missing_file_uses_defaults() {
        let path = std::env::temp_dir()
            .join(format!("chanlog-config-test-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn load_config_rejects_malformed_json() {
        let dir = std::env::temp_dir().join(format!("chanlog-config-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let err = load_config(Some(path)).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config"));
    }
}
