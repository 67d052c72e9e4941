//! Configuration loading.
//!
//! Reads the bridge configuration from a JSON file and applies
//! `SLACKIRC_*` environment overrides on top. Tokens are never printed by
//! `Debug`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants;

/// Message sent to an IRC service after registration,
/// e.g. `NickServ` / `IDENTIFY hunter2`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IrcAuth {
    /// Nickname of the service.
    pub target: String,
    /// Message text.
    pub message: String,
}

impl fmt::Debug for IrcAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrcAuth")
            .field("target", &self.target)
            .field("message", &"<redacted>")
            .finish()
    }
}

/// Configuration for the bridge.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Slack bot token (`xoxb-…`).
    pub slack_bot_token: String,
    /// Slack user token (`xoxp-…`); enables public file announcements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_user_token: Option<String>,
    /// Slack channel name without the leading `#`.
    pub slack_channel: String,
    /// Slack Web API base URL.
    pub slack_api_url: String,
    /// IRC server as `host:port`.
    pub irc_server: String,
    /// IRC channel including the leading `#`.
    pub irc_channel: String,
    /// IRC nickname.
    pub irc_nick: String,
    /// Connect to IRC over TLS.
    pub irc_tls: bool,
    /// Optional service authentication after IRC registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irc_auth: Option<IrcAuth>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slack_bot_token: String::new(),
            slack_user_token: None,
            slack_channel: String::new(),
            slack_api_url: constants::SLACK_API_BASE_URL.to_string(),
            irc_server: String::new(),
            irc_channel: String::new(),
            irc_nick: String::new(),
            irc_tls: false,
            irc_auth: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |token: &str| if token.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("Config")
            .field("slack_bot_token", &redact(&self.slack_bot_token))
            .field(
                "slack_user_token",
                &self.slack_user_token.as_deref().map(redact),
            )
            .field("slack_channel", &self.slack_channel)
            .field("slack_api_url", &self.slack_api_url)
            .field("irc_server", &self.irc_server)
            .field("irc_channel", &self.irc_channel)
            .field("irc_nick", &self.irc_nick)
            .field("irc_tls", &self.irc_tls)
            .field("irc_auth", &self.irc_auth)
            .finish()
    }
}

impl Config {
    /// Default config file: `<config dir>/slackirc/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("slackirc").join("config.json"))
    }

    /// Load configuration.
    ///
    /// Reads `path` if given (it must exist), else the default file if it
    /// exists, else starts from defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load_from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a JSON config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `SLACKIRC_*` overrides looked up through `var`.
    pub fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = var("SLACKIRC_SLACK_BOT_TOKEN") {
            self.slack_bot_token = token;
        }
        if let Some(token) = var("SLACKIRC_SLACK_USER_TOKEN") {
            self.slack_user_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(channel) = var("SLACKIRC_SLACK_CHANNEL") {
            self.slack_channel = channel;
        }
        if let Some(url) = var("SLACKIRC_SLACK_API_URL") {
            self.slack_api_url = url;
        }
        if let Some(server) = var("SLACKIRC_IRC_SERVER") {
            self.irc_server = server;
        }
        if let Some(channel) = var("SLACKIRC_IRC_CHANNEL") {
            self.irc_channel = channel;
        }
        if let Some(nick) = var("SLACKIRC_IRC_NICK") {
            self.irc_nick = nick;
        }
        if let Some(tls) = var("SLACKIRC_IRC_TLS") {
            match tls.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.irc_tls = true,
                "0" | "false" | "no" => self.irc_tls = false,
                other => log::warn!("Ignoring SLACKIRC_IRC_TLS={other}"),
            }
        }
    }

    /// Check that everything the bridge needs is set.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("slack_bot_token", &self.slack_bot_token),
            ("slack_channel", &self.slack_channel),
            ("irc_server", &self.irc_server),
            ("irc_channel", &self.irc_channel),
            ("irc_nick", &self.irc_nick),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("Missing required config: {}", missing.join(", "));
        }
        if self.slack_channel.starts_with('#') {
            anyhow::bail!("slack_channel must be a bare name without '#'");
        }
        if !self.irc_server.contains(':') {
            anyhow::bail!("irc_server must be host:port, got {}", self.irc_server);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn complete() -> Config {
        Config {
            slack_bot_token: "xoxb-1".to_string(),
            slack_channel: "general".to_string(),
            irc_server: "irc.example.net:6697".to_string(),
            irc_channel: "#bridge".to_string(),
            irc_nick: "slackbridge".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.slack_api_url, "https://slack.com/api");
        assert!(!config.irc_tls);
        assert!(config.slack_user_token.is_none());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_with_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r##"{{
                "slack_bot_token": "xoxb-file",
                "slack_channel": "general",
                "irc_server": "irc.example.net:6667",
                "irc_channel": "#bridge",
                "irc_nick": "bridge",
                "irc_auth": {{"target": "NickServ", "message": "IDENTIFY pw"}}
            }}"##
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(config.irc_nick, "bridge");
        assert_eq!(
            config.irc_auth,
            Some(IrcAuth {
                target: "NickServ".to_string(),
                message: "IDENTIFY pw".to_string()
            })
        );
        assert_eq!(config.slack_api_url, "https://slack.com/api");
    }

    #[test]
    fn test_load_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(dir.path().join("nope.json").as_path())).unwrap_err();
        assert!(format!("{err:#}").contains("nope.json"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SLACKIRC_SLACK_BOT_TOKEN", "xoxb-env"),
            ("SLACKIRC_SLACK_USER_TOKEN", "xoxp-env"),
            ("SLACKIRC_IRC_TLS", "true"),
            ("SLACKIRC_IRC_NICK", "envnick"),
        ]
        .into_iter()
        .collect();

        let mut config = complete();
        config.apply_env_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.slack_bot_token, "xoxb-env");
        assert_eq!(config.slack_user_token.as_deref(), Some("xoxp-env"));
        assert!(config.irc_tls);
        assert_eq!(config.irc_nick, "envnick");
        assert_eq!(config.slack_channel, "general");
    }

    #[test]
    fn test_validate_reports_every_missing_field() {
        let mut config = complete();
        assert!(config.validate().is_ok());

        config.slack_bot_token.clear();
        config.irc_nick = "  ".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("slack_bot_token"));
        assert!(err.contains("irc_nick"));
    }

    #[test]
    fn test_validate_rejects_malformed_values() {
        let mut config = complete();
        config.slack_channel = "#general".to_string();
        assert!(config.validate().is_err());

        let mut config = complete();
        config.irc_server = "irc.example.net".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = complete();
        config.slack_user_token = Some("xoxp-secret".to_string());
        config.irc_auth = Some(IrcAuth {
            target: "NickServ".to_string(),
            message: "IDENTIFY hunter2".to_string(),
        });
        let debug = format!("{config:?}");
        assert!(!debug.contains("xoxb-1"));
        assert!(!debug.contains("xoxp-secret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("NickServ"));
    }
}
