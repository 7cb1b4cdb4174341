//! Core configuration types and loading.

use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::blocks::{CommandBlock, EventBlock, UserBlock};
use super::defaults::*;
use super::validation::{self, ValidationError};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Connection and identity.
    pub server: ServerConfig,
    /// Dispatch and runtime tuning.
    #[serde(default)]
    pub bot: BotConfig,
    /// Flag grants by hostmask.
    #[serde(default, rename = "user")]
    pub users: Vec<UserBlock>,
    /// Event bindings, in registration order.
    #[serde(default, rename = "event")]
    pub events: Vec<EventBlock>,
    /// Command bindings. A repeated trigger replaces the earlier one.
    #[serde(default, rename = "command")]
    pub commands: Vec<CommandBlock>,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Execution budget for one handler call.
    pub fn handler_budget(&self) -> Duration {
        Duration::from_millis(self.bot.handler_budget_ms)
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(content)?;
        validation::validate(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

/// Connection and identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server hostname (e.g., "irc.libera.chat").
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Primary nickname.
    #[serde(default = "default_nickname")]
    pub nickname: String,
    /// Nickname to try when the primary is taken. Defaults to the primary.
    pub altnickname: Option<String>,
    /// Username (ident). Defaults to the nickname.
    pub username: Option<String>,
    /// Realname (gecos). Defaults to the nickname.
    pub realname: Option<String>,
    /// Optional server password, sent as PASS before registration.
    pub password: Option<String>,
    /// Channels joined once the server is ready.
    #[serde(default)]
    pub autojoin: Vec<String>,
}

impl ServerConfig {
    /// Alternate nickname, falling back to the primary.
    pub fn altnickname(&self) -> &str {
        self.altnickname.as_deref().unwrap_or(&self.nickname)
    }

    /// Username, falling back to the nickname.
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nickname)
    }

    /// Realname, falling back to the nickname.
    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nickname)
    }
}

/// Runtime tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Operator endpoint (`/metrics`, `/healthz`) port; 0 disables it.
    #[serde(default)]
    pub metrics_port: u16,
    /// Address the operator endpoint binds to.
    #[serde(default = "default_metrics_bind")]
    pub metrics_bind: IpAddr,
    /// Execution budget for a single handler call.
    #[serde(default = "default_handler_budget_ms")]
    pub handler_budget_ms: u64,
    /// Tell clients (by NOTICE) when a command is denied. Off by default so
    /// that probing for privileged triggers gets no answer.
    #[serde(default)]
    pub deny_notice: bool,
    /// First reconnect delay.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Reconnect delay ceiling.
    #[serde(default = "default_max_reconnect_delay_secs")]
    pub max_reconnect_delay_secs: u64,
    /// Idle time before the bot PINGs the server.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Outbound queue depth.
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
    /// QUIT message on shutdown.
    #[serde(default = "default_quit_message")]
    pub quit_message: String,
    /// CTCP VERSION reply.
    #[serde(default = "default_version_reply")]
    pub version_reply: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            metrics_port: 0,
            metrics_bind: default_metrics_bind(),
            handler_budget_ms: default_handler_budget_ms(),
            deny_notice: false,
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_reconnect_delay_secs: default_max_reconnect_delay_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            send_queue: default_send_queue(),
            quit_message: default_quit_message(),
            version_reply: default_version_reply(),
        }
    }
}
