//! Built-in event handlers.

use async_trait::async_trait;
use serde::Deserialize;
use slircbot_proto::{irc_eq, is_channel_name};
use tracing::info;

use super::catalog::parse_args;
use super::{Env, EventHandler};
use crate::error::{HandlerResult, LoadError};
use crate::registry::{Event, split_trigger};

/// Writes a line to the `script` log target for every event it sees.
pub struct LogHandler {
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LogArgs {
    message: Option<String>,
}

impl LogHandler {
    pub fn new(message: Option<String>) -> Self {
        Self { message }
    }

    pub fn from_args(args: &toml::Table) -> Result<Self, LoadError> {
        let args: LogArgs = parse_args("log", args)?;
        Ok(Self::new(args.message))
    }
}

#[async_trait]
impl EventHandler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, _env: &Env<'_>, event: &Event) -> HandlerResult {
        let client = event.client().map(|c| c.nick.as_str());
        match &self.message {
            Some(message) => info!(target: "script", event = event.name(), "{message}"),
            None => info!(
                target: "script",
                event = event.name(),
                channel = event.channel(),
                client,
                text = event.text(),
                "Event received"
            ),
        }
        Ok(())
    }
}

/// Joins a fixed list of channels whenever it fires. Usually bound to
/// `onServerReady`.
pub struct JoinHandler {
    channels: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JoinArgs {
    channels: Vec<String>,
}

impl JoinHandler {
    pub fn from_args(args: &toml::Table) -> Result<Self, LoadError> {
        let args: JoinArgs = parse_args("join", args)?;
        if args.channels.is_empty() {
            return Err(LoadError::InvalidArgs {
                handler: "join".into(),
                reason: "channels must not be empty".into(),
            });
        }
        if let Some(bad) = args.channels.iter().find(|c| !is_channel_name(c)) {
            return Err(LoadError::InvalidArgs {
                handler: "join".into(),
                reason: format!("{bad:?} is not a channel name"),
            });
        }
        Ok(Self {
            channels: args.channels,
        })
    }
}

#[async_trait]
impl EventHandler for JoinHandler {
    fn name(&self) -> &str {
        "join"
    }

    async fn handle(&self, env: &Env<'_>, _event: &Event) -> HandlerResult {
        for channel in &self.channels {
            env.parser.join_channel(channel).await?;
        }
        Ok(())
    }
}

/// Repeats channel chatter back to the channel.
///
/// Lines that start with a bound trigger are left to the command router,
/// and the bot never echoes itself.
pub struct EchoHandler {
    format: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EchoArgs {
    #[serde(default = "default_echo_format")]
    format: String,
}

fn default_echo_format() -> String {
    "{nick} said: {text}".to_string()
}

impl EchoHandler {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    pub fn from_args(args: &toml::Table) -> Result<Self, LoadError> {
        let args: EchoArgs = parse_args("echo", args)?;
        Ok(Self::new(args.format))
    }
}

#[async_trait]
impl EventHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    async fn handle(&self, env: &Env<'_>, event: &Event) -> HandlerResult {
        let Event::ChannelMessage {
            channel,
            client,
            text,
        } = event
        else {
            return Ok(());
        };
        let (trigger, _) = split_trigger(text);
        if env.bindings.commands.contains(trigger) || irc_eq(&client.nick, &env.parser.nickname()) {
            return Ok(());
        }
        let reply = self
            .format
            .replace("{nick}", &client.nick)
            .replace("{text}", text);
        env.parser.send_message(channel, &reply).await?;
        Ok(())
    }
}
