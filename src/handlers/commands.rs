//! Built-in command handlers.
//!
//! Each replies in the channel the command came from. Authorization has
//! already happened by the time `handle` runs.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::catalog::parse_args;
use super::{CommandHandler, Env, Invocation};
use crate::error::{HandlerResult, LoadError};
use crate::session::raw_line;

async fn usage(invocation: &Invocation<'_>, what: &str) -> HandlerResult {
    let text = format!("Usage: {} {what}", invocation.trigger);
    invocation.channel.send_message(&text).await?;
    Ok(())
}

/// Acknowledges, reloads the configuration, and reports the outcome.
pub struct RehashCommand {
    ack: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RehashArgs {
    #[serde(default = "default_rehash_ack")]
    ack: String,
}

fn default_rehash_ack() -> String {
    "Reloading...".to_string()
}

impl RehashCommand {
    pub fn from_args(args: &toml::Table) -> Result<Self, LoadError> {
        let args: RehashArgs = parse_args("rehash", args)?;
        Ok(Self { ack: args.ack })
    }
}

#[async_trait]
impl CommandHandler for RehashCommand {
    fn name(&self) -> &str {
        "rehash"
    }

    async fn handle(&self, env: &Env<'_>, invocation: &Invocation<'_>) -> HandlerResult {
        let channel = &invocation.channel;
        channel.send_message(&self.ack).await?;
        info!(client = %invocation.client, "Rehash requested from chat");

        let reply = match env.services.rehasher.rehash().await {
            Ok(report) => format!(
                "Rehash complete: generation {}, {} event binding(s), {} command(s)",
                report.generation, report.events, report.commands
            ),
            Err(e) => {
                let detail = e.to_string();
                format!("Rehash failed: {}", detail.lines().next().unwrap_or_default())
            }
        };
        channel.send_message(&reply).await?;
        Ok(())
    }
}

/// Sends its argument text to the server verbatim.
pub struct RawCommand {
    acknowledge: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawArgs {
    #[serde(default = "default_true")]
    acknowledge: bool,
}

fn default_true() -> bool {
    true
}

impl RawCommand {
    pub fn from_args(args: &toml::Table) -> Result<Self, LoadError> {
        let args: RawArgs = parse_args("raw", args)?;
        Ok(Self {
            acknowledge: args.acknowledge,
        })
    }
}

#[async_trait]
impl CommandHandler for RawCommand {
    fn name(&self) -> &str {
        "raw"
    }

    async fn handle(&self, env: &Env<'_>, invocation: &Invocation<'_>) -> HandlerResult {
        let line = match raw_line(invocation.args) {
            Ok(Some(line)) => line,
            Ok(None) => return usage(invocation, "<line>").await,
            Err(e) => {
                invocation
                    .channel
                    .send_message(&format!("Not sent: {e}"))
                    .await?;
                return Ok(());
            }
        };
        if self.acknowledge {
            invocation
                .channel
                .send_message(&format!("Sent raw: {line}"))
                .await?;
        }
        env.parser.send_raw_message(line).await?;
        Ok(())
    }
}

/// Evaluates its argument with the sandboxed evaluator and replies once,
/// with either the result or the error.
pub struct EvalCommand;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

impl EvalCommand {
    pub fn from_args(args: &toml::Table) -> Result<Self, LoadError> {
        let NoArgs {} = parse_args("eval", args)?;
        Ok(Self)
    }
}

#[async_trait]
impl CommandHandler for EvalCommand {
    fn name(&self) -> &str {
        "eval"
    }

    async fn handle(&self, env: &Env<'_>, invocation: &Invocation<'_>) -> HandlerResult {
        if invocation.args.trim().is_empty() {
            return usage(invocation, "<expression>").await;
        }
        let reply = match env.services.evaluator.evaluate(invocation.args) {
            Ok(value) => format!("Result: {value}"),
            Err(e) => format!("Error: {e}"),
        };
        invocation.channel.send_message(&reply).await?;
        Ok(())
    }
}

/// Repeats its argument text in the channel.
pub struct SayCommand;

impl SayCommand {
    pub fn from_args(args: &toml::Table) -> Result<Self, LoadError> {
        let NoArgs {} = parse_args("say", args)?;
        Ok(Self)
    }
}

#[async_trait]
impl CommandHandler for SayCommand {
    fn name(&self) -> &str {
        "say"
    }

    async fn handle(&self, _env: &Env<'_>, invocation: &Invocation<'_>) -> HandlerResult {
        if invocation.args.trim().is_empty() {
            return usage(invocation, "<text>").await;
        }
        invocation.channel.send_message(invocation.args).await?;
        Ok(())
    }
}

/// Lists the triggers the caller is allowed to use.
pub struct HelpCommand;

impl HelpCommand {
    pub fn from_args(args: &toml::Table) -> Result<Self, LoadError> {
        let NoArgs {} = parse_args("help", args)?;
        Ok(Self)
    }
}

#[async_trait]
impl CommandHandler for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    async fn handle(&self, env: &Env<'_>, invocation: &Invocation<'_>) -> HandlerResult {
        let triggers = env.bindings.triggers_for(invocation.client);
        let reply = if triggers.is_empty() {
            "No commands available.".to_string()
        } else {
            format!("Commands: {}", triggers.join(", "))
        };
        invocation.channel.send_message(&reply).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{Client, FlagSet, HostmaskFlags, RequiredFlag};
    use crate::handlers::testing;
    use crate::registry::{Bindings, BotSettings, RouteOutcome};
    use chrono::Utc;
    use std::sync::Arc;

    fn bindings() -> Bindings {
        let mut flags = HostmaskFlags::new();
        flags.grant("admin!*@*", FlagSet::from_chars("n")).unwrap();
        let mut bindings = Bindings::new(Arc::new(flags), BotSettings::default());
        let empty = toml::Table::new();
        bindings
            .commands
            .bind("!rehash", RequiredFlag::Flag('n'), Arc::new(RehashCommand::from_args(&empty).unwrap()))
            .unwrap();
        bindings
            .commands
            .bind("@raw", RequiredFlag::None, Arc::new(RawCommand::from_args(&empty).unwrap()))
            .unwrap();
        bindings
            .commands
            .bind("@eval", RequiredFlag::None, Arc::new(EvalCommand))
            .unwrap();
        bindings
            .commands
            .bind("@help", RequiredFlag::None, Arc::new(HelpCommand))
            .unwrap();
        bindings
    }

    async fn route(client: &Client, text: &str) -> (RouteOutcome, Vec<String>) {
        let (parser, mut rx) = testing::parser();
        let services = testing::services();
        let outcome = bindings()
            .route(&parser, &services, Utc::now(), "#bots", client, text)
            .await;
        (outcome, testing::drain(&mut rx))
    }

    #[tokio::test]
    async fn test_raw_sends_one_raw_line() {
        let (outcome, lines) = route(&Client::new("joe", "u", "h"), "@raw PRIVMSG #x :hi").await;
        assert!(matches!(outcome, RouteOutcome::Invoked));
        assert_eq!(
            lines,
            ["PRIVMSG #bots :Sent raw: PRIVMSG #x :hi", "PRIVMSG #x :hi"]
        );
    }

    #[tokio::test]
    async fn test_raw_refuses_overlong_line_without_ack() {
        let text = format!("@raw PRIVMSG #x :{}", "y".repeat(600));
        let (outcome, lines) = route(&Client::new("joe", "u", "h"), &text).await;
        assert!(matches!(outcome, RouteOutcome::Invoked));
        assert_eq!(
            lines,
            ["PRIVMSG #bots :Not sent: line too long: 614 bytes (limit 512)"]
        );
    }

    #[tokio::test]
    async fn test_raw_without_args_is_usage() {
        let (_, lines) = route(&Client::new("joe", "u", "h"), "@raw").await;
        assert_eq!(lines, ["PRIVMSG #bots :Usage: @raw <line>"]);
    }

    #[tokio::test]
    async fn test_eval_replies_once() {
        let joe = Client::new("joe", "u", "h");
        let (_, lines) = route(&joe, "@eval 1+2").await;
        assert_eq!(lines, ["PRIVMSG #bots :Result: 3"]);

        let (_, lines) = route(&joe, "@eval 1/0").await;
        assert_eq!(lines, ["PRIVMSG #bots :Error: division by zero"]);
    }

    #[tokio::test]
    async fn test_rehash_reports_failure() {
        let (outcome, lines) = route(&Client::new("admin", "u", "h"), "!rehash").await;
        assert!(matches!(outcome, RouteOutcome::Invoked));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "PRIVMSG #bots Reloading...");
        assert!(lines[1].starts_with("PRIVMSG #bots :Rehash failed: "));
    }

    #[tokio::test]
    async fn test_unauthorized_rehash_is_silent() {
        let (outcome, lines) = route(&Client::new("joe", "u", "h"), "!rehash").await;
        assert!(matches!(outcome, RouteOutcome::Unauthorized));
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_help_lists_authorized_triggers() {
        let (_, lines) = route(&Client::new("joe", "u", "h"), "@help").await;
        assert_eq!(lines, ["PRIVMSG #bots :Commands: @eval, @help, @raw"]);

        let (_, lines) = route(&Client::new("admin", "u", "h"), "@help").await;
        assert_eq!(lines, ["PRIVMSG #bots :Commands: !rehash, @eval, @help, @raw"]);
    }
}
