//! Name-to-handler catalog used when turning configuration into bindings.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::commands::{EvalCommand, HelpCommand, RawCommand, RehashCommand, SayCommand};
use super::events::{EchoHandler, JoinHandler, LogHandler};
use super::{CommandHandler, EventHandler};
use crate::config::Config;
use crate::error::LoadError;
use crate::flags::{HostmaskFlags, RequiredFlag};
use crate::registry::{Bindings, BotSettings};

/// Builds an event handler from its `args` table.
pub type EventFactory =
    Box<dyn Fn(&toml::Table) -> Result<Arc<dyn EventHandler>, LoadError> + Send + Sync>;

/// Builds a command handler from its `args` table.
pub type CommandFactory =
    Box<dyn Fn(&toml::Table) -> Result<Arc<dyn CommandHandler>, LoadError> + Send + Sync>;

/// Deserialize a handler's `args` table into its typed arguments.
pub(crate) fn parse_args<T: DeserializeOwned>(handler: &str, args: &toml::Table) -> Result<T, LoadError> {
    toml::Value::Table(args.clone())
        .try_into()
        .map_err(|e: toml::de::Error| LoadError::InvalidArgs {
            handler: handler.to_string(),
            reason: e.message().to_string(),
        })
}

/// Handler factories by name.
///
/// The catalog is fixed at startup; configuration can only refer to names
/// registered here.
pub struct HandlerCatalog {
    events: HashMap<String, EventFactory>,
    commands: HashMap<String, CommandFactory>,
}

impl Default for HandlerCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl HandlerCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            events: HashMap::new(),
            commands: HashMap::new(),
        }
    }

    /// A catalog with the built-in handlers registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::empty();

        catalog.register_event("log", |args| Ok(Arc::new(LogHandler::from_args(args)?)));
        catalog.register_event("join", |args| Ok(Arc::new(JoinHandler::from_args(args)?)));
        catalog.register_event("echo", |args| Ok(Arc::new(EchoHandler::from_args(args)?)));

        catalog.register_command("rehash", |args| Ok(Arc::new(RehashCommand::from_args(args)?)));
        catalog.register_command("raw", |args| Ok(Arc::new(RawCommand::from_args(args)?)));
        catalog.register_command("eval", |args| Ok(Arc::new(EvalCommand::from_args(args)?)));
        catalog.register_command("say", |args| Ok(Arc::new(SayCommand::from_args(args)?)));
        catalog.register_command("help", |args| Ok(Arc::new(HelpCommand::from_args(args)?)));

        catalog
    }

    /// Register (or replace) an event handler factory.
    pub fn register_event<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&toml::Table) -> Result<Arc<dyn EventHandler>, LoadError> + Send + Sync + 'static,
    {
        self.events.insert(name.to_string(), Box::new(factory));
    }

    /// Register (or replace) a command handler factory.
    pub fn register_command<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&toml::Table) -> Result<Arc<dyn CommandHandler>, LoadError> + Send + Sync + 'static,
    {
        self.commands.insert(name.to_string(), Box::new(factory));
    }

    pub fn event_handler(&self, name: &str, args: &toml::Table) -> Result<Arc<dyn EventHandler>, LoadError> {
        let factory = self
            .events
            .get(name)
            .ok_or_else(|| LoadError::UnknownEventHandler(name.to_string()))?;
        factory(args)
    }

    pub fn command_handler(&self, name: &str, args: &toml::Table) -> Result<Arc<dyn CommandHandler>, LoadError> {
        let factory = self
            .commands
            .get(name)
            .ok_or_else(|| LoadError::UnknownCommandHandler(name.to_string()))?;
        factory(args)
    }

    /// Build a complete snapshot from `config`.
    ///
    /// Either every block binds or nothing is returned; the caller never
    /// sees a partially built table.
    pub fn build(&self, config: &Config) -> Result<Bindings, LoadError> {
        let flags = HostmaskFlags::from_blocks(&config.users)?;
        let mut bindings = Bindings::new(Arc::new(flags), BotSettings::from_config(config));

        for (index, block) in config.events.iter().enumerate() {
            let handler = self.event_handler(&block.handler, &block.args)?;
            bindings
                .events
                .bind(&block.name, handler)
                .map_err(|source| LoadError::EventBind { index, source })?;
        }

        for (index, block) in config.commands.iter().enumerate() {
            let flag: RequiredFlag = block
                .flag
                .parse()
                .map_err(|source| LoadError::CommandBind { index, source })?;
            let handler = self.command_handler(&block.handler, &block.args)?;
            let replaced = bindings
                .commands
                .bind(&block.trigger, flag, handler)
                .map_err(|source| LoadError::CommandBind { index, source })?;
            if replaced.is_some() {
                tracing::debug!(trigger = %block.trigger, "Trigger bound twice; later block wins");
            }
        }

        Ok(bindings)
    }
}
