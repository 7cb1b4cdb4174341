//! Bindings: the event table, the command table and the flag source that
//! together decide what happens for each incoming line.
//!
//! A [`Bindings`] value is an immutable snapshot. [`LiveBindings`] holds the
//! current snapshot behind an `RwLock<Arc<_>>`: readers clone the `Arc` and
//! drop the lock at once, writers build a new snapshot off to the side and
//! swap the pointer. A line is processed entirely against the snapshot that
//! was current when it arrived.

mod commands;
mod events;

pub use commands::{CommandBinding, CommandRouter, split_trigger, validate_trigger};
pub use events::{DispatchReport, Event, EventBinding, EventKind, EventRegistry, validate_event_name};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{Instrument, debug, info, warn};

use crate::config::{BotConfig, Config};
use crate::error::{BindError, HandlerError};
use crate::flags::{Client, FlagSource, NoFlags, RequiredFlag, has_flag};
use crate::handlers::{CommandHandler, Env, EventHandler, Invocation, Services, run_guarded};
use crate::session::ParserHandle;
use crate::telemetry::{CommandTimer, spans};

/// Dispatch policy carried with each snapshot, so a rehash can change it.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Execution budget for a single handler call.
    pub handler_budget: Duration,
    /// NOTICE the client when a command is denied.
    pub deny_notice: bool,
    /// Channels joined when the server becomes ready.
    pub autojoin: Vec<String>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            handler_budget: Duration::from_millis(BotConfig::default().handler_budget_ms),
            deny_notice: false,
            autojoin: Vec::new(),
        }
    }
}

impl BotSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            handler_budget: config.handler_budget(),
            deny_notice: config.bot.deny_notice,
            autojoin: config.server.autojoin.clone(),
        }
    }
}

/// What happened to a chat line offered to the command router.
#[derive(Debug)]
pub enum RouteOutcome {
    /// The first token is not a bound trigger.
    NoMatch,
    /// The client lacks the required flag; the handler did not run.
    Unauthorized,
    /// The handler ran and succeeded.
    Invoked,
    /// The handler ran and failed.
    Failed(HandlerError),
}

impl RouteOutcome {
    pub fn is_invoked(&self) -> bool {
        matches!(self, Self::Invoked | Self::Failed(_))
    }
}

/// One immutable generation of the bot's bindings.
#[derive(Debug, Clone)]
pub struct Bindings {
    generation: u64,
    pub events: EventRegistry,
    pub commands: CommandRouter,
    pub flags: Arc<dyn FlagSource>,
    pub settings: BotSettings,
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new(Arc::new(NoFlags), BotSettings::default())
    }
}

impl Bindings {
    pub fn new(flags: Arc<dyn FlagSource>, settings: BotSettings) -> Self {
        Self {
            generation: 0,
            events: EventRegistry::new(),
            commands: CommandRouter::new(),
            flags,
            settings,
        }
    }

    /// Incremented by every swap into [`LiveBindings`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_flag(&self, client: &Client, flag: RequiredFlag) -> bool {
        has_flag(self.flags.as_ref(), client, flag)
    }

    /// Triggers `client` is allowed to invoke, sorted.
    pub fn triggers_for(&self, client: &Client) -> Vec<&str> {
        self.commands.triggers_for(self.flags.as_ref(), client)
    }

    /// Dispatch `event` to every handler bound to its name.
    pub async fn dispatch(
        &self,
        parser: &ParserHandle,
        services: &Services,
        timestamp: DateTime<Utc>,
        event: &Event,
    ) -> DispatchReport {
        let env = Env {
            parser,
            timestamp,
            services,
            bindings: self,
        };
        let span = spans::event(event.name(), self.generation);
        self.events
            .dispatch(&env, event, self.settings.handler_budget)
            .instrument(span)
            .await
    }

    /// Route a channel line through the command table.
    ///
    /// Unauthorized attempts are written to the `audit` log target and
    /// never reach the handler. The channel hears nothing about a denial
    /// unless `deny_notice` is set, in which case the client gets a NOTICE.
    pub async fn route(
        &self,
        parser: &ParserHandle,
        services: &Services,
        timestamp: DateTime<Utc>,
        channel: &str,
        client: &Client,
        text: &str,
    ) -> RouteOutcome {
        let (trigger, args) = split_trigger(text);
        let Some(binding) = self.commands.lookup(trigger) else {
            return RouteOutcome::NoMatch;
        };

        let span = spans::command(trigger, &client.nick, channel);
        async {
            let flag = binding.flag();
            if !self.has_flag(client, flag) {
                warn!(target: "audit", client = %client, trigger, channel, required = %flag, "Command denied");
                crate::metrics::record_denied(trigger);
                if self.settings.deny_notice {
                    let notice = format!("Permission denied: {trigger} requires flag '{flag}'");
                    if let Err(e) = parser.send_notice(&client.nick, &notice).await {
                        debug!(error = %e, "Failed to send denial notice");
                    }
                }
                return RouteOutcome::Unauthorized;
            }
            if flag != RequiredFlag::None {
                info!(target: "audit", client = %client, trigger, channel, "Privileged command invoked");
            }

            let env = Env {
                parser,
                timestamp,
                services,
                bindings: self,
            };
            let invocation = Invocation {
                channel: parser.channel(channel),
                client,
                trigger,
                args,
            };
            let handler = binding.handler();
            let _timer = CommandTimer::new(trigger);
            match run_guarded(self.settings.handler_budget, handler.handle(&env, &invocation)).await {
                Ok(()) => RouteOutcome::Invoked,
                Err(e) => {
                    warn!(handler = handler.name(), error = %e, "Command handler failed");
                    crate::metrics::record_handler_error(handler.name(), e.error_code());
                    RouteOutcome::Failed(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// The live bindings table shared by the session and the rehash path.
#[derive(Debug)]
pub struct LiveBindings {
    current: RwLock<Arc<Bindings>>,
    writer: Mutex<()>,
}

impl LiveBindings {
    /// Install `initial` as generation 1.
    pub fn new(mut initial: Bindings) -> Self {
        initial.generation = 1;
        crate::metrics::set_generation(1);
        Self {
            current: RwLock::new(Arc::new(initial)),
            writer: Mutex::new(()),
        }
    }

    /// The current snapshot. The lock is released before this returns.
    pub fn load(&self) -> Arc<Bindings> {
        Arc::clone(&self.current.read())
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Swap in a wholly new snapshot and return its generation.
    pub fn replace(&self, mut next: Bindings) -> u64 {
        let _writer = self.writer.lock();
        next.generation = self.generation() + 1;
        let generation = next.generation;
        *self.current.write() = Arc::new(next);
        crate::metrics::set_generation(generation);
        generation
    }

    /// Copy the current snapshot, apply `edit`, and swap the copy in.
    /// Nothing changes if `edit` fails.
    fn update<T>(
        &self,
        edit: impl FnOnce(&mut Bindings) -> Result<T, BindError>,
    ) -> Result<T, BindError> {
        let _writer = self.writer.lock();
        let mut next = Bindings::clone(&self.load());
        let out = edit(&mut next)?;
        next.generation += 1;
        let generation = next.generation;
        *self.current.write() = Arc::new(next);
        crate::metrics::set_generation(generation);
        Ok(out)
    }

    pub fn bind_event(&self, name: &str, handler: Arc<dyn EventHandler>) -> Result<(), BindError> {
        self.update(|b| b.events.bind(name, handler))
    }

    pub fn unbind_event(&self, name: &str, handler_name: &str) -> Result<usize, BindError> {
        self.update(|b| b.events.unbind(name, handler_name))
    }

    pub fn bind_command(
        &self,
        trigger: &str,
        flag: RequiredFlag,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Option<CommandBinding>, BindError> {
        self.update(|b| b.commands.bind(trigger, flag, handler))
    }

    pub fn unbind_command(&self, trigger: &str) -> Option<CommandBinding> {
        self.update(|b| Ok(b.commands.unbind(trigger))).unwrap_or_default()
    }
}
