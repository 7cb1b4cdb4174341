//! Handler traits and the context they run in.
//!
//! Handlers are typed trait objects resolved by name from the
//! [`HandlerCatalog`] when a configuration is loaded. Event handlers see
//! every [`Event`] of the kind they are bound to; command handlers see one
//! authorized [`Invocation`] of their trigger.
//!
//! Every call goes through [`run_guarded`], which turns panics and budget
//! overruns into [`HandlerError`]s so that one bad handler never takes the
//! session down.

mod catalog;
mod commands;
mod events;

pub use catalog::{CommandFactory, EventFactory, HandlerCatalog};
pub use commands::{EvalCommand, HelpCommand, RawCommand, RehashCommand, SayCommand};
pub use events::{EchoHandler, JoinHandler, LogHandler};

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;

use crate::error::{HandlerError, HandlerResult, RehashError};
use crate::eval::Evaluator;
use crate::flags::Client;
use crate::registry::{Bindings, Event};
use crate::rehash::RehashReport;
use crate::session::{Channel, ParserHandle};

/// Everything a handler may touch while it runs.
pub struct Env<'a> {
    /// Connection-scoped outbound capability.
    pub parser: &'a ParserHandle,
    /// Server time of the line (the `time` tag), or arrival time.
    pub timestamp: DateTime<Utc>,
    pub services: &'a Services,
    /// The snapshot this line is being processed against.
    pub bindings: &'a Bindings,
}

/// One authorized command call.
pub struct Invocation<'a> {
    /// Where the command was issued; replies go here.
    pub channel: Channel,
    pub client: &'a Client,
    /// The trigger as typed, prefix included.
    pub trigger: &'a str,
    /// Text after the first space, or empty.
    pub args: &'a str,
}

/// Handler bound to one or more events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs, metrics and `unbind`.
    fn name(&self) -> &str;

    async fn handle(&self, env: &Env<'_>, event: &Event) -> HandlerResult;
}

/// Handler bound to a command trigger.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    async fn handle(&self, env: &Env<'_>, invocation: &Invocation<'_>) -> HandlerResult;
}

/// Something that can reload the bindings.
#[async_trait]
pub trait Rehasher: Send + Sync {
    async fn rehash(&self) -> Result<RehashReport, RehashError>;
}

/// Process-wide services reachable from handlers.
#[derive(Clone)]
pub struct Services {
    pub rehasher: Arc<dyn Rehasher>,
    pub evaluator: Arc<dyn Evaluator>,
}

impl Services {
    pub fn new(rehasher: Arc<dyn Rehasher>, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            rehasher,
            evaluator,
        }
    }
}

/// Run a handler future within `budget`, catching panics.
pub(crate) async fn run_guarded<F>(budget: Duration, call: F) -> HandlerResult
where
    F: Future<Output = HandlerResult>,
{
    match tokio::time::timeout(budget, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(payload)) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
        Err(_elapsed) => Err(HandlerError::TimedOut(budget)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_guarded_passes_result_through() {
        let ok = run_guarded(Duration::from_secs(1), async { Ok(()) }).await;
        assert!(ok.is_ok());

        let failed = run_guarded(Duration::from_secs(1), async {
            Err(HandlerError::Failed("nope".into()))
        })
        .await;
        assert_eq!(failed.unwrap_err().error_code(), "failed");
    }

    async fn explode() -> HandlerResult {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_run_guarded_catches_panic() {
        let result = run_guarded(Duration::from_secs(1), explode()).await;
        match result {
            Err(HandlerError::Panicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_guarded_enforces_budget() {
        let result = run_guarded(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(HandlerError::TimedOut(_))));
    }
}
