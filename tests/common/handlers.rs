//! Handlers that record what they saw.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use slircbot::error::{HandlerError, HandlerResult};
use slircbot::handlers::{CommandHandler, Env, EventHandler, Invocation};
use slircbot::registry::Event;

/// Shared, ordered record of handler calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

#[allow(dead_code)]
impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Records `"<name>:<event kind>"` for each event.
pub struct RecordingEvent {
    pub name: String,
    pub log: CallLog,
}

#[allow(dead_code)]
impl RecordingEvent {
    pub fn new(name: &str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
        })
    }
}

#[async_trait]
impl EventHandler for RecordingEvent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _env: &Env<'_>, event: &Event) -> HandlerResult {
        self.log.push(format!("{}:{}", self.name, event.name()));
        Ok(())
    }
}

/// Records its name, then fails.
pub struct FailingEvent {
    pub name: String,
    pub log: CallLog,
}

#[allow(dead_code)]
impl FailingEvent {
    pub fn new(name: &str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
        })
    }
}

#[async_trait]
impl EventHandler for FailingEvent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _env: &Env<'_>, _event: &Event) -> HandlerResult {
        self.log.push(self.name.clone());
        Err(HandlerError::Failed("deliberate failure".into()))
    }
}

/// Records its name, then panics.
pub struct PanickingEvent {
    pub name: String,
    pub log: CallLog,
}

#[allow(dead_code)]
impl PanickingEvent {
    pub fn new(name: &str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
        })
    }
}

#[async_trait]
impl EventHandler for PanickingEvent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _env: &Env<'_>, _event: &Event) -> HandlerResult {
        self.log.push(self.name.clone());
        panic!("handler {} exploded", self.name);
    }
}

/// Records `"<name>(<args>)"` for each invocation.
pub struct RecordingCommand {
    pub name: String,
    pub log: CallLog,
}

#[allow(dead_code)]
impl RecordingCommand {
    pub fn new(name: &str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
        })
    }
}

#[async_trait]
impl CommandHandler for RecordingCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _env: &Env<'_>, invocation: &Invocation<'_>) -> HandlerResult {
        self.log.push(format!("{}({})", self.name, invocation.args));
        Ok(())
    }
}

/// Records its name, then fails.
pub struct FailingCommand {
    pub name: String,
    pub log: CallLog,
}

#[allow(dead_code)]
impl FailingCommand {
    pub fn new(name: &str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
        })
    }
}

#[async_trait]
impl CommandHandler for FailingCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _env: &Env<'_>, _invocation: &Invocation<'_>) -> HandlerResult {
        self.log.push(self.name.clone());
        Err(HandlerError::Failed("deliberate failure".into()))
    }
}
