//! Integration test common infrastructure.
//!
//! Provides an in-memory fake IRC server, recording handlers, and helpers
//! for building bindings and environments.

pub mod handlers;
pub mod server;

#[allow(unused_imports)]
pub use handlers::{CallLog, FailingCommand, FailingEvent, PanickingEvent, RecordingCommand, RecordingEvent};
#[allow(unused_imports)]
pub use server::FakeServer;

use std::sync::Arc;

use async_trait::async_trait;
use slircbot::error::RehashError;
use slircbot::eval::ArithmeticEvaluator;
use slircbot::handlers::{Rehasher, Services};
use slircbot::rehash::RehashReport;
use slircbot::session::{Outbound, ParserHandle};
use tokio::sync::mpsc;

/// Rehasher for tests that never reload.
pub struct NoRehash;

#[async_trait]
impl Rehasher for NoRehash {
    async fn rehash(&self) -> Result<RehashReport, RehashError> {
        Err(slircbot::error::LoadError::UnknownCommandHandler("none".into()).into())
    }
}

#[allow(dead_code)]
pub fn services() -> Services {
    Services::new(Arc::new(NoRehash), Arc::new(ArithmeticEvaluator::default()))
}

/// A parser handle whose outbound lines land in the returned receiver.
#[allow(dead_code)]
pub fn parser() -> (ParserHandle, mpsc::Receiver<String>) {
    let (outbound, rx) = Outbound::channel(256);
    (ParserHandle::new(outbound, "testbot"), rx)
}

/// Everything queued so far.
#[allow(dead_code)]
pub fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    lines
}
