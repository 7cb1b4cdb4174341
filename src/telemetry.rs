//! Telemetry utilities for command timing and span construction.

use std::time::Instant;

/// Guard for timing command execution and recording metrics.
///
/// Records command latency when dropped, so early returns and failures are
/// counted too.
pub struct CommandTimer {
    trigger: String,
    start: Instant,
}

impl CommandTimer {
    /// Start timing a command.
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_command(&self.trigger, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, debug_span, info_span};

    /// Span covering one server connection.
    pub fn session(host: &str, port: u16) -> Span {
        info_span!("session", host = %host, port = port)
    }

    /// Span covering one event dispatch.
    pub fn event(name: &str, generation: u64) -> Span {
        debug_span!("event", name = %name, generation = generation)
    }

    /// Span covering one routed command.
    pub fn command(trigger: &str, source: &str, channel: &str) -> Span {
        info_span!("command", trigger = %trigger, source = %source, channel = %channel)
    }

    /// Span covering one rehash attempt.
    pub fn rehash(source: &str) -> Span {
        info_span!("rehash", source = %source)
    }
}
