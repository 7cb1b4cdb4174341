//! Prometheus metrics collection for slircbot.
//!
//! Metrics live in process-wide `OnceLock`s and are registered once by
//! [`init`]. Recording before `init` is a no-op, which keeps unit tests and
//! embedded use free of global setup.
//!
//! - `bot_lines_total{direction}` - lines read from / written to the server,
//!   and overlong inbound lines skipped (`discarded`)
//! - `bot_events_dispatched_total{event}` - events dispatched by name
//! - `bot_commands_total{trigger}` / `bot_command_duration_seconds{trigger}`
//! - `bot_command_denied_total{trigger}` - authorization denials
//! - `bot_handler_errors_total{handler, error}` - isolated handler failures
//! - `bot_rehash_total{result}` - rehash attempts
//! - `bot_reconnects_total{reason}` - connection losses

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Protocol lines by direction ("in" / "out" / "discarded").
pub static LINES: OnceLock<IntCounterVec> = OnceLock::new();

/// Events dispatched by event name.
pub static EVENTS_DISPATCHED: OnceLock<IntCounterVec> = OnceLock::new();

/// Commands invoked by trigger.
pub static COMMAND_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Commands refused because the client lacked the required flag.
pub static COMMAND_DENIED: OnceLock<IntCounterVec> = OnceLock::new();

/// Handler failures by handler name and error code.
pub static HANDLER_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Rehash attempts by result ("ok" or an error code).
pub static REHASH: OnceLock<IntCounterVec> = OnceLock::new();

/// Connection losses by error code.
pub static RECONNECTS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges and histograms
// ========================================================================

/// Generation of the live bindings snapshot.
pub static BINDINGS_GENERATION: OnceLock<IntGauge> = OnceLock::new();

/// Command handler latency by trigger.
pub static COMMAND_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Call once at startup before the session connects.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(LINES, IntCounterVec::new(Opts::new("bot_lines_total", "Protocol lines by direction"), &["direction"]));
    register!(EVENTS_DISPATCHED, IntCounterVec::new(Opts::new("bot_events_dispatched_total", "Events dispatched by name"), &["event"]));
    register!(COMMAND_COUNTER, IntCounterVec::new(Opts::new("bot_commands_total", "Commands invoked by trigger"), &["trigger"]));
    register!(COMMAND_DENIED, IntCounterVec::new(Opts::new("bot_command_denied_total", "Commands refused for missing flags"), &["trigger"]));
    register!(HANDLER_ERRORS, IntCounterVec::new(Opts::new("bot_handler_errors_total", "Handler failures by handler and kind"), &["handler", "error"]));
    register!(REHASH, IntCounterVec::new(Opts::new("bot_rehash_total", "Rehash attempts by result"), &["result"]));
    register!(RECONNECTS, IntCounterVec::new(Opts::new("bot_reconnects_total", "Connection losses by reason"), &["reason"]));
    register!(BINDINGS_GENERATION, IntGauge::new("bot_bindings_generation", "Generation of the live bindings snapshot"));
    register!(COMMAND_LATENCY, HistogramVec::new(
        HistogramOpts::new("bot_command_duration_seconds", "Command handler latency by trigger")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["trigger"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers
// ============================================================================

fn inc(metric: &OnceLock<IntCounterVec>, labels: &[&str]) {
    if let Some(c) = metric.get() {
        c.with_label_values(labels).inc();
    }
}

/// Record one line read from the server.
#[inline]
pub fn record_line_in() {
    inc(&LINES, &["in"]);
}

/// Record one line queued for the server.
#[inline]
pub fn record_line_out() {
    inc(&LINES, &["out"]);
}

/// Record inbound lines skipped for exceeding the length limit.
#[inline]
pub fn record_lines_discarded(count: usize) {
    if let Some(c) = LINES.get() {
        c.with_label_values(&["discarded"]).inc_by(count as u64);
    }
}

/// Record an event dispatch.
#[inline]
pub fn record_event(event: &str) {
    inc(&EVENTS_DISPATCHED, &[event]);
}

/// Record a command execution with latency.
#[inline]
pub fn record_command(trigger: &str, duration_secs: f64) {
    inc(&COMMAND_COUNTER, &[trigger]);
    if let Some(h) = COMMAND_LATENCY.get() {
        h.with_label_values(&[trigger]).observe(duration_secs);
    }
}

/// Record an authorization denial.
#[inline]
pub fn record_denied(trigger: &str) {
    inc(&COMMAND_DENIED, &[trigger]);
}

/// Record an isolated handler failure.
#[inline]
pub fn record_handler_error(handler: &str, error: &str) {
    inc(&HANDLER_ERRORS, &[handler, error]);
}

/// Record a rehash attempt. `result` is "ok" or an error code.
#[inline]
pub fn record_rehash(result: &str) {
    inc(&REHASH, &[result]);
}

/// Record a lost connection.
#[inline]
pub fn record_reconnect(reason: &str) {
    inc(&RECONNECTS, &[reason]);
}

/// Publish the live bindings generation.
#[inline]
pub fn set_generation(generation: u64) {
    if let Some(g) = BINDINGS_GENERATION.get() {
        g.set(i64::try_from(generation).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();

        record_command("!test", 0.001);
        record_denied("!test");
        record_rehash("ok");

        let output = gather_metrics();
        assert!(output.contains("bot_commands_total"));
        assert!(output.contains("bot_command_denied_total"));
    }
}
