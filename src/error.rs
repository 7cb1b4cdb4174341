//! Unified error handling for slircbot.
//!
//! This module provides the error hierarchy for the dispatch core, with
//! static error codes for metric labels. Nothing in here is allowed to take
//! the session down: dispatch and routing log and count these, then move on.

use crate::config::ConfigError;
use slircbot_proto::ProtocolError;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Bind Errors (registry mutation)
// ============================================================================

/// A binding was rejected at bind time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("event name must not be empty")]
    EmptyEventName,

    #[error("malformed event name {0:?}: whitespace and control characters are not allowed")]
    MalformedEventName(String),

    #[error("trigger must not be empty")]
    EmptyTrigger,

    #[error("malformed trigger {0:?}: whitespace and control characters are not allowed")]
    MalformedTrigger(String),

    #[error("trigger {0:?} must start with a prefix character such as '!' or '@'")]
    MissingPrefix(String),

    #[error("trigger {0:?} has a prefix but no command name")]
    BarePrefix(String),

    #[error("invalid flag {0:?}: expected a single character or '-'")]
    InvalidFlag(String),
}

impl BindError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyEventName => "empty_event_name",
            Self::MalformedEventName(_) => "malformed_event_name",
            Self::EmptyTrigger => "empty_trigger",
            Self::MalformedTrigger(_) => "malformed_trigger",
            Self::MissingPrefix(_) => "missing_prefix",
            Self::BarePrefix(_) => "bare_prefix",
            Self::InvalidFlag(_) => "invalid_flag",
        }
    }
}

// ============================================================================
// Handler Errors (event and command processing)
// ============================================================================

/// Errors that can occur while a bound handler runs.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("handler exceeded its {0:?} budget")]
    TimedOut(Duration),

    #[error("send error: {0}")]
    Send(#[from] SendError),
}

impl HandlerError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Failed(_) => "failed",
            Self::Panicked(_) => "panicked",
            Self::TimedOut(_) => "timed_out",
            Self::Send(_) => "send_error",
        }
    }
}

/// Result type for event and command handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Failure to queue an outbound line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("send queue full: connection not draining")]
    Overflow,

    #[error("line too long: {len} bytes (limit {limit})")]
    LineTooLong { len: usize, limit: usize },

    #[error("line contains a NUL byte")]
    IllegalNul,
}

// ============================================================================
// Load and Rehash Errors
// ============================================================================

/// Errors raised while turning configuration into a bindings snapshot.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("[[event]] #{index}: {source}")]
    EventBind { index: usize, source: BindError },

    #[error("[[command]] #{index}: {source}")]
    CommandBind { index: usize, source: BindError },

    #[error("unknown event handler {0:?}")]
    UnknownEventHandler(String),

    #[error("unknown command handler {0:?}")]
    UnknownCommandHandler(String),

    #[error("handler {handler:?}: {reason}")]
    InvalidArgs { handler: String, reason: String },

    #[error("[[user]] #{index}: invalid mask {mask:?}: {reason}")]
    InvalidMask {
        index: usize,
        mask: String,
        reason: String,
    },
}

/// A rehash could not be applied. The previously active bindings remain live.
#[derive(Debug, Error)]
pub enum RehashError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build bindings: {0}")]
    Load(#[from] LoadError),
}

impl RehashError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Load(_) => "load",
        }
    }
}

// ============================================================================
// Connection Errors (transport)
// ============================================================================

/// Transport-level failures. These end the current connection and hand
/// control to the reconnect policy; bindings survive.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connection closed by server")]
    Closed,

    #[error("no data from server for {0:?} after PING")]
    PingTimeout(Duration),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("writer task failed: {0}")]
    Writer(String),
}

impl ConnectionError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Protocol(_) => "protocol",
            Self::Closed => "closed",
            Self::PingTimeout(_) => "ping_timeout",
            Self::ServerError(_) => "server_error",
            Self::Writer(_) => "writer",
        }
    }
}
