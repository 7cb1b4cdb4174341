//! Configuration validation.
//!
//! Validates configuration after parsing to catch common errors early.
//! Trigger and event names are checked later, at bind time.

use super::Config;
use slircbot_proto::is_channel_name;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.host is required")]
    MissingHost,
    #[error("server.port must not be 0")]
    InvalidPort,
    #[error("invalid nickname {0:?}")]
    InvalidNickname(String),
    #[error("server.autojoin entry {0:?} is not a channel name")]
    InvalidAutojoin(String),
    #[error("bot.handler_budget_ms must be greater than 0")]
    ZeroHandlerBudget,
    #[error("bot.send_queue must be greater than 0")]
    ZeroSendQueue,
    #[error("bot.reconnect_delay_secs ({0}) exceeds bot.max_reconnect_delay_secs ({1})")]
    ReconnectDelayOrder(u64, u64),
    #[error("[[user]] #{0}: mask is required")]
    EmptyUserMask(usize),
    #[error("[[user]] #{0}: flags may not contain whitespace or '-'")]
    InvalidUserFlags(usize),
}

/// A nickname may not be empty, start with a digit or '-', or contain
/// characters with protocol meaning.
fn is_valid_nickname(nick: &str) -> bool {
    let Some(first) = nick.chars().next() else {
        return false;
    };
    !first.is_ascii_digit()
        && first != '-'
        && !nick
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ',' | '!' | '@' | ':' | '#' | '*' | '?'))
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.host.trim().is_empty() {
        errors.push(ValidationError::MissingHost);
    }
    if server.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    for nick in [server.nickname.as_str(), server.altnickname()] {
        if !is_valid_nickname(nick) {
            errors.push(ValidationError::InvalidNickname(nick.to_string()));
        }
    }
    for channel in &server.autojoin {
        if !is_channel_name(channel) || channel.contains([' ', ',']) {
            errors.push(ValidationError::InvalidAutojoin(channel.clone()));
        }
    }

    let bot = &config.bot;
    if bot.handler_budget_ms == 0 {
        errors.push(ValidationError::ZeroHandlerBudget);
    }
    if bot.send_queue == 0 {
        errors.push(ValidationError::ZeroSendQueue);
    }
    if bot.reconnect_delay_secs > bot.max_reconnect_delay_secs {
        errors.push(ValidationError::ReconnectDelayOrder(
            bot.reconnect_delay_secs,
            bot.max_reconnect_delay_secs,
        ));
    }

    for (index, user) in config.users.iter().enumerate() {
        if user.mask.trim().is_empty() {
            errors.push(ValidationError::EmptyUserMask(index));
        }
        if user.flags.chars().any(|c| c.is_whitespace() || c == '-') {
            errors.push(ValidationError::InvalidUserFlags(index));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
