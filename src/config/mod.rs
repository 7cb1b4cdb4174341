//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, BotConfig)
//! - [`blocks`]: Binding and authorization blocks (UserBlock, EventBlock, CommandBlock)
//! - [`defaults`]: serde default functions
//! - [`validation`]: checks run after parsing, collecting every problem found

mod blocks;
mod defaults;
mod types;
pub mod validation;

pub use blocks::{CommandBlock, EventBlock, UserBlock};
pub use types::{BotConfig, Config, ConfigError, ServerConfig};
pub use validation::ValidationError;
