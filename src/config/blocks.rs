//! Binding and authorization blocks.
//!
//! These are the tuples the loader hands to the registries: who holds which
//! flags, which handlers listen to which events, and which triggers map to
//! which command handlers.

use super::defaults::default_flag;
use serde::Deserialize;

/// Grants flags to every client whose `nick!user@host` matches `mask`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserBlock {
    /// Hostmask glob, e.g. `*!*@admin.example.net`.
    pub mask: String,
    /// Flag characters granted, e.g. `"nre"`.
    #[serde(default)]
    pub flags: String,
}

/// Binds a catalog event handler to an event name.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBlock {
    /// Event name, e.g. `onServerReady`.
    pub name: String,
    /// Catalog handler name, e.g. `log`.
    pub handler: String,
    /// Handler-specific arguments.
    #[serde(default)]
    pub args: toml::Table,
}

/// Binds a catalog command handler to a trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandBlock {
    /// Trigger including its prefix character, e.g. `!rehash`.
    pub trigger: String,
    /// Required flag: a single character, or `-` for none.
    #[serde(default = "default_flag")]
    pub flag: String,
    /// Catalog handler name, e.g. `rehash`.
    pub handler: String,
    /// Handler-specific arguments.
    #[serde(default)]
    pub args: toml::Table,
}
