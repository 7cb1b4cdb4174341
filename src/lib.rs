//! slircbot: the event and command dispatch core of an IRC bot host.
//!
//! Handlers are bound to protocol events and chat command triggers by
//! configuration. A [`session::Session`] keeps the IRC connection alive,
//! classifies each line into [`registry::Event`]s, dispatches them, and
//! routes channel messages through the command table with a flag check.
//! The whole binding table can be rebuilt and swapped at runtime with
//! [`rehash::RehashCoordinator`] without dropping the connection.

pub mod bot;
pub mod config;
pub mod error;
pub mod eval;
pub mod flags;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod rehash;
pub mod session;
pub mod telemetry;

pub use bot::Bot;
