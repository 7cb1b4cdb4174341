//! The live IRC session: connection lifecycle, line classification and the
//! outbound path handlers write to.

mod backoff;
mod classify;
mod controller;
mod outbound;
mod state;

pub use backoff::Backoff;
pub use classify::{ERR_NICKNAMEINUSE, ERR_NOMOTD, RPL_ENDOFMOTD, classify};
pub use controller::Session;
pub use outbound::{Channel, MAX_TEXT_CHUNK, Outbound, ParserHandle, raw_line, run_writer, split_text};
pub use state::SessionState;
