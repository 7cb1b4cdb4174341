//! # slircbot-proto
//!
//! The wire-facing half of slircbot: a tokio line codec and a small IRC
//! message model (tags, prefix, command, parameters), plus CTCP detection
//! and RFC 1459 case mapping.
//!
//! ```rust
//! use slircbot_proto::{Message, Prefix};
//!
//! let msg: Message = ":nick!user@host PRIVMSG #rust :hello".parse().unwrap();
//! assert_eq!(msg.source_nickname(), Some("nick"));
//!
//! let reply = Message::privmsg("#rust", "hi there");
//! assert_eq!(reply.to_string(), "PRIVMSG #rust :hi there");
//! # let _ = Prefix::new("a", "b", "c");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod ctcp;
pub mod error;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod prefix;

pub use self::casemap::{irc_eq, irc_to_lower, is_channel_name};
pub use self::ctcp::{Ctcp, CtcpKind};
pub use self::error::{MessageParseError, ProtocolError};
#[cfg(feature = "tokio")]
pub use self::line::{LineCodec, MAX_LINE_LEN, MAX_TAGGED_LINE_LEN};
pub use self::message::{Message, Tag};
pub use self::prefix::Prefix;
