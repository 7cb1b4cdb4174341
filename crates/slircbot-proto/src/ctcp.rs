//! CTCP (Client-to-Client Protocol) message handling.
//!
//! CTCP requests ride inside PRIVMSG/NOTICE text, wrapped in `\x01`.
//!
//! # Reference
//! - CTCP specification: <https://modern.ircdocs.horse/ctcp.html>

use std::fmt;

/// The CTCP delimiter character (`\x01`).
pub const CTCP_DELIM: char = '\x01';

/// CTCP commands the bot host cares about.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CtcpKind {
    /// ACTION - `/me` text.
    Action,
    /// VERSION - client version request.
    Version,
    /// PING - latency probe; the params must be echoed back.
    Ping,
    /// TIME - local time request.
    Time,
    /// Anything else.
    Unknown(String),
}

impl CtcpKind {
    /// Parse a CTCP command name into a `CtcpKind`.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "ACTION" => Self::Action,
            "VERSION" => Self::Version,
            "PING" => Self::Ping,
            "TIME" => Self::Time,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// Canonical uppercase name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Action => "ACTION",
            Self::Version => "VERSION",
            Self::Ping => "PING",
            Self::Time => "TIME",
            Self::Unknown(name) => name,
        }
    }
}

/// A CTCP message borrowed from PRIVMSG/NOTICE text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctcp<'a> {
    /// The CTCP command.
    pub kind: CtcpKind,
    /// Everything after the command name, if present.
    pub params: Option<&'a str>,
}

impl<'a> Ctcp<'a> {
    /// Parse text as CTCP. The trailing delimiter is optional, as some
    /// clients omit it.
    pub fn parse(text: &'a str) -> Option<Self> {
        let inner = text.strip_prefix(CTCP_DELIM)?;
        let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
        if inner.is_empty() {
            return None;
        }
        let (name, params) = match inner.split_once(' ') {
            Some((name, params)) => (name, Some(params)),
            None => (inner, None),
        };
        Some(Self {
            kind: CtcpKind::parse(name),
            params,
        })
    }

    /// Build a CTCP body (e.g. for a NOTICE reply).
    pub fn new(kind: CtcpKind, params: Option<&'a str>) -> Self {
        Self { kind, params }
    }
}

impl fmt::Display for Ctcp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CTCP_DELIM}{}", self.kind.as_str())?;
        if let Some(params) = self.params {
            write!(f, " {params}")?;
        }
        write!(f, "{CTCP_DELIM}")
    }
}
