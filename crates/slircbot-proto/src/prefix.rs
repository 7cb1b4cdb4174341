//! IRC message prefix types.
//!
//! A prefix identifies the origin of a message: either a server name or a
//! user's `nick!user@host` mask.

use std::fmt;

/// IRC message prefix - identifies the origin of a message.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Prefix {
    /// Server name (e.g., "irc.example.com")
    ServerName(String),
    /// User prefix: (nickname, username, hostname)
    Nickname(String, String, String),
}

impl Prefix {
    /// Parse a prefix string into a Prefix.
    ///
    /// Lenient: components are not validated. A dot before any `!` or `@`
    /// marks the prefix as a server name.
    pub fn new_from_str(s: &str) -> Self {
        let (name, rest) = match s.find(['!', '@']) {
            Some(idx) => (&s[..idx], Some(&s[idx..])),
            None => (s, None),
        };

        let Some(rest) = rest else {
            if name.contains('.') {
                return Prefix::ServerName(name.to_owned());
            }
            return Prefix::Nickname(name.to_owned(), String::new(), String::new());
        };

        let (user, host) = match rest.strip_prefix('!') {
            Some(after_bang) => match after_bang.split_once('@') {
                Some((user, host)) => (user, host),
                None => (after_bang, ""),
            },
            None => ("", rest.trim_start_matches('@')),
        };

        Prefix::Nickname(name.to_owned(), user.to_owned(), host.to_owned())
    }

    /// Create a new user prefix from nick, user, and host components.
    pub fn new(nick: impl Into<String>, user: impl Into<String>, host: impl Into<String>) -> Self {
        Prefix::Nickname(nick.into(), user.into(), host.into())
    }

    /// Get the nickname if this is a user prefix.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(nick, _, _) if !nick.is_empty() => Some(nick),
            _ => None,
        }
    }

    /// Get the username if this is a user prefix.
    pub fn user(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(_, user, _) if !user.is_empty() => Some(user),
            _ => None,
        }
    }

    /// Get the hostname (the server name for server prefixes).
    pub fn host(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(_, _, host) if !host.is_empty() => Some(host),
            Prefix::ServerName(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => f.write_str(name),
            Prefix::Nickname(nick, user, host) => {
                f.write_str(nick)?;
                if !user.is_empty() {
                    write!(f, "!{user}")?;
                }
                if !host.is_empty() {
                    write!(f, "@{host}")?;
                }
                Ok(())
            }
        }
    }
}
