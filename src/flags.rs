//! Client identity and permission flags.
//!
//! A command binding names a single [`RequiredFlag`]; a client holds a
//! [`FlagSet`] resolved from a [`FlagSource`] at check time. The configured
//! source is [`HostmaskFlags`], built from `[[user]]` blocks.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use glob::Pattern;
use slircbot_proto::{Prefix, irc_to_lower};

use crate::config::UserBlock;
use crate::error::{BindError, LoadError};

/// Permission required to invoke a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredFlag {
    /// Anyone may invoke the command. Written `-` in configuration.
    None,
    /// The client must hold this flag.
    Flag(char),
}

impl FromStr for RequiredFlag {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some('-'), None) => Ok(Self::None),
            (Some(c), None) if !c.is_whitespace() && !c.is_control() => Ok(Self::Flag(c)),
            _ => Err(BindError::InvalidFlag(s.to_string())),
        }
    }
}

impl fmt::Display for RequiredFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("-"),
            Self::Flag(c) => write!(f, "{c}"),
        }
    }
}

/// Set of flag characters held by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet(BTreeSet<char>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a flag string such as `"nre"`.
    pub fn from_chars(flags: &str) -> Self {
        flags.chars().collect()
    }

    pub fn contains(&self, flag: char) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add every flag of `other` to this set.
    pub fn merge(&mut self, other: &FlagSet) {
        self.0.extend(other.0.iter().copied());
    }

    /// Whether this set satisfies `required`.
    pub fn satisfies(&self, required: RequiredFlag) -> bool {
        match required {
            RequiredFlag::None => true,
            RequiredFlag::Flag(c) => self.contains(c),
        }
    }
}

impl FromIterator<char> for FlagSet {
    fn from_iter<I: IntoIterator<Item = char>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("-");
        }
        self.0.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

/// The originator of a chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub nick: String,
    pub user: String,
    pub host: String,
}

impl Client {
    pub fn new(nick: impl Into<String>, user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            user: user.into(),
            host: host.into(),
        }
    }

    /// Client identity from a message prefix. Server prefixes are not clients.
    /// Missing user or host parts are left empty.
    pub fn from_prefix(prefix: &Prefix) -> Option<Self> {
        let nick = prefix.nick()?;
        Some(Self::new(
            nick,
            prefix.user().unwrap_or_default(),
            prefix.host().unwrap_or_default(),
        ))
    }

    /// `nick!user@host`
    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.host)
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}@{}", self.nick, self.user, self.host)
    }
}

/// Resolves the flags a client currently holds.
///
/// Implementations must be cheap and side-effect free: they are queried on
/// every routed command, from whichever task is routing.
pub trait FlagSource: Send + Sync + fmt::Debug {
    fn flags_for(&self, client: &Client) -> FlagSet;
}

/// True when `client` satisfies `flag` according to `source`.
///
/// [`RequiredFlag::None`] authorizes without consulting the source.
pub fn has_flag(source: &dyn FlagSource, client: &Client, flag: RequiredFlag) -> bool {
    match flag {
        RequiredFlag::None => true,
        RequiredFlag::Flag(_) => source.flags_for(client).satisfies(flag),
    }
}

/// A source that grants nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFlags;

impl FlagSource for NoFlags {
    fn flags_for(&self, _client: &Client) -> FlagSet {
        FlagSet::new()
    }
}

/// Flags granted by hostmask.
///
/// Masks are glob patterns over `nick!user@host`, compared after RFC 1459
/// lowercasing on both sides. Because `[` and `]` fold to `{` and `}`, masks
/// match bracketed nicknames literally and have no character classes. A
/// client holds the union of the flags of every matching entry.
#[derive(Debug, Clone, Default)]
pub struct HostmaskFlags {
    entries: Vec<(Pattern, FlagSet)>,
}

impl HostmaskFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grant.
    pub fn grant(&mut self, mask: &str, flags: FlagSet) -> Result<(), glob::PatternError> {
        let pattern = Pattern::new(&irc_to_lower(mask))?;
        self.entries.push((pattern, flags));
        Ok(())
    }

    /// Build from configured `[[user]]` blocks.
    pub fn from_blocks(blocks: &[UserBlock]) -> Result<Self, LoadError> {
        let mut store = Self::new();
        for (index, block) in blocks.iter().enumerate() {
            store
                .grant(&block.mask, FlagSet::from_chars(&block.flags))
                .map_err(|e| LoadError::InvalidMask {
                    index,
                    mask: block.mask.clone(),
                    reason: e.msg.to_string(),
                })?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FlagSource for HostmaskFlags {
    fn flags_for(&self, client: &Client) -> FlagSet {
        let identity = irc_to_lower(&client.hostmask());
        let mut flags = FlagSet::new();
        for (pattern, granted) in &self.entries {
            if pattern.matches(&identity) {
                flags.merge(granted);
            }
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Client {
        Client::new("Admin", "root", "admin.example.net")
    }

    #[test]
    fn test_required_flag_parse() {
        assert_eq!("-".parse::<RequiredFlag>().unwrap(), RequiredFlag::None);
        assert_eq!("n".parse::<RequiredFlag>().unwrap(), RequiredFlag::Flag('n'));
        assert!("".parse::<RequiredFlag>().is_err());
        assert!("nr".parse::<RequiredFlag>().is_err());
        assert!(" ".parse::<RequiredFlag>().is_err());
    }

    #[test]
    fn test_none_always_authorizes() {
        assert!(has_flag(&NoFlags, &admin(), RequiredFlag::None));
        assert!(!has_flag(&NoFlags, &admin(), RequiredFlag::Flag('n')));
    }

    #[test]
    fn test_hostmask_union_of_matches() {
        let mut store = HostmaskFlags::new();
        store.grant("*!*@admin.example.net", FlagSet::from_chars("n")).unwrap();
        store.grant("admin!*@*", FlagSet::from_chars("e")).unwrap();
        store.grant("other!*@*", FlagSet::from_chars("x")).unwrap();

        let flags = store.flags_for(&admin());
        assert_eq!(flags.to_string(), "en");
        assert!(has_flag(&store, &admin(), RequiredFlag::Flag('e')));
        assert!(!has_flag(&store, &admin(), RequiredFlag::Flag('x')));
    }

    #[test]
    fn test_hostmask_brackets_match_literally() {
        let mut store = HostmaskFlags::new();
        store.grant("[Bot]!*@*", FlagSet::from_chars("n")).unwrap();
        let client = Client::new("{bot}", "u", "h");
        assert!(store.flags_for(&client).contains('n'));
        let client = Client::new("b", "u", "h");
        assert!(store.flags_for(&client).is_empty());
    }

    #[test]
    fn test_client_from_prefix() {
        let prefix = Prefix::new_from_str("nick!user@host");
        let client = Client::from_prefix(&prefix).unwrap();
        assert_eq!(client.hostmask(), "nick!user@host");
        assert!(Client::from_prefix(&Prefix::new_from_str("irc.example.net")).is_none());
    }
}
