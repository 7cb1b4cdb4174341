//! IRC message model with parsing and serialization.
//!
//! # Reference
//! - RFC 2812 Section 2.3: Messages
//! - IRCv3 message-tags

use std::fmt;
use std::str::FromStr;

use crate::error::MessageParseError;
use crate::prefix::Prefix;

/// Maximum number of parameters permitted by RFC 2812.
pub const MAX_PARAMS: usize = 15;

/// An IRCv3 message tag: key and optional (unescaped) value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tag(pub String, pub Option<String>);

/// A parsed IRC message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// IRCv3 message tags, if any were present.
    pub tags: Option<Vec<Tag>>,
    /// Message origin.
    pub prefix: Option<Prefix>,
    /// Command name, uppercased, or a three digit numeric.
    pub command: String,
    /// Command parameters, trailing parameter included as the last element.
    pub params: Vec<String>,
}

impl Message {
    /// Build a message from a command and its parameters.
    pub fn new<C, I, P>(command: C, params: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            tags: None,
            prefix: None,
            command: command.into().to_ascii_uppercase(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach a prefix.
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// `PRIVMSG <target> :<text>`
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new("PRIVMSG", [target.into(), text.into()])
    }

    /// `NOTICE <target> :<text>`
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new("NOTICE", [target.into(), text.into()])
    }

    /// `JOIN <channel>`
    pub fn join(channel: impl Into<String>) -> Self {
        Self::new("JOIN", [channel.into()])
    }

    /// `PART <channel> [:<reason>]`
    pub fn part(channel: impl Into<String>, reason: Option<&str>) -> Self {
        let mut params = vec![channel.into()];
        params.extend(reason.map(str::to_owned));
        Self::new("PART", params)
    }

    /// `NICK <nickname>`
    pub fn nick(nickname: impl Into<String>) -> Self {
        Self::new("NICK", [nickname.into()])
    }

    /// `USER <username> 0 * :<realname>`
    pub fn user(username: impl Into<String>, realname: impl Into<String>) -> Self {
        Self::new(
            "USER",
            [username.into(), "0".into(), "*".into(), realname.into()],
        )
    }

    /// `PASS <password>`
    pub fn pass(password: impl Into<String>) -> Self {
        Self::new("PASS", [password.into()])
    }

    /// `PING :<token>`
    pub fn ping(token: impl Into<String>) -> Self {
        Self::new("PING", [token.into()])
    }

    /// `PONG :<token>`
    pub fn pong(token: impl Into<String>) -> Self {
        Self::new("PONG", [token.into()])
    }

    /// `QUIT [:<reason>]`
    pub fn quit(reason: Option<&str>) -> Self {
        Self::new("QUIT", reason.map(str::to_owned))
    }

    /// Numeric reply code, if the command is a three digit numeric.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Parameter at `idx`, if present.
    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// Nickname of the message origin, if it came from a user.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }

    /// Value of the tag `key`, if present with a value.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .as_ref()?
            .iter()
            .find(|t| t.0 == key)
            .and_then(|t| t.1.as_deref())
    }
}

fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape_tag_value(raw: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for c in raw.chars() {
        match c {
            ';' => f.write_str("\\:")?,
            ' ' => f.write_str("\\s")?,
            '\\' => f.write_str("\\\\")?,
            '\r' => f.write_str("\\r")?,
            '\n' => f.write_str("\\n")?,
            other => write!(f, "{other}")?,
        }
    }
    Ok(())
}

fn parse_tags(raw: &str) -> Vec<Tag> {
    raw.split(';')
        .filter(|t| !t.is_empty())
        .map(|t| match t.split_once('=') {
            Some((k, v)) => Tag(k.to_owned(), Some(unescape_tag_value(v))),
            None => Tag(t.to_owned(), None),
        })
        .collect()
}

/// Split off the next space-delimited token, skipping repeated spaces.
fn next_token(s: &str) -> (&str, &str) {
    let s = s.trim_start_matches(' ');
    match s.find(' ') {
        Some(idx) => (&s[..idx], &s[idx + 1..]),
        None => (s, ""),
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start_matches(' ');
        if rest.is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        let mut tags = None;
        if let Some(after) = rest.strip_prefix('@') {
            let (raw_tags, tail) = next_token(after);
            tags = Some(parse_tags(raw_tags));
            rest = tail;
        }

        let mut prefix = None;
        if let Some(after) = rest.trim_start_matches(' ').strip_prefix(':') {
            let (raw_prefix, tail) = next_token(after);
            prefix = Some(Prefix::new_from_str(raw_prefix));
            rest = tail;
        }

        let (command, mut rest) = next_token(rest);
        if command.is_empty() {
            return Err(MessageParseError::MissingCommand);
        }
        let is_numeric = command.len() == 3 && command.bytes().all(|b| b.is_ascii_digit());
        if !is_numeric && !command.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(MessageParseError::InvalidCommand(command.to_owned()));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_owned());
                break;
            }
            let (param, tail) = next_token(rest);
            params.push(param.to_owned());
            rest = tail;
        }

        if params.len() > MAX_PARAMS {
            return Err(MessageParseError::TooManyParams(params.len()));
        }

        Ok(Message {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tags) = self.tags.as_ref().filter(|t| !t.is_empty()) {
            f.write_str("@")?;
            for (i, Tag(key, value)) in tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(";")?;
                }
                f.write_str(key)?;
                if let Some(value) = value {
                    f.write_str("=")?;
                    escape_tag_value(value, f)?;
                }
            }
            f.write_str(" ")?;
        }

        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }

        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {param}")?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg_with_prefix() {
        let msg: Message = ":nick!user@host PRIVMSG #chan :hello there".parse().unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#chan", "hello there"]);
        assert_eq!(msg.source_nickname(), Some("nick"));
    }

    #[test]
    fn test_parse_tags() {
        let msg: Message = "@time=2023-01-01T00:00:00Z;msgid=a\\sb;bot :s.net NOTICE * :x"
            .parse()
            .unwrap();
        assert_eq!(msg.tag_value("time"), Some("2023-01-01T00:00:00Z"));
        assert_eq!(msg.tag_value("msgid"), Some("a b"));
        assert_eq!(msg.tag_value("bot"), None);
        assert_eq!(msg.prefix, Some(Prefix::ServerName("s.net".into())));
    }

    #[test]
    fn test_parse_numeric() {
        let msg: Message = ":irc.example.net 001 bot :Welcome".parse().unwrap();
        assert_eq!(msg.numeric(), Some(1));
        assert_eq!(msg.param(0), Some("bot"));
    }

    #[test]
    fn test_parse_lowercase_command() {
        let msg: Message = "ping :abc".parse().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.param(0), Some("abc"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Message>(), Err(MessageParseError::EmptyMessage));
        assert_eq!(
            ":prefix.only".parse::<Message>(),
            Err(MessageParseError::MissingCommand)
        );
        assert!(matches!(
            "PRIV-MSG x".parse::<Message>(),
            Err(MessageParseError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_serialize_trailing() {
        assert_eq!(
            Message::privmsg("#chan", "hello world").to_string(),
            "PRIVMSG #chan :hello world"
        );
        assert_eq!(Message::join("#chan").to_string(), "JOIN #chan");
        assert_eq!(Message::quit(None).to_string(), "QUIT");
        assert_eq!(
            Message::user("bot", "Script Bot").to_string(),
            "USER bot 0 * :Script Bot"
        );
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_never_panics(line in "\\PC{0,200}") {
                let _ = line.parse::<Message>();
            }

            #[test]
            fn privmsg_text_survives(text in "[^\r\n\0]{0,100}") {
                let line = Message::privmsg("#c", text.clone()).to_string();
                let parsed: Message = line.parse().unwrap();
                prop_assert_eq!(parsed.param(1).unwrap_or(""), text.as_str());
            }
        }
    }
}
