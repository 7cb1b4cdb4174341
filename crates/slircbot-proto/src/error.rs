//! Error types for the IRC protocol library.
//!
//! Transport-level failures live in [`ProtocolError`]; failures to make sense
//! of a single line live in [`MessageParseError`].

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised while framing or transporting IRC lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An I/O error occurred on the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line exceeded the configured maximum length.
    #[error("message too long: {actual} bytes (limit {limit})")]
    MessageTooLong {
        /// Length of the offending line in bytes.
        actual: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The line was not valid UTF-8.
    #[error("invalid utf-8 at byte {byte_pos} (command: {command_hint:?})")]
    InvalidUtf8 {
        /// Offset of the first invalid byte.
        byte_pos: usize,
        /// Best-effort command name, for logging.
        command_hint: Option<String>,
    },

    /// The line contained a character that may never appear inside a line.
    #[error("illegal control character: {0:?}")]
    IllegalControlChar(char),

    /// The line was framed correctly but could not be parsed.
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] MessageParseError),
}

/// Errors raised while parsing a single IRC message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    /// The line was empty after trimming.
    #[error("empty message")]
    EmptyMessage,

    /// Tags or prefix were present but no command followed.
    #[error("missing command")]
    MissingCommand,

    /// The command token was neither alphabetic nor a three digit numeric.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// More than 15 parameters were supplied.
    #[error("too many parameters: {0}")]
    TooManyParams(usize),
}

/// Extract the IRC command name from raw message bytes (for error reporting).
///
/// Skips optional tags (`@...`) and prefix (`:...`), then returns the
/// following run of alphanumeric bytes.
#[cfg_attr(not(feature = "tokio"), allow(dead_code))]
pub(crate) fn extract_command_hint(raw_line: &[u8]) -> Option<String> {
    let mut rest = raw_line;
    for marker in [b'@', b':'] {
        if rest.first() == Some(&marker) {
            let end = rest.iter().position(|b| *b == b' ').unwrap_or(rest.len());
            rest = &rest[end..];
            while rest.first() == Some(&b' ') {
                rest = &rest[1..];
            }
        }
    }

    let len = rest.iter().take_while(|b| b.is_ascii_alphanumeric()).count();
    if len == 0 {
        return None;
    }
    std::str::from_utf8(&rest[..len]).ok().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_hint_skips_tags_and_prefix() {
        assert_eq!(
            extract_command_hint(b"@label=x :nick!u@h PRIVMSG #a :hi"),
            Some("PRIVMSG".to_string())
        );
        assert_eq!(extract_command_hint(b"PING :x"), Some("PING".to_string()));
        assert_eq!(extract_command_hint(b":only.prefix"), None);
    }
}
