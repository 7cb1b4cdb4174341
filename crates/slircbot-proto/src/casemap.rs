//! IRC case-mapping functions (`rfc1459`).
//!
//! Besides ASCII letters, `[]\~` fold to `{}|^`.

/// Convert a single character to IRC lowercase.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Convert a string to IRC lowercase.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Compare two strings using IRC case-insensitive comparison.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.chars()
            .zip(b.chars())
            .all(|(x, y)| irc_lower_char(x) == irc_lower_char(y))
}

/// Whether `name` looks like a channel (starts with a channel prefix).
pub fn is_channel_name(name: &str) -> bool {
    matches!(name.chars().next(), Some('#' | '&' | '+' | '!'))
}
