//! Trigger table for chat commands.

use std::fmt;
use std::sync::Arc;

use crate::error::BindError;
use crate::flags::{Client, FlagSource, RequiredFlag, has_flag};
use crate::handlers::CommandHandler;

/// A trigger bound to a handler and the flag needed to run it.
#[derive(Clone)]
pub struct CommandBinding {
    trigger: String,
    flag: RequiredFlag,
    handler: Arc<dyn CommandHandler>,
}

impl CommandBinding {
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn flag(&self) -> RequiredFlag {
        self.flag
    }

    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }
}

impl fmt::Debug for CommandBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBinding")
            .field("trigger", &self.trigger)
            .field("flag", &self.flag)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// Check that `trigger` is a prefix character followed by a command name,
/// with no whitespace or control characters.
pub fn validate_trigger(trigger: &str) -> Result<(), BindError> {
    let mut chars = trigger.chars();
    let Some(prefix) = chars.next() else {
        return Err(BindError::EmptyTrigger);
    };
    if trigger.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(BindError::MalformedTrigger(trigger.to_string()));
    }
    if !prefix.is_ascii_punctuation() {
        return Err(BindError::MissingPrefix(trigger.to_string()));
    }
    if chars.next().is_none() {
        return Err(BindError::BarePrefix(trigger.to_string()));
    }
    Ok(())
}

/// Split a chat line into its trigger token and the text after the first
/// space. The remainder is passed on untouched, inner spacing included.
pub fn split_trigger(text: &str) -> (&str, &str) {
    text.split_once(' ').unwrap_or((text, ""))
}

/// Trigger to binding. Lookups are exact and case-sensitive.
#[derive(Debug, Clone, Default)]
pub struct CommandRouter {
    table: im::HashMap<String, CommandBinding>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `trigger`, replacing any previous binding, which is returned.
    pub fn bind(
        &mut self,
        trigger: &str,
        flag: RequiredFlag,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Option<CommandBinding>, BindError> {
        validate_trigger(trigger)?;
        let binding = CommandBinding {
            trigger: trigger.to_string(),
            flag,
            handler,
        };
        Ok(self.table.insert(trigger.to_string(), binding))
    }

    pub fn unbind(&mut self, trigger: &str) -> Option<CommandBinding> {
        self.table.remove(trigger)
    }

    pub fn lookup(&self, trigger: &str) -> Option<&CommandBinding> {
        self.table.get(trigger)
    }

    pub fn contains(&self, trigger: &str) -> bool {
        self.table.contains_key(trigger)
    }

    /// All triggers, sorted.
    pub fn triggers(&self) -> Vec<&str> {
        let mut triggers: Vec<&str> = self.table.keys().map(String::as_str).collect();
        triggers.sort_unstable();
        triggers
    }

    /// Triggers `client` may invoke, sorted.
    pub fn triggers_for(&self, flags: &dyn FlagSource, client: &Client) -> Vec<&str> {
        let mut triggers: Vec<&str> = self
            .table
            .values()
            .filter(|b| has_flag(flags, client, b.flag))
            .map(|b| b.trigger.as_str())
            .collect();
        triggers.sort_unstable();
        triggers
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{FlagSet, HostmaskFlags};
    use crate::handlers::testing::NoopCommand;

    fn noop(name: &'static str) -> Arc<dyn CommandHandler> {
        Arc::new(NoopCommand(name))
    }

    #[test]
    fn test_validate_trigger() {
        assert!(validate_trigger("!rehash").is_ok());
        assert!(validate_trigger("@eval").is_ok());
        assert_eq!(validate_trigger(""), Err(BindError::EmptyTrigger));
        assert_eq!(
            validate_trigger("!re hash"),
            Err(BindError::MalformedTrigger("!re hash".into()))
        );
        assert_eq!(
            validate_trigger("!a\x01"),
            Err(BindError::MalformedTrigger("!a\x01".into()))
        );
        assert_eq!(
            validate_trigger("rehash"),
            Err(BindError::MissingPrefix("rehash".into()))
        );
        assert_eq!(validate_trigger("!"), Err(BindError::BarePrefix("!".into())));
    }

    #[test]
    fn test_split_trigger() {
        assert_eq!(split_trigger("!rehash"), ("!rehash", ""));
        assert_eq!(
            split_trigger("@raw PRIVMSG #x :hi"),
            ("@raw", "PRIVMSG #x :hi")
        );
        assert_eq!(split_trigger("@say  two"), ("@say", " two"));
        assert_eq!(split_trigger("@say "), ("@say", ""));
    }

    #[test]
    fn test_last_bind_wins() {
        let mut router = CommandRouter::new();
        assert!(router.bind("!x", RequiredFlag::None, noop("first")).unwrap().is_none());
        let replaced = router
            .bind("!x", RequiredFlag::Flag('n'), noop("second"))
            .unwrap()
            .unwrap();
        assert_eq!(replaced.handler().name(), "first");

        let current = router.lookup("!x").unwrap();
        assert_eq!(current.handler().name(), "second");
        assert_eq!(current.flag(), RequiredFlag::Flag('n'));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_lookup_is_exact() {
        let mut router = CommandRouter::new();
        router.bind("!help", RequiredFlag::None, noop("help")).unwrap();
        assert!(router.lookup("!help").is_some());
        assert!(router.lookup("!HELP").is_none());
        assert!(router.lookup("!hel").is_none());
        assert!(router.lookup("!helpme").is_none());
    }

    #[test]
    fn test_triggers_for() {
        let mut router = CommandRouter::new();
        router.bind("!rehash", RequiredFlag::Flag('n'), noop("rehash")).unwrap();
        router.bind("@help", RequiredFlag::None, noop("help")).unwrap();
        router.bind("@eval", RequiredFlag::Flag('e'), noop("eval")).unwrap();

        let mut flags = HostmaskFlags::new();
        flags.grant("*!*@trusted", FlagSet::from_chars("e")).unwrap();

        let trusted = Client::new("t", "u", "trusted");
        let stranger = Client::new("s", "u", "elsewhere");
        assert_eq!(router.triggers_for(&flags, &trusted), ["@eval", "@help"]);
        assert_eq!(router.triggers_for(&flags, &stranger), ["@help"]);
        assert_eq!(router.triggers(), ["!rehash", "@eval", "@help"]);
    }
}
