//! Event names, event payloads and the event binding table.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::BindError;
use crate::flags::Client;
use crate::handlers::{Env, EventHandler, run_guarded};

/// Every event a handler can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Connect,
    ServerReady,
    ChannelMessage,
    ChannelAction,
    ChannelNotice,
    PrivateMessage,
    PrivateAction,
    PrivateNotice,
    ChannelJoin,
    ChannelPart,
    ChannelKick,
    ChannelTopic,
    NickChanged,
    Quit,
    NickInUse,
    Numeric,
    DataIn,
    Disconnect,
}

impl EventKind {
    pub const ALL: [EventKind; 18] = [
        Self::Connect,
        Self::ServerReady,
        Self::ChannelMessage,
        Self::ChannelAction,
        Self::ChannelNotice,
        Self::PrivateMessage,
        Self::PrivateAction,
        Self::PrivateNotice,
        Self::ChannelJoin,
        Self::ChannelPart,
        Self::ChannelKick,
        Self::ChannelTopic,
        Self::NickChanged,
        Self::Quit,
        Self::NickInUse,
        Self::Numeric,
        Self::DataIn,
        Self::Disconnect,
    ];

    /// Configuration name of the event.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connect => "onConnect",
            Self::ServerReady => "onServerReady",
            Self::ChannelMessage => "onChannelMessage",
            Self::ChannelAction => "onChannelAction",
            Self::ChannelNotice => "onChannelNotice",
            Self::PrivateMessage => "onPrivateMessage",
            Self::PrivateAction => "onPrivateAction",
            Self::PrivateNotice => "onPrivateNotice",
            Self::ChannelJoin => "onChannelJoin",
            Self::ChannelPart => "onChannelPart",
            Self::ChannelKick => "onChannelKick",
            Self::ChannelTopic => "onChannelTopic",
            Self::NickChanged => "onNickChanged",
            Self::Quit => "onQuit",
            Self::NickInUse => "onNickInUse",
            Self::Numeric => "onNumeric",
            Self::DataIn => "onDataIn",
            Self::Disconnect => "onDisconnect",
        }
    }

    /// Look up an event by its exact configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

}

/// Check a bind-time event name. Any well-formed name binds; names outside
/// [`EventKind::ALL`] only ever see [`Event::Named`] dispatches.
pub fn validate_event_name(name: &str) -> Result<(), BindError> {
    if name.trim().is_empty() {
        return Err(BindError::EmptyEventName);
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(BindError::MalformedEventName(name.to_string()));
    }
    Ok(())
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified protocol event. Every handler bound to the event's name
/// receives the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The transport is up and registration has been sent.
    Connect,
    /// End of MOTD (or no MOTD): the server accepts commands.
    ServerReady,
    ChannelMessage {
        channel: String,
        client: Client,
        text: String,
    },
    ChannelAction {
        channel: String,
        client: Client,
        text: String,
    },
    /// Notices may come from the server itself, hence the optional client.
    ChannelNotice {
        channel: String,
        client: Option<Client>,
        text: String,
    },
    PrivateMessage {
        client: Client,
        text: String,
    },
    PrivateAction {
        client: Client,
        text: String,
    },
    PrivateNotice {
        client: Option<Client>,
        text: String,
    },
    ChannelJoin {
        channel: String,
        client: Client,
    },
    ChannelPart {
        channel: String,
        client: Client,
        reason: Option<String>,
    },
    ChannelKick {
        channel: String,
        client: Client,
        target: String,
        reason: Option<String>,
    },
    ChannelTopic {
        channel: String,
        client: Option<Client>,
        topic: String,
    },
    NickChanged {
        client: Client,
        new_nick: String,
    },
    Quit {
        client: Client,
        reason: Option<String>,
    },
    /// The nickname we asked for is taken.
    NickInUse {
        nick: String,
    },
    Numeric {
        code: u16,
        params: Vec<String>,
    },
    /// Every raw line, before any other event for it.
    DataIn {
        line: String,
    },
    Disconnect {
        reason: String,
    },
    /// An event outside the protocol set, raised by name.
    Named {
        name: String,
        args: Vec<String>,
    },
}

impl Event {
    pub fn named(name: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Named {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Protocol event kind; `None` for [`Event::Named`].
    pub fn kind(&self) -> Option<EventKind> {
        let kind = match self {
            Self::Named { .. } => return None,
            Self::Connect => EventKind::Connect,
            Self::ServerReady => EventKind::ServerReady,
            Self::ChannelMessage { .. } => EventKind::ChannelMessage,
            Self::ChannelAction { .. } => EventKind::ChannelAction,
            Self::ChannelNotice { .. } => EventKind::ChannelNotice,
            Self::PrivateMessage { .. } => EventKind::PrivateMessage,
            Self::PrivateAction { .. } => EventKind::PrivateAction,
            Self::PrivateNotice { .. } => EventKind::PrivateNotice,
            Self::ChannelJoin { .. } => EventKind::ChannelJoin,
            Self::ChannelPart { .. } => EventKind::ChannelPart,
            Self::ChannelKick { .. } => EventKind::ChannelKick,
            Self::ChannelTopic { .. } => EventKind::ChannelTopic,
            Self::NickChanged { .. } => EventKind::NickChanged,
            Self::Quit { .. } => EventKind::Quit,
            Self::NickInUse { .. } => EventKind::NickInUse,
            Self::Numeric { .. } => EventKind::Numeric,
            Self::DataIn { .. } => EventKind::DataIn,
            Self::Disconnect { .. } => EventKind::Disconnect,
        };
        Some(kind)
    }

    /// Name the event dispatches under.
    pub fn name(&self) -> &str {
        match self {
            Self::Named { name, .. } => name,
            other => other.kind().map_or("", EventKind::name),
        }
    }

    /// Channel the event happened in, if any.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::ChannelMessage { channel, .. }
            | Self::ChannelAction { channel, .. }
            | Self::ChannelNotice { channel, .. }
            | Self::ChannelJoin { channel, .. }
            | Self::ChannelPart { channel, .. }
            | Self::ChannelKick { channel, .. }
            | Self::ChannelTopic { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Client that caused the event, if any.
    pub fn client(&self) -> Option<&Client> {
        match self {
            Self::ChannelMessage { client, .. }
            | Self::ChannelAction { client, .. }
            | Self::PrivateMessage { client, .. }
            | Self::PrivateAction { client, .. }
            | Self::ChannelJoin { client, .. }
            | Self::ChannelPart { client, .. }
            | Self::ChannelKick { client, .. }
            | Self::NickChanged { client, .. }
            | Self::Quit { client, .. } => Some(client),
            Self::ChannelNotice { client, .. }
            | Self::PrivateNotice { client, .. }
            | Self::ChannelTopic { client, .. } => client.as_ref(),
            _ => None,
        }
    }

    /// Text carried by the event, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::ChannelMessage { text, .. }
            | Self::ChannelAction { text, .. }
            | Self::ChannelNotice { text, .. }
            | Self::PrivateMessage { text, .. }
            | Self::PrivateAction { text, .. }
            | Self::PrivateNotice { text, .. } => Some(text),
            Self::ChannelTopic { topic, .. } => Some(topic),
            Self::ChannelPart { reason, .. }
            | Self::ChannelKick { reason, .. }
            | Self::Quit { reason, .. } => reason.as_deref(),
            Self::DataIn { line } => Some(line),
            Self::Disconnect { reason } => Some(reason),
            Self::Named { args, .. } => args.first().map(String::as_str),
            _ => None,
        }
    }
}

/// One handler bound to one event.
#[derive(Clone)]
pub struct EventBinding {
    event: String,
    handler: Arc<dyn EventHandler>,
    order: u64,
}

impl EventBinding {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    /// Registration sequence number, unique within a registry.
    pub fn order(&self) -> u64 {
        self.order
    }
}

impl fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBinding")
            .field("event", &self.event)
            .field("handler", &self.handler.name())
            .field("order", &self.order)
            .finish()
    }
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that ran, failed ones included.
    pub invoked: usize,
    /// Handlers that returned an error, panicked or ran out of budget.
    pub failed: usize,
}

/// Event name to handlers, in registration order.
///
/// Persistent maps keep clones cheap: a snapshot is cloned, mutated and
/// swapped in rather than edited in place.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    bindings: im::HashMap<String, im::Vector<EventBinding>>,
    next_order: u64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the handlers of `name`. Binding the same handler
    /// twice makes it run twice.
    pub fn bind(&mut self, name: &str, handler: Arc<dyn EventHandler>) -> Result<(), BindError> {
        validate_event_name(name)?;
        if EventKind::from_name(name).is_none() {
            debug!(event = name, "Binding non-protocol event");
        }
        let binding = EventBinding {
            event: name.to_string(),
            handler,
            order: self.next_order,
        };
        self.next_order += 1;
        self.bindings
            .entry(name.to_string())
            .or_insert_with(im::Vector::new)
            .push_back(binding);
        Ok(())
    }

    /// Remove every binding of `name` whose handler is called `handler_name`.
    /// Returns how many were removed.
    pub fn unbind(&mut self, name: &str, handler_name: &str) -> Result<usize, BindError> {
        validate_event_name(name)?;
        let Some(list) = self.bindings.get(name) else {
            return Ok(0);
        };
        let kept: im::Vector<EventBinding> = list
            .iter()
            .filter(|b| b.handler.name() != handler_name)
            .cloned()
            .collect();
        let removed = list.len() - kept.len();
        if kept.is_empty() {
            self.bindings.remove(name);
        } else {
            self.bindings.insert(name.to_string(), kept);
        }
        Ok(removed)
    }

    /// Remove every binding of `name`.
    pub fn unbind_all(&mut self, name: &str) -> Result<usize, BindError> {
        validate_event_name(name)?;
        Ok(self.bindings.remove(name).map_or(0, |list| list.len()))
    }

    /// Bindings of `name`, in the order they will run.
    pub fn bindings(&self, name: &str) -> impl Iterator<Item = &EventBinding> {
        self.bindings.get(name).into_iter().flat_map(|list| list.iter())
    }

    pub fn count(&self, name: &str) -> usize {
        self.bindings.get(name).map_or(0, |list| list.len())
    }

    /// Total number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.values().map(|list| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Run every handler bound to the event's name, in order.
    ///
    /// A handler that fails, panics or exceeds `budget` is logged and
    /// counted; the remaining handlers still run.
    pub async fn dispatch(&self, env: &Env<'_>, event: &Event, budget: Duration) -> DispatchReport {
        let name = event.name();
        crate::metrics::record_event(name);

        let mut report = DispatchReport::default();
        for binding in self.bindings(name) {
            let handler = binding.handler.as_ref();
            report.invoked += 1;
            if let Err(e) = run_guarded(budget, handler.handle(env, event)).await {
                report.failed += 1;
                warn!(event = name, handler = handler.name(), error = %e, "Event handler failed");
                crate::metrics::record_handler_error(handler.name(), e.error_code());
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::NoopEvent;

    fn noop(name: &'static str) -> Arc<dyn EventHandler> {
        Arc::new(NoopEvent(name))
    }

    #[test]
    fn test_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(EventKind::from_name("onserverready"), None);
    }

    #[test]
    fn test_bind_rejects_bad_names() {
        let mut registry = EventRegistry::new();
        assert_eq!(
            registry.bind("  ", noop("a")).unwrap_err(),
            BindError::EmptyEventName
        );
        assert_eq!(
            registry.bind("on ready", noop("a")).unwrap_err(),
            BindError::MalformedEventName("on ready".into())
        );
        assert_eq!(
            registry.bind("ready\r\n", noop("a")).unwrap_err(),
            BindError::MalformedEventName("ready\r\n".into())
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_bind_accepts_any_well_formed_name() {
        let mut registry = EventRegistry::new();
        registry.bind("ready", noop("a")).unwrap();
        registry.bind("onserverready", noop("b")).unwrap();
        assert_eq!(registry.count("ready"), 1);
        assert_eq!(registry.count("onserverready"), 1);
        assert_eq!(registry.count("onServerReady"), 0);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Event::ServerReady.name(), "onServerReady");
        assert_eq!(Event::ServerReady.kind(), Some(EventKind::ServerReady));
        let ready = Event::named("ready", ["now"]);
        assert_eq!(ready.name(), "ready");
        assert_eq!(ready.kind(), None);
        assert_eq!(ready.text(), Some("now"));
    }

    #[test]
    fn test_bind_appends_in_order() {
        let mut registry = EventRegistry::new();
        registry.bind("onServerReady", noop("a")).unwrap();
        registry.bind("onServerReady", noop("b")).unwrap();
        registry.bind("onServerReady", noop("a")).unwrap();

        let names: Vec<_> = registry
            .bindings("onServerReady")
            .map(|b| b.handler().name().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "a"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_unbind() {
        let mut registry = EventRegistry::new();
        registry.bind("onQuit", noop("a")).unwrap();
        registry.bind("onQuit", noop("b")).unwrap();
        registry.bind("onQuit", noop("a")).unwrap();

        assert_eq!(registry.unbind("onQuit", "a").unwrap(), 2);
        assert_eq!(registry.count("onQuit"), 1);
        assert_eq!(registry.unbind_all("onQuit").unwrap(), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.unbind("onQuit", "a").unwrap(), 0);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut registry = EventRegistry::new();
        registry.bind("onConnect", noop("a")).unwrap();
        let snapshot = registry.clone();
        registry.bind("onConnect", noop("b")).unwrap();
        assert_eq!(snapshot.count("onConnect"), 1);
        assert_eq!(registry.count("onConnect"), 2);
    }
}
