//! Observable connection state.

use std::fmt;

use tokio::sync::watch;

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Transport up. `registered` turns true on RPL_WELCOME.
    Connected { registered: bool },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected { registered: false } => f.write_str("registering"),
            Self::Connected { registered: true } => f.write_str("registered"),
        }
    }
}

/// Per-connection registration progress.
#[derive(Debug, Clone)]
pub(crate) struct Registration {
    /// Nickname we last asked for.
    pub requested: String,
    pub registered: bool,
    /// Autojoin has run on this connection.
    pub joined: bool,
    /// Nick collisions seen before registration.
    pub collisions: u32,
}

impl Registration {
    pub fn new(nickname: &str) -> Self {
        Self {
            requested: nickname.to_string(),
            registered: false,
            joined: false,
            collisions: 0,
        }
    }

    /// Next nickname to try after `ERR_NICKNAMEINUSE`: the alternate first,
    /// then the last attempt with an underscore prepended.
    pub fn next_nickname(&mut self, altnick: &str) -> String {
        self.collisions += 1;
        let next = if self.collisions == 1 && altnick != self.requested {
            altnick.to_string()
        } else {
            format!("_{}", self.requested)
        };
        self.requested = next.clone();
        next
    }
}

/// Publishes [`SessionState`] changes to any number of observers.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<SessionState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Disconnected);
        Self { tx }
    }

    pub fn set(&self, state: SessionState) {
        self.tx.send_replace(state);
    }

    pub fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}
