//! Hot reload of bindings.
//!
//! A rehash loads configuration from a [`BindingSource`], builds a complete
//! new snapshot with the [`HandlerCatalog`], and swaps it into
//! [`LiveBindings`] in one step. Any failure along the way leaves the
//! running snapshot untouched.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{Instrument, info, warn};

use crate::config::{Config, ConfigError, ServerConfig};
use crate::error::RehashError;
use crate::handlers::{HandlerCatalog, Rehasher};
use crate::registry::LiveBindings;
use crate::telemetry::spans;

/// Where configuration comes from.
#[async_trait]
pub trait BindingSource: Send + Sync {
    /// Load and validate a fresh configuration.
    async fn load(&self) -> Result<Config, ConfigError>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

/// Configuration read from a TOML file on every load.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BindingSource for FileSource {
    async fn load(&self) -> Result<Config, ConfigError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        content.parse()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Summary of an applied rehash.
#[derive(Debug, Clone)]
pub struct RehashReport {
    /// Generation of the snapshot now live.
    pub generation: u64,
    /// Event bindings in the new snapshot.
    pub events: usize,
    /// Command bindings in the new snapshot.
    pub commands: usize,
    /// `[[user]]` blocks loaded.
    pub users: usize,
    pub elapsed: Duration,
}

/// Serializes rehash requests and applies them to the live table.
pub struct RehashCoordinator {
    live: Arc<LiveBindings>,
    source: Arc<dyn BindingSource>,
    catalog: HandlerCatalog,
    /// Identity the session connected with; changes are reported, not applied.
    server: Option<ServerConfig>,
    lock: Mutex<()>,
}

impl RehashCoordinator {
    pub fn new(live: Arc<LiveBindings>, source: Arc<dyn BindingSource>, catalog: HandlerCatalog) -> Self {
        Self {
            live,
            source,
            catalog,
            server: None,
            lock: Mutex::new(()),
        }
    }

    /// Remember the running `[server]` section so a rehash can warn when
    /// it changes.
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    pub fn bindings(&self) -> &Arc<LiveBindings> {
        &self.live
    }

    /// Reload and swap. Concurrent calls run one after another.
    pub async fn rehash(&self) -> Result<RehashReport, RehashError> {
        let _guard = self.lock.lock().await;
        let span = spans::rehash(&self.source.describe());

        async {
            let result = self.reload().await;
            match &result {
                Ok(report) => {
                    info!(
                        generation = report.generation,
                        events = report.events,
                        commands = report.commands,
                        users = report.users,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "Rehash applied"
                    );
                    crate::metrics::record_rehash("ok");
                }
                Err(e) => {
                    warn!(error = %e, generation = self.live.generation(), "Rehash failed; keeping current bindings");
                    crate::metrics::record_rehash(e.error_code());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn reload(&self) -> Result<RehashReport, RehashError> {
        let started = Instant::now();
        let config = self.source.load().await?;
        let bindings = self.catalog.build(&config)?;

        if let Some(running) = &self.server
            && server_changed(running, &config.server)
        {
            warn!("[server] section changed; reconnect details apply after restart");
        }

        let events = bindings.events.len();
        let commands = bindings.commands.len();
        let generation = self.live.replace(bindings);
        Ok(RehashReport {
            generation,
            events,
            commands,
            users: config.users.len(),
            elapsed: started.elapsed(),
        })
    }
}

fn server_changed(a: &ServerConfig, b: &ServerConfig) -> bool {
    a.host != b.host || a.port != b.port || a.nickname != b.nickname || a.password != b.password
}

#[async_trait]
impl Rehasher for RehashCoordinator {
    async fn rehash(&self) -> Result<RehashReport, RehashError> {
        RehashCoordinator::rehash(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Bindings;
    use std::io::Write;

    const GOOD: &str = r#"
[server]
host = "irc.example.net"

[[command]]
trigger = "@eval"
handler = "eval"
"#;

    fn coordinator(file: &tempfile::NamedTempFile) -> RehashCoordinator {
        RehashCoordinator::new(
            Arc::new(LiveBindings::new(Bindings::default())),
            Arc::new(FileSource::new(file.path())),
            HandlerCatalog::with_builtins(),
        )
    }

    #[tokio::test]
    async fn test_rehash_swaps_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GOOD.as_bytes()).unwrap();
        let coordinator = coordinator(&file);

        let report = coordinator.rehash().await.unwrap();
        assert_eq!(report.generation, 2);
        assert_eq!(report.commands, 1);
        assert!(coordinator.bindings().load().commands.contains("@eval"));
    }

    #[tokio::test]
    async fn test_failed_rehash_keeps_bindings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GOOD.as_bytes()).unwrap();
        let coordinator = coordinator(&file);
        coordinator.rehash().await.unwrap();

        std::fs::write(file.path(), "[server]\nhost = \"irc.example.net\"\n[[command]]\ntrigger = \"@x\"\nhandler = \"nope\"\n").unwrap();
        let err = coordinator.rehash().await.unwrap_err();
        assert_eq!(err.error_code(), "load");

        std::fs::write(file.path(), "not toml [").unwrap();
        let err = coordinator.rehash().await.unwrap_err();
        assert_eq!(err.error_code(), "config");

        let live = coordinator.bindings().load();
        assert_eq!(live.generation(), 2);
        assert!(live.commands.contains("@eval"));
    }
}
