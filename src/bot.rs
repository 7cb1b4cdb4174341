//! Wiring: configuration in, a running session out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::{LoadError, RehashError};
use crate::eval::ArithmeticEvaluator;
use crate::handlers::{HandlerCatalog, Services};
use crate::http::BotStatus;
use crate::registry::{Bindings, LiveBindings};
use crate::rehash::{BindingSource, RehashCoordinator, RehashReport};
use crate::session::Session;

/// A configured bot: live bindings, the rehash coordinator and the session
/// that uses them.
pub struct Bot {
    live: Arc<LiveBindings>,
    rehasher: Arc<RehashCoordinator>,
    session: Session,
}

impl Bot {
    /// Build a bot with the built-in handler catalog.
    pub fn from_config(config: Config, source: Arc<dyn BindingSource>) -> Result<Self, LoadError> {
        Self::with_catalog(config, source, HandlerCatalog::with_builtins())
    }

    /// Build a bot whose configuration may name handlers from `catalog`.
    pub fn with_catalog(
        config: Config,
        source: Arc<dyn BindingSource>,
        catalog: HandlerCatalog,
    ) -> Result<Self, LoadError> {
        let live = Arc::new(LiveBindings::new(catalog.build(&config)?));
        let rehasher = Arc::new(
            RehashCoordinator::new(Arc::clone(&live), source, catalog).with_server(config.server.clone()),
        );
        let services = Services::new(
            Arc::clone(&rehasher) as _,
            Arc::new(ArithmeticEvaluator::default()),
        );
        let session = Session::new(config.server, config.bot, Arc::clone(&live), services);
        Ok(Self {
            live,
            rehasher,
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn rehasher(&self) -> &Arc<RehashCoordinator> {
        &self.rehasher
    }

    /// The snapshot currently live.
    pub fn bindings(&self) -> Arc<Bindings> {
        self.live.load()
    }

    /// Rehash on behalf of an operator signal named by `origin`.
    pub async fn reload(&self, origin: &str) -> Result<RehashReport, RehashError> {
        let report = self.rehasher.rehash().await?;
        info!(
            origin,
            generation = report.generation,
            commands = report.commands,
            "Reload applied"
        );
        Ok(report)
    }

    /// Health view for the operator endpoint.
    pub fn status(&self) -> BotStatus {
        BotStatus::new(self.session.subscribe(), Arc::clone(&self.live))
    }

    /// Run until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.session.run(shutdown).await
    }
}
