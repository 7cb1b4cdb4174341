//! slircbot - Straylight IRC Bot
//!
//! Connects to one IRC server and dispatches events and chat commands to
//! configured handlers. SIGHUP reloads the bindings in place.

use std::net::SocketAddr;
use std::sync::Arc;

use slircbot::Bot;
use slircbot::config::Config;
use slircbot::rehash::FileSource;
use slircbot::{http, metrics};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        nickname = %config.server.nickname,
        events = config.events.len(),
        commands = config.commands.len(),
        "Starting slircbot"
    );

    // Convention: metrics_port = 0 disables the HTTP endpoint.
    let metrics_addr = SocketAddr::new(config.bot.metrics_bind, config.bot.metrics_port);

    let bot = Arc::new(Bot::from_config(config, Arc::new(FileSource::new(&config_path)))?);
    let shutdown = CancellationToken::new();

    if metrics_addr.port() == 0 {
        info!("Operator endpoint disabled (metrics_port = 0)");
    } else {
        metrics::init();
        tokio::spawn(http::serve(metrics_addr, bot.status(), shutdown.clone()));
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C; shutting down"),
            }
            shutdown.cancel();
        });
    }

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut hangup = signal(SignalKind::hangup())?;
        let bot = Arc::clone(&bot);
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                info!("Received SIGHUP, rehashing");
                if let Err(e) = bot.reload("SIGHUP").await {
                    warn!(error = %e, code = e.error_code(), "SIGHUP rehash failed; keeping current bindings");
                }
            }
        });
    }

    bot.run(shutdown).await;
    info!("Goodbye");
    Ok(())
}
