//! Connection lifecycle.
//!
//! A session has two phases per connection: registration (PASS/NICK/USER,
//! nick collision handling) and the line loop. Every inbound line is
//! answered for keepalive first, then classified and dispatched against a
//! single bindings snapshot. Channel messages are additionally routed
//! through the command table.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use slircbot_proto::{
    Ctcp, CtcpKind, LineCodec, MAX_TAGGED_LINE_LEN, Message, ProtocolError, irc_eq,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, trace, warn};

use super::backoff::Backoff;
use super::classify::{ERR_NICKNAMEINUSE, classify};
use super::outbound::{Outbound, ParserHandle, run_writer};
use super::state::{Registration, SessionState, StateCell};
use crate::config::{BotConfig, ServerConfig};
use crate::error::ConnectionError;
use crate::handlers::Services;
use crate::registry::{Event, LiveBindings};
use crate::telemetry::spans;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const RPL_WELCOME: u16 = 1;

enum SelectResult {
    Shutdown,
    Line(String),
    ReadError(ProtocolError),
    Closed,
    Tick,
}

/// Drives one IRC connection at a time, reconnecting until shut down.
pub struct Session {
    server: ServerConfig,
    bot: BotConfig,
    live: Arc<LiveBindings>,
    services: Services,
    state: StateCell,
}

impl Session {
    pub fn new(server: ServerConfig, bot: BotConfig, live: Arc<LiveBindings>, services: Services) -> Self {
        Self {
            server,
            bot,
            live,
            services,
            state: StateCell::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn bindings(&self) -> &Arc<LiveBindings> {
        &self.live
    }

    /// Connect, serve, and reconnect with backoff until `shutdown` fires.
    ///
    /// Bindings live outside the connection, so they survive reconnects.
    pub async fn run(&self, shutdown: CancellationToken) {
        let span = spans::session(&self.server.host, self.server.port);
        async {
            let mut backoff = Backoff::new(
                Duration::from_secs(self.bot.reconnect_delay_secs),
                Duration::from_secs(self.bot.max_reconnect_delay_secs),
            );
            let addr = format!("{}:{}", self.server.host, self.server.port);

            while !shutdown.is_cancelled() {
                self.state.set(SessionState::Connecting);
                info!(addr = %addr, "Connecting");

                let connect = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)) => result,
                };
                let result = match connect {
                    Ok(Ok(stream)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(error = %e, "Failed to set TCP_NODELAY");
                        }
                        let mut reg = Registration::new(&self.server.nickname);
                        let result = self.serve_with(stream, &shutdown, &mut reg).await;
                        if reg.registered {
                            backoff.reset();
                        }
                        result
                    }
                    Ok(Err(source)) => Err(ConnectionError::Connect {
                        addr: addr.clone(),
                        source,
                    }),
                    Err(_elapsed) => Err(ConnectionError::Connect {
                        addr: addr.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                    }),
                };
                self.state.set(SessionState::Disconnected);

                match result {
                    Ok(()) => break,
                    Err(e) => {
                        warn!(error = %e, code = e.error_code(), "Connection lost");
                        crate::metrics::record_reconnect(e.error_code());
                    }
                }

                let delay = backoff.next_delay_jittered();
                info!(delay = ?delay, attempt = backoff.failures(), "Reconnecting after delay");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            self.state.set(SessionState::Disconnected);
            info!("Session stopped");
        }
        .instrument(span)
        .await
    }

    /// Serve a single already-established connection until it ends.
    ///
    /// Returns `Ok(())` when `shutdown` ended the connection (after QUIT was
    /// flushed) and an error for anything else.
    pub async fn serve<S>(&self, stream: S, shutdown: &CancellationToken) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut reg = Registration::new(&self.server.nickname);
        let result = self.serve_with(stream, shutdown, &mut reg).await;
        self.state.set(SessionState::Disconnected);
        result
    }

    async fn serve_with<S>(
        &self,
        stream: S,
        shutdown: &CancellationToken,
        reg: &mut Registration,
    ) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let mut lines = FramedRead::new(reader, LineCodec::with_max_len(MAX_TAGGED_LINE_LEN).lossy());

        let (outbound, rx) = Outbound::channel(self.bot.send_queue);
        let writer_task = tokio::spawn(run_writer(writer, rx));
        let writer_abort = writer_task.abort_handle();
        let parser = ParserHandle::new(outbound, reg.requested.as_str());

        self.state.set(SessionState::Connected { registered: false });

        let mut result = self.line_loop(&mut lines, &parser, shutdown, reg).await;

        if result.is_ok() {
            let quit = Message::quit(Some(&self.bot.quit_message));
            if let Err(e) = parser.send(&quit).await {
                result = Err(ConnectionError::Writer(e.to_string()));
            }
        }

        let reason = match &result {
            Ok(()) => "shutdown".to_string(),
            Err(e) => e.to_string(),
        };
        let bindings = self.live.load();
        bindings
            .dispatch(&parser, &self.services, Utc::now(), &Event::Disconnect { reason })
            .await;

        // Closing the last sender lets the writer flush and exit.
        drop(parser);
        match tokio::time::timeout(WRITER_FLUSH_TIMEOUT, writer_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!(error = %e, "Writer ended with error"),
            Ok(Err(e)) => warn!(error = %e, "Writer task failed"),
            Err(_) => {
                warn!("Writer did not flush in time; aborting");
                writer_abort.abort();
            }
        }

        result
    }

    async fn line_loop<R>(
        &self,
        lines: &mut FramedRead<R, LineCodec>,
        parser: &ParserHandle,
        shutdown: &CancellationToken,
        reg: &mut Registration,
    ) -> Result<(), ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        if let Some(password) = &self.server.password {
            send(parser, &Message::pass(password.as_str())).await?;
        }
        send(parser, &Message::nick(reg.requested.as_str())).await?;
        send(parser, &Message::user(self.server.username(), self.server.realname())).await?;

        self.live
            .load()
            .dispatch(parser, &self.services, Utc::now(), &Event::Connect)
            .await;

        let ping_every = Duration::from_secs(self.bot.ping_interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_activity = Instant::now();
        let mut ping_pending = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => SelectResult::Shutdown,
                line = lines.next() => match line {
                    Some(Ok(line)) => SelectResult::Line(line),
                    Some(Err(e)) => SelectResult::ReadError(e),
                    None => SelectResult::Closed,
                },
                _ = ticker.tick() => SelectResult::Tick,
            };

            match next {
                SelectResult::Shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                SelectResult::Closed => return Err(ConnectionError::Closed),
                SelectResult::ReadError(e) => return Err(e.into()),
                SelectResult::Tick => {
                    let idle = last_activity.elapsed();
                    if idle < ping_every {
                        continue;
                    }
                    if ping_pending {
                        return Err(ConnectionError::PingTimeout(idle));
                    }
                    debug!(idle = ?idle, "Server idle; sending PING");
                    send(parser, &Message::ping(self.server.host.as_str())).await?;
                    ping_pending = true;
                }
                SelectResult::Line(line) => {
                    last_activity = Instant::now();
                    ping_pending = false;
                    let skipped = lines.decoder_mut().take_discarded();
                    if skipped > 0 {
                        warn!(skipped, limit = MAX_TAGGED_LINE_LEN, "Skipped overlong inbound line");
                        crate::metrics::record_lines_discarded(skipped);
                    }
                    self.handle_line(parser, reg, line).await?;
                }
            }
        }
    }

    /// Process one inbound line to completion.
    async fn handle_line(
        &self,
        parser: &ParserHandle,
        reg: &mut Registration,
        raw: String,
    ) -> Result<(), ConnectionError> {
        crate::metrics::record_line_in();
        trace!(target: "wire", direction = "in", line = %raw);
        if raw.trim().is_empty() {
            return Ok(());
        }
        let msg: Message = match raw.parse() {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, line = %raw, "Ignoring unparseable line");
                return Ok(());
            }
        };

        if msg.command == "PING" {
            send(parser, &Message::pong(msg.param(0).unwrap_or_default())).await?;
        }
        self.track_connection_state(parser, reg, &msg).await?;
        self.reply_to_ctcp(parser, &msg).await;

        let bindings = self.live.load();
        let timestamp = line_time(&msg);
        let own_nick = parser.nickname();

        for event in classify(&msg, &raw) {
            if event == Event::ServerReady && !reg.joined {
                reg.joined = true;
                for channel in &bindings.settings.autojoin {
                    info!(channel = %channel, "Autojoining");
                    send(parser, &Message::join(channel.as_str())).await?;
                }
            }

            bindings.dispatch(parser, &self.services, timestamp, &event).await;

            if let Event::ChannelMessage {
                channel,
                client,
                text,
            } = &event
                && !irc_eq(&client.nick, &own_nick)
            {
                bindings
                    .route(parser, &self.services, timestamp, channel, client, text)
                    .await;
            }
        }

        if msg.command == "ERROR" {
            let reason = msg.param(0).unwrap_or_default().to_string();
            return Err(ConnectionError::ServerError(reason));
        }
        Ok(())
    }

    /// Registration and nickname bookkeeping.
    async fn track_connection_state(
        &self,
        parser: &ParserHandle,
        reg: &mut Registration,
        msg: &Message,
    ) -> Result<(), ConnectionError> {
        match msg.numeric() {
            Some(RPL_WELCOME) => {
                let nick = msg.param(0).unwrap_or(reg.requested.as_str()).to_string();
                parser.set_nickname(&nick);
                reg.registered = true;
                self.state.set(SessionState::Connected { registered: true });
                info!(nick = %nick, "Registered with server");
            }
            Some(ERR_NICKNAMEINUSE) if !reg.registered => {
                let next = reg.next_nickname(self.server.altnickname());
                info!(taken = msg.param(1).unwrap_or_default(), next = %next, "Nickname in use");
                parser.set_nickname(&next);
                send(parser, &Message::nick(next.as_str())).await?;
            }
            _ => {}
        }

        if msg.command == "NICK"
            && let (Some(old), Some(new)) = (msg.source_nickname(), msg.param(0))
            && irc_eq(old, &parser.nickname())
        {
            info!(old = %old, new = %new, "Own nickname changed");
            parser.set_nickname(new);
            reg.requested = new.to_string();
        }
        Ok(())
    }

    /// Answer CTCP VERSION, PING and TIME sent to us directly.
    async fn reply_to_ctcp(&self, parser: &ParserHandle, msg: &Message) {
        if msg.command != "PRIVMSG" {
            return;
        }
        let (Some(target), Some(text), Some(from)) = (msg.param(0), msg.param(1), msg.source_nickname())
        else {
            return;
        };
        if !irc_eq(target, &parser.nickname()) {
            return;
        }
        let Some(ctcp) = Ctcp::parse(text) else {
            return;
        };

        let time;
        let reply = match ctcp.kind {
            CtcpKind::Version => Ctcp::new(CtcpKind::Version, Some(self.bot.version_reply.as_str())),
            CtcpKind::Ping => Ctcp::new(CtcpKind::Ping, ctcp.params),
            CtcpKind::Time => {
                time = chrono::Local::now().to_rfc2822();
                Ctcp::new(CtcpKind::Time, Some(time.as_str()))
            }
            _ => return,
        };
        debug!(from = %from, kind = reply.kind.as_str(), "Answering CTCP");
        if let Err(e) = parser.send_ctcp_reply(from, &reply).await {
            debug!(error = %e, "Failed to send CTCP reply");
        }
    }
}

async fn send(parser: &ParserHandle, msg: &Message) -> Result<(), ConnectionError> {
    parser
        .send(msg)
        .await
        .map_err(|e| ConnectionError::Writer(e.to_string()))
}

/// Server time from the `time` tag, or now.
fn line_time(msg: &Message) -> DateTime<Utc> {
    msg.tag_value("time")
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_time_prefers_server_time() {
        let msg: Message = "@time=2024-05-01T12:00:00.000Z :a!b@c PRIVMSG #x :hi"
            .parse()
            .unwrap();
        assert_eq!(line_time(&msg).to_rfc3339(), "2024-05-01T12:00:00+00:00");

        let msg: Message = ":a!b@c PRIVMSG #x :hi".parse().unwrap();
        let before = Utc::now();
        assert!(line_time(&msg) >= before);
    }
}
