//! Outbound path.
//!
//! Every line the bot sends goes through one bounded queue drained by a
//! single writer task, so lines from concurrent handlers never interleave.
//! Handlers see the queue through [`ParserHandle`] and [`Channel`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use parking_lot::RwLock;
use slircbot_proto::{Ctcp, LineCodec, MAX_LINE_LEN, Message, ProtocolError};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tracing::{trace, warn};

use crate::error::SendError;

/// Timeout for queueing a line before the connection is considered stuck.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest text chunk carried by one PRIVMSG or NOTICE, in bytes.
pub const MAX_TEXT_CHUNK: usize = 400;

/// Sending half of the outbound queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<String>,
}

impl Outbound {
    /// Create a queue holding up to `capacity` lines.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a message.
    pub async fn send(&self, msg: &Message) -> Result<(), SendError> {
        self.send_line(msg.to_string()).await
    }

    /// Queue a preformatted line.
    ///
    /// Waits up to 5 seconds for room in the queue; a queue that stays full
    /// means the writer is not draining and the line is dropped.
    pub async fn send_line(&self, line: String) -> Result<(), SendError> {
        trace!(target: "wire", direction = "out", line = %line);
        match tokio::time::timeout(SEND_TIMEOUT, self.tx.send(line)).await {
            Ok(Ok(())) => {
                crate::metrics::record_line_out();
                Ok(())
            }
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_timeout) => {
                warn!("SendQ overflow: writer not draining (timeout after {:?})", SEND_TIMEOUT);
                Err(SendError::Overflow)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drain the queue into `writer` until every sender is gone.
///
/// Lines the codec refuses (too long, embedded NUL) are logged and skipped;
/// I/O errors end the task.
pub async fn run_writer<W>(writer: W, mut rx: mpsc::Receiver<String>) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, LineCodec::new());
    while let Some(line) = rx.recv().await {
        match sink.send(line).await {
            Ok(()) => {}
            Err(ProtocolError::Io(e)) => return Err(ProtocolError::Io(e)),
            Err(e) => warn!(error = %e, "Dropping unsendable line"),
        }
    }
    sink.close().await
}

/// The part of `line` a raw send puts on the wire: everything before the
/// first line break. `Ok(None)` for blank input; an error when the server
/// could never accept the line.
pub fn raw_line(line: &str) -> Result<Option<&str>, SendError> {
    let first = line.split(['\r', '\n']).next().unwrap_or_default();
    if first.trim().is_empty() {
        return Ok(None);
    }
    if first.contains('\0') {
        return Err(SendError::IllegalNul);
    }
    // CRLF counts against the limit.
    if first.len() + 2 > MAX_LINE_LEN {
        return Err(SendError::LineTooLong {
            len: first.len() + 2,
            limit: MAX_LINE_LEN,
        });
    }
    Ok(Some(first))
}

/// Strip line breaks and NUL, then split into chunks of at most
/// [`MAX_TEXT_CHUNK`] bytes on character boundaries.
pub fn split_text(text: &str) -> Vec<String> {
    let clean: String = text
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\0'))
        .collect();

    let mut chunks = Vec::new();
    let mut rest = clean.as_str();
    while !rest.is_empty() {
        let mut cut = rest.len().min(MAX_TEXT_CHUNK);
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    chunks
}

/// Connection-scoped capability handed to every handler.
///
/// `send_raw_message` bypasses all framing and is the most privileged
/// operation a handler can perform.
#[derive(Debug, Clone)]
pub struct ParserHandle {
    outbound: Outbound,
    nickname: Arc<RwLock<String>>,
}

impl ParserHandle {
    pub fn new(outbound: Outbound, nickname: impl Into<String>) -> Self {
        Self {
            outbound,
            nickname: Arc::new(RwLock::new(nickname.into())),
        }
    }

    /// The bot's current nickname.
    pub fn nickname(&self) -> String {
        self.nickname.read().clone()
    }

    pub(crate) fn set_nickname(&self, nick: &str) {
        *self.nickname.write() = nick.to_string();
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Channel-scoped sink for `name`.
    pub fn channel(&self, name: impl Into<String>) -> Channel {
        Channel {
            name: name.into(),
            parser: self.clone(),
        }
    }

    /// Send `line` as-is. Only the first line is sent; empty input sends
    /// nothing. Lines the server could never accept are refused here rather
    /// than dropped by the writer.
    pub async fn send_raw_message(&self, line: &str) -> Result<(), SendError> {
        match raw_line(line)? {
            Some(first) => self.outbound.send_line(first.to_string()).await,
            None => Ok(()),
        }
    }

    /// PRIVMSG `text` to `target`, split into chunks.
    pub async fn send_message(&self, target: &str, text: &str) -> Result<(), SendError> {
        for chunk in split_text(text) {
            self.outbound.send(&Message::privmsg(target, chunk)).await?;
        }
        Ok(())
    }

    /// NOTICE `text` to `target`, split into chunks.
    pub async fn send_notice(&self, target: &str, text: &str) -> Result<(), SendError> {
        for chunk in split_text(text) {
            self.outbound.send(&Message::notice(target, chunk)).await?;
        }
        Ok(())
    }

    /// Reply to a CTCP request by NOTICE.
    pub async fn send_ctcp_reply(&self, target: &str, reply: &Ctcp<'_>) -> Result<(), SendError> {
        self.outbound
            .send(&Message::notice(target, reply.to_string()))
            .await
    }

    pub async fn join_channel(&self, channel: &str) -> Result<(), SendError> {
        self.outbound.send(&Message::join(channel)).await
    }

    pub async fn part_channel(&self, channel: &str, reason: Option<&str>) -> Result<(), SendError> {
        self.outbound.send(&Message::part(channel, reason)).await
    }

    /// Queue an arbitrary message.
    pub async fn send(&self, msg: &Message) -> Result<(), SendError> {
        self.outbound.send(msg).await
    }
}

/// A channel the bot can talk to.
#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    parser: ParserHandle,
}

impl Channel {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// PRIVMSG `text` to this channel.
    pub async fn send_message(&self, text: &str) -> Result<(), SendError> {
        self.parser.send_message(&self.name, text).await
    }

    pub async fn send_notice(&self, text: &str) -> Result<(), SendError> {
        self.parser.send_notice(&self.name, text).await
    }
}
