//! In-memory fake IRC server.
//!
//! The bot gets one end of a `tokio::io::duplex` pipe; the test drives the
//! other end line by line.

use std::time::Duration;

use slircbot_proto::Message;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::time::timeout;

/// Server side of a duplex connection.
pub struct FakeServer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    marker: u32,
}

#[allow(dead_code)]
impl FakeServer {
    /// A server and the stream to hand to the bot.
    pub fn pair() -> (Self, DuplexStream) {
        let (server, client) = tokio::io::duplex(64 * 1024);
        let (read_half, write_half) = tokio::io::split(server);
        (
            Self {
                reader: BufReader::new(read_half),
                writer: write_half,
                marker: 0,
            },
            client,
        )
    }

    /// Send one line to the bot.
    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next line from the bot, without the line ending.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        let mut line = String::new();
        let read = timeout(Duration::from_secs(5), self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("connection closed by bot");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Next line from the bot, parsed.
    pub async fn recv_message(&mut self) -> anyhow::Result<Message> {
        let line = self.recv().await?;
        line.parse::<Message>()
            .map_err(|e| anyhow::anyhow!("Parse error on {line:?}: {e}"))
    }

    /// True once the bot has closed its side.
    pub async fn closed(&mut self) -> anyhow::Result<bool> {
        let mut line = String::new();
        let read = timeout(Duration::from_secs(5), self.reader.read_line(&mut line)).await??;
        Ok(read == 0)
    }

    /// Everything the bot sends before it answers a fresh PING.
    ///
    /// The bot handles lines in order, so this collects exactly the output
    /// caused by lines sent before the call.
    pub async fn sync(&mut self) -> anyhow::Result<Vec<String>> {
        self.marker += 1;
        let token = format!("sync{}", self.marker);
        self.send(&format!("PING :{token}")).await?;
        let pong = format!("PONG {token}");
        let mut lines = Vec::new();
        loop {
            let line = self.recv().await?;
            if line == pong {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    /// Read the bot's registration, then welcome it and end the MOTD.
    /// Returns the registration lines.
    pub async fn accept_registration(&mut self, nick: &str) -> anyhow::Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.recv().await?;
            let done = line.starts_with("USER ");
            lines.push(line);
            if done {
                break;
            }
        }
        self.send(&format!(":irc.test 001 {nick} :Welcome to the test network {nick}"))
            .await?;
        self.send(&format!(":irc.test 376 {nick} :End of /MOTD command."))
            .await?;
        Ok(lines)
    }
}
