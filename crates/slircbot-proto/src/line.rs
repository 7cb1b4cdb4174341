//! Line-based codec for tokio.
//!
//! Reads CRLF (or bare LF) terminated lines and writes single lines,
//! appending the CRLF terminator on the way out.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, extract_command_hint, ProtocolError};

/// Classic RFC 1459 line limit, terminator included.
pub const MAX_LINE_LEN: usize = 512;

/// Line limit when the server may attach IRCv3 message tags (8191 bytes of
/// tags plus a classic line).
pub const MAX_TAGGED_LINE_LEN: usize = 8191 + MAX_LINE_LEN;

/// Line-based codec that handles newline-terminated messages.
///
/// Decoded lines have their terminator stripped. Encoded lines are cut at
/// the first CR or LF so one `encode` call never produces two lines.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length, terminator included
    max_len: usize,
    /// Replace invalid UTF-8 and stray control characters instead of failing
    lossy: bool,
    /// Dropping the tail of an overlong line (lossy mode only)
    discarding: bool,
    /// Overlong lines dropped since the last `take_discarded`
    discarded: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Create a codec with the classic 512 byte limit.
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    /// Create a codec with a custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            lossy: false,
            discarding: false,
            discarded: 0,
        }
    }

    /// Decode invalid UTF-8 with replacement characters, drop stray NUL/CR
    /// bytes, and skip lines over the length limit instead of returning an
    /// error. Skipped lines are counted; see [`LineCodec::take_discarded`].
    ///
    /// A framed reader stops after its first decode error, so a client that
    /// must survive other people's traffic should use this mode.
    pub fn lossy(mut self) -> Self {
        self.lossy = true;
        self
    }

    /// Number of overlong lines skipped since the previous call.
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    fn validate_line(s: &str) -> error::Result<()> {
        match s.chars().find(|c| *c == '\0' || *c == '\r' || *c == '\n') {
            Some(ch) => Err(ProtocolError::IllegalControlChar(ch)),
            None => Ok(()),
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        if self.discarding {
            match src.iter().position(|b| *b == b'\n') {
                Some(end) => {
                    src.advance(end + 1);
                    self.discarding = false;
                }
                None => {
                    src.clear();
                    return Ok(None);
                }
            }
        }

        let line = loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                if src.len() > self.max_len {
                    if !self.lossy {
                        return Err(ProtocolError::MessageTooLong {
                            actual: src.len(),
                            limit: self.max_len,
                        });
                    }
                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                    self.discarded += 1;
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() <= self.max_len {
                break line;
            }
            if !self.lossy {
                return Err(ProtocolError::MessageTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }
            self.discarded += 1;
        };

        let mut end = line.len() - 1;
        if end > 0 && line[end - 1] == b'\r' {
            end -= 1;
        }
        let body = &line[..end];

        if self.lossy {
            let data = String::from_utf8_lossy(body).replace(['\0', '\r'], "");
            return Ok(Some(data));
        }

        let data = std::str::from_utf8(body)
            .map_err(|e| ProtocolError::InvalidUtf8 {
                byte_pos: e.valid_up_to(),
                command_hint: extract_command_hint(body),
            })?
            .to_owned();

        Self::validate_line(&data)?;
        Ok(Some(data))
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> error::Result<()> {
        let line = match msg.find(['\r', '\n']) {
            Some(cut) => &msg[..cut],
            None => msg.as_str(),
        };

        if line.len() + 2 > self.max_len {
            return Err(ProtocolError::MessageTooLong {
                actual: line.len() + 2,
                limit: self.max_len,
            });
        }
        if line.contains('\0') {
            return Err(ProtocolError::IllegalControlChar('\0'));
        }

        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :test\r\n");

        let result = codec.decode(&mut buf).unwrap();
        assert_eq!(result, Some("PING :test".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_bare_lf_and_partial() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :a\nPING :");

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :a".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"b\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :b".to_string()));
    }

    #[test]
    fn test_decode_too_long() {
        let mut codec = LineCodec::with_max_len(10);
        let mut buf = BytesMut::from("this is way too long\n");

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::MessageTooLong { .. })));
    }

    #[test]
    fn test_lossy_skips_overlong_lines() {
        let mut codec = LineCodec::with_max_len(16).lossy();
        let mut buf = BytesMut::from("PRIVMSG #a :this is far too long\r\nPING :a\r\n");

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :a".to_string()));
        assert_eq!(codec.take_discarded(), 1);
        assert_eq!(codec.take_discarded(), 0);
    }

    #[test]
    fn test_lossy_skips_overlong_line_across_reads() {
        let mut codec = LineCodec::with_max_len(16).lossy();
        let mut buf = BytesMut::from("NOTICE #a :aaaaaaaaaaaaaaaa");

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());

        buf.extend_from_slice(b"bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"bbb\r\nPING :b\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :b".to_string()));
        assert_eq!(codec.take_discarded(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_rejects_nul() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PRIVMSG #a :x\0y\r\n");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::IllegalControlChar('\0'))
        ));
    }

    #[test]
    fn test_lossy_decode() {
        let mut codec = LineCodec::new().lossy();
        let mut buf = BytesMut::from(&b"PRIVMSG #a :caf\xe9\0!\r\n"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("PRIVMSG #a :caf\u{fffd}!".to_string())
        );
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        codec.encode("PONG :test".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :test\r\n");
    }

    #[test]
    fn test_encode_never_emits_two_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode("PRIVMSG #a :hi\r\nQUIT :bye".to_string(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #a :hi\r\n");
    }

    #[test]
    fn test_encode_too_long() {
        let mut codec = LineCodec::with_max_len(8);
        let mut buf = BytesMut::new();
        assert!(codec.encode("PRIVMSG #x".to_string(), &mut buf).is_err());
        assert!(buf.is_empty());
    }
}
