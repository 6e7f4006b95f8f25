//! Message framing for the stdio transport.
//!
//! Two framings are understood:
//!
//! ```text
//! newline-delimited:   {"jsonrpc":"2.0","id":1,...}\n
//! content-length:      Content-Length: <length>\r\n
//!                      \r\n
//!                      {"jsonrpc":"2.0","id":1,...}
//! ```
//!
//! Decoding detects the framing per frame, so a reader copes with either.
//! Encoding always uses the framing the codec was built with; both ends of
//! one deployment must agree on it.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{McpError, Result};
use crate::protocol::JsonRpcMessage;

/// Default upper bound on a single frame body.
pub const DEFAULT_MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

const CONTENT_LENGTH: &str = "content-length";

/// How messages are delimited on the byte stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// One JSON document per line.
    #[default]
    #[serde(alias = "newline")]
    NewlineDelimited,
    /// LSP-style `Content-Length` header block followed by the body.
    ContentLength,
}

/// Codec turning a byte stream into frame bodies and messages into frames.
#[derive(Debug, Clone)]
pub struct McpCodec {
    framing: Framing,
    max_frame_len: usize,
    // Bytes of a partial line already searched for its newline.
    next_index: usize,
}

impl McpCodec {
    /// Create a codec that writes with `framing`.
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            next_index: 0,
        }
    }

    /// Override the maximum accepted frame length.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// The framing used when encoding.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        let start = self.next_index.min(src.len());
        match src[start..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                self.next_index = 0;
                Ok(Some(self.take_line(src, start + offset)?))
            }
            None => {
                self.next_index = src.len();
                self.check_len(src.len())?;
                Ok(None)
            }
        }
    }

    /// Split off the line ending at the newline at `pos`, without its terminator.
    fn take_line(&self, src: &mut BytesMut, pos: usize) -> Result<BytesMut> {
        let mut line = src.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }
        self.check_len(line.len())?;
        Ok(line)
    }

    fn decode_content_length(&self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        // Text that cannot open a header block (a stray log line) is handed
        // on as a frame of its own; the message parser rejects it.
        if let Some(pos) = stray_line_end(src) {
            return self.take_line(src, pos).map(Some);
        }

        let Some((header_len, body_start)) = find_header_end(src) else {
            // Header blocks are tiny; anything this large is not one.
            if src.len() > 4096 {
                return Err(McpError::protocol("unterminated header block"));
            }
            return Ok(None);
        };

        let headers = std::str::from_utf8(&src[..header_len])
            .map_err(|e| McpError::protocol(format!("invalid UTF-8 in headers: {e}")))?;

        let mut content_length: Option<usize> = None;
        for line in headers.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                content_length = Some(value.trim().parse().map_err(|e| {
                    McpError::protocol(format!("invalid Content-Length: {e}"))
                })?);
            }
        }

        let content_length =
            content_length.ok_or_else(|| McpError::protocol("missing Content-Length header"))?;
        self.check_len(content_length)?;

        if src.len() < body_start + content_length {
            src.reserve(body_start + content_length - src.len());
            return Ok(None);
        }

        src.advance(body_start);
        Ok(Some(src.split_to(content_length)))
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_frame_len {
            return Err(McpError::protocol(format!(
                "frame of {len} bytes exceeds limit of {} bytes",
                self.max_frame_len
            )));
        }
        Ok(())
    }
}

impl Default for McpCodec {
    fn default() -> Self {
        Self::new(Framing::default())
    }
}

/// Locate the blank line ending a header block.
///
/// Returns the length of the header text and the offset of the body.
fn find_header_end(src: &[u8]) -> Option<(usize, usize)> {
    for i in 0..src.len() {
        if src[i..].starts_with(b"\r\n\r\n") {
            return Some((i, i + 4));
        }
        if src[i..].starts_with(b"\n\n") {
            return Some((i, i + 2));
        }
    }
    None
}

/// Where the first line ends, if the complete lines buffered so far cannot
/// be the start of a header block.
fn stray_line_end(src: &[u8]) -> Option<usize> {
    let first_end = src.iter().position(|b| *b == b'\n')?;
    let mut start = 0;
    while let Some(len) = src[start..].iter().position(|b| *b == b'\n') {
        let line = &src[start..start + len];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            // End of a well-formed header block.
            return None;
        }
        if !is_header_line(line) {
            return Some(first_end);
        }
        start += len + 1;
    }
    None
}

/// `Name: value`, with a non-empty token for the name.
fn is_header_line(line: &[u8]) -> bool {
    match line.iter().position(|b| *b == b':') {
        Some(colon) if colon > 0 => line[..colon]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'-'),
        _ => false,
    }
}

impl Decoder for McpCodec {
    type Item = BytesMut;
    type Error = McpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        if self.next_index > 0 {
            return self.decode_line(src);
        }

        let leading = src.iter().take_while(|b| b.is_ascii_whitespace()).count();
        src.advance(leading);

        match src.first() {
            None => Ok(None),
            Some(b'{') | Some(b'[') => self.decode_line(src),
            Some(_) => self.decode_content_length(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // A final line without its newline is still a complete document.
        if matches!(src.first(), Some(b'{') | Some(b'[')) {
            self.next_index = 0;
            let rest = src.split_to(src.len());
            return Ok(Some(rest));
        }
        Err(McpError::transport(format!(
            "stream ended inside a frame ({} bytes pending)",
            src.len()
        )))
    }
}

impl Encoder<JsonRpcMessage> for McpCodec {
    type Error = McpError;

    fn encode(&mut self, message: JsonRpcMessage, dst: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(&message)?;
        self.check_len(json.len())?;

        match self.framing {
            Framing::NewlineDelimited => {
                dst.reserve(json.len() + 1);
                dst.put_slice(&json);
                dst.put_u8(b'\n');
            }
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", json.len());
                dst.reserve(header.len() + json.len());
                dst.put_slice(header.as_bytes());
                dst.put_slice(&json);
            }
        }

        tracing::trace!(framing = ?self.framing, bytes = json.len(), "encoded MCP message");
        Ok(())
    }
}
