//! Transport layer for MCP communication.
//!
//! A transport is a framed reader/writer pair over any async byte stream:
//! a spawned server's stdin/stdout, this process's own stdio when serving,
//! or an in-memory pipe in tests. Whoever holds the transport owns it
//! exclusively; a [`McpSession`](crate::McpSession) or
//! [`McpServer`](crate::McpServer) consumes it whole.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::{Framing, McpCodec};
use crate::error::{McpError, Result};

/// Boxed read half of a transport.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Framed read half.
pub type FrameReader = FramedRead<BoxedReader, McpCodec>;

/// Framed write half.
pub type FrameWriter = FramedWrite<BoxedWriter, McpCodec>;

/// A framed, bidirectional message channel.
pub struct McpTransport {
    reader: FrameReader,
    writer: FrameWriter,
    /// The server process, when this transport spawned one.
    child: Option<Child>,
}

impl McpTransport {
    /// Wrap an arbitrary reader/writer pair.
    pub fn from_streams<R, W>(reader: R, writer: W, framing: Framing) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let codec = McpCodec::new(framing);
        Self {
            reader: FramedRead::new(Box::new(reader) as BoxedReader, codec.clone()),
            writer: FramedWrite::new(Box::new(writer) as BoxedWriter, codec),
            child: None,
        }
    }

    /// Use this process's stdin/stdout, for serving.
    pub fn stdio(framing: Framing) -> Self {
        Self::from_streams(tokio::io::stdin(), tokio::io::stdout(), framing)
    }

    /// Spawn a server process and talk to it over its stdio.
    ///
    /// # Arguments
    /// * `command` - The command to spawn (e.g., "nimbus")
    /// * `args` - Arguments to pass to the command
    /// * `env` - Extra environment variables to set
    /// * `framing` - Framing both ends agreed on
    pub fn spawn_stdio(
        command: &str,
        args: &[String],
        env: &[(String, String)],
        framing: Framing,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let stderr pass through for debugging
            .kill_on_drop(true);

        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::spawn_failed(format!("failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;

        tracing::debug!(command = %command, pid = ?child.id(), "spawned MCP server process");

        let mut transport = Self::from_streams(stdout, stdin, framing);
        transport.child = Some(child);
        Ok(transport)
    }

    /// Framing used when writing.
    pub fn framing(&self) -> Framing {
        self.writer.encoder().framing()
    }

    /// Whether this transport owns a child process.
    pub fn is_process(&self) -> bool {
        self.child.is_some()
    }

    /// Split into the framed halves and the optional child process.
    pub(crate) fn into_parts(self) -> (FrameReader, FrameWriter, Option<Child>) {
        (self.reader, self.writer, self.child)
    }
}

impl std::fmt::Debug for McpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTransport")
            .field("framing", &self.framing())
            .field("child", &self.child.as_ref().and_then(|c| c.id()))
            .finish_non_exhaustive()
    }
}
