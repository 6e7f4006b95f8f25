//! Error types for MCP operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
///
/// Only protocol-level failures live here. A tool that fails while doing its
/// job reports that through a [`CallToolResult`](crate::CallToolResult) with
/// `isError` set, which travels back as an ordinary response.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to spawn the MCP server process.
    #[error("failed to spawn MCP server: {0}")]
    SpawnFailed(String),

    /// Failed to communicate with the peer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer sent something that is not valid JSON-RPC / MCP.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer returned an error response.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the peer.
        code: i64,
        /// Error message from the peer.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// The handshake did not complete: peer unreachable, incompatible or timed out.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Operation attempted before the handshake completed.
    #[error("session not ready - call initialize() first")]
    NotReady,

    /// No response arrived within the per-call timeout.
    #[error("no response to '{method}' within {timeout:?}")]
    InvocationTimeout {
        /// The method that timed out.
        method: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The session is closed, or closed while the operation was pending.
    #[error("session closed")]
    SessionClosed,
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a handshake error.
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }
}
