//! MCP (Model Context Protocol) session layer for Nimbus.
//!
//! This crate carries both ends of the protocol: [`McpSession`] connects to a
//! server, performs the handshake and correlates concurrent tool calls, while
//! [`McpServer`] hosts [`ToolHandler`]s and answers a client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpSession                          McpServer              │
//! │  - initialize, tools/list (cached)   - dispatch loop        │
//! │  - tools/call, pending-id table      - ToolHandler per tool │
//! │  - reader task, close/cancel         - concurrent calls     │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpTransport + McpCodec                                    │
//! │  - JSON-RPC 2.0, newline or Content-Length framing          │
//! │  - Child process stdio, own stdio, or any async stream      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use nimbus_mcp::{McpServerConfig, McpSession};
//!
//! let config = McpServerConfig::new("weather", "nimbus").with_arg("serve");
//! let session = McpSession::connect_stdio(config).await?;
//!
//! for tool in session.list_tools().await? {
//!     println!("Tool: {} - {:?}", tool.name, tool.description);
//! }
//!
//! let result = session
//!     .call_tool("get_us_weather", Some(json!({"city_query": "Santa Clara, CA"})))
//!     .await?;
//! println!("Result: {:?}", result.text());
//! ```
//!
//! # MCP Protocol
//!
//! The protocol flow is:
//! 1. Client sends `initialize` with its protocol version and info
//! 2. Server responds with its capabilities
//! 3. Client sends `notifications/initialized`
//! 4. Client can now call `tools/list` and `tools/call`
//!
//! Responses are matched to requests by id, never by order.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

// Re-export main types
pub use codec::{Framing, McpCodec};
pub use error::{McpError, Result};
pub use protocol::{
    CallToolParams, CallToolResult, ClientInfo, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    MCP_PROTOCOL_VERSION, ServerCapabilities, ServerInfo, ToolContent, ToolInfo,
    ToolsCapability,
};
pub use server::{McpServer, ToolHandler};
pub use session::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, McpServerConfig, McpSession,
    SessionConfig, SessionState, TransportType,
};
pub use transport::McpTransport;
