//! Agent-facing tool layer for Nimbus.
//!
//! This crate is the seam between a reasoning agent and remote capabilities:
//! the agent sees [`Tool`]s in a [`ToolRegistry`], and each remote MCP tool
//! reaches it through an [`McpToolAdapter`].
//!
//! # Architecture
//!
//! ```text
//!   agent loop
//!       │  execute(params, ctx)
//!       ▼
//! ┌──────────────┐      ┌────────────────┐      ┌────────────┐
//! │ ToolRegistry │ ───▶ │ McpToolAdapter │ ───▶ │ McpSession │
//! └──────────────┘      │ (Weak session) │      │(nimbus-mcp)│
//!                       └────────────────┘      └────────────┘
//! ```

pub mod error;
pub mod mcp;
pub mod tool;

// Re-export core types
pub use error::{AgentError, Result};

// Re-export tool types
pub use tool::{
    ParamExt, ParamResult, ParameterValidationError, Tool, ToolContext, ToolDefinition,
    ToolRegistry, ToolResult,
};

pub use mcp::McpToolAdapter;
pub use tokio_util::sync::CancellationToken;
