//! CLI command handlers.

pub mod call;
pub mod config;
pub mod serve;
pub mod tools;

use std::sync::Arc;

use anyhow::{Context as _, Result};

use nimbus_config::LoadedConfig;
use nimbus_mcp::McpSession;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Configuration after layering.
    pub loaded: LoadedConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Spawn the configured server and complete the handshake.
    pub async fn connect(&self) -> Result<Arc<McpSession>> {
        let server = self.loaded.config.server_config()?;
        let name = server.name.clone();
        let session = McpSession::connect_stdio(server)
            .await
            .with_context(|| format!("failed to connect to MCP server '{name}'"))?;
        Ok(Arc::new(session))
    }
}

/// Close a session, logging rather than failing on a dirty shutdown.
pub async fn disconnect(session: &McpSession) {
    if let Err(e) = session.close().await {
        tracing::debug!(server = %session.name(), error = %e, "error closing session");
    }
}
