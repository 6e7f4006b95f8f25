//! MCP tool adapter for integrating remote tools with the Nimbus tool framework.
//!
//! [`McpToolAdapter`] turns one entry of a session's tool catalog into a local
//! [`Tool`]. It holds only a weak reference to the session: the session owns
//! the connection, and once it is closed or dropped every adapter built from
//! it fails with [`McpError::SessionClosed`].
//!
//! # Example
//!
//! ```rust,ignore
//! use nimbus_agent::{ToolRegistry, mcp::McpToolAdapter};
//! use nimbus_mcp::{McpServerConfig, McpSession};
//! use std::sync::Arc;
//!
//! let config = McpServerConfig::new("weather", "nimbus").with_arg("serve");
//! let session = Arc::new(McpSession::connect_stdio(config).await?);
//!
//! let mut registry = ToolRegistry::new();
//! for adapter in McpToolAdapter::from_session(&session).await? {
//!     registry.register(adapter);
//! }
//! ```

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use nimbus_mcp::{CallToolResult, McpError, McpSession, ToolContent, ToolInfo};

use crate::error::{AgentError, Result};
use crate::tool::{ParamExt, Tool, ToolContext, ToolResult};

/// Delimiter used in namespaced tool names.
pub const NAMESPACE_DELIMITER: &str = ":";

/// Prefix for all MCP tool names.
pub const MCP_PREFIX: &str = "mcp";

/// Input field used when a schema names no string property.
pub const DEFAULT_QUERY_FIELD: &str = "query";

/// Adapter that wraps a remote MCP tool as a local [`Tool`].
///
/// The adapter has no state of its own beyond the descriptor it was built
/// from, and no failure modes of its own: every outcome comes from the
/// session.
pub struct McpToolAdapter {
    /// The fully qualified tool name (e.g., "mcp:weather:get_us_weather").
    full_name: String,
    /// The server name this tool belongs to.
    server_name: String,
    /// The original tool name from the MCP server.
    tool_name: String,
    /// Human-readable description.
    description: String,
    /// JSON Schema for tool parameters.
    parameters: Value,
    /// The free-text input field `call` fills in.
    query_field: String,
    session: Weak<McpSession>,
}

impl McpToolAdapter {
    /// Create a new MCP tool adapter.
    ///
    /// # Arguments
    /// * `session` - The session the tool was discovered on
    /// * `tool_info` - Tool information from the MCP server
    pub fn new(session: &Arc<McpSession>, tool_info: &ToolInfo) -> Self {
        let server_name = session.name().to_string();
        let full_name = format!(
            "{}{}{}{}{}",
            MCP_PREFIX, NAMESPACE_DELIMITER, server_name, NAMESPACE_DELIMITER, tool_info.name
        );

        let description = tool_info
            .description
            .clone()
            .unwrap_or_else(|| format!("MCP tool: {}", tool_info.name));

        // inputSchema is already JSON Schema; pass it through untouched.
        let parameters = tool_info.input_schema.clone().unwrap_or_else(|| {
            serde_json::json!({
                "type": "object",
                "properties": {}
            })
        });

        Self {
            full_name,
            server_name,
            tool_name: tool_info.name.clone(),
            description,
            query_field: query_field(&parameters),
            parameters,
            session: Arc::downgrade(session),
        }
    }

    /// Create adapters for every tool the session advertises.
    ///
    /// # Errors
    /// Returns an error if listing tools fails.
    pub async fn from_session(
        session: &Arc<McpSession>,
    ) -> std::result::Result<Vec<Self>, McpError> {
        let tools = session.list_tools().await?;

        tracing::debug!(
            server = %session.name(),
            tool_count = tools.len(),
            "building MCP tool adapters"
        );

        Ok(tools
            .iter()
            .map(|tool_info| Self::new(session, tool_info))
            .collect())
    }

    /// Get the server name this tool belongs to.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Get the original tool name (without namespace).
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// The input field a free-text query is sent in.
    pub fn query_field(&self) -> &str {
        &self.query_field
    }

    /// Check if a tool name matches this adapter's namespaced name.
    ///
    /// Supports matching by:
    /// - Full name: `mcp:weather:get_us_weather`
    /// - Server-qualified: `weather:get_us_weather`
    /// - Original name: `get_us_weather`
    pub fn matches_name(&self, name: &str) -> bool {
        name == self.full_name
            || name
                == format!(
                    "{}{}{}",
                    self.server_name, NAMESPACE_DELIMITER, self.tool_name
                )
            || name == self.tool_name
    }

    /// Invoke the remote tool with a free-text query.
    pub async fn call(&self, query: &str) -> std::result::Result<CallToolResult, McpError> {
        let mut arguments = serde_json::Map::new();
        arguments.insert(self.query_field.clone(), Value::String(query.to_string()));
        self.call_with(Value::Object(arguments)).await
    }

    /// Invoke the remote tool with raw arguments.
    pub async fn call_with(&self, arguments: Value) -> std::result::Result<CallToolResult, McpError> {
        let session = self.session.upgrade().ok_or(McpError::SessionClosed)?;
        session.call_tool(&self.tool_name, Some(arguments)).await
    }

    /// Turn agent-supplied params into tool arguments.
    ///
    /// A bare string is taken as the query; an object must carry the query field.
    fn arguments_from(&self, params: Value) -> Result<Value> {
        match params {
            Value::String(query) => {
                let mut arguments = serde_json::Map::new();
                arguments.insert(self.query_field.clone(), Value::String(query));
                Ok(Value::Object(arguments))
            }
            params => {
                params.required_str(&self.query_field, "free-text input for the tool")?;
                Ok(params)
            }
        }
    }
}

impl std::fmt::Debug for McpToolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolAdapter")
            .field("full_name", &self.full_name)
            .field("server_name", &self.server_name)
            .field("tool_name", &self.tool_name)
            .field("query_field", &self.query_field)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let arguments = self.arguments_from(params)?;

        tracing::debug!(
            server = %self.server_name,
            tool = %self.tool_name,
            "executing MCP tool"
        );

        let outcome = tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(AgentError::Cancelled),
            outcome = self.call_with(arguments) => outcome,
        };

        let mcp_result = match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    server = %self.server_name,
                    tool = %self.tool_name,
                    error = %e,
                    "MCP tool call failed"
                );
                return Ok(ToolResult::error(format!("MCP error: {}", e)));
            }
        };

        Ok(convert_mcp_result(mcp_result))
    }
}

/// Pick the schema property a free-text query goes into.
///
/// The first required string property wins, then the first string property,
/// then [`DEFAULT_QUERY_FIELD`].
pub fn query_field(schema: &Value) -> String {
    let properties = schema.get("properties").and_then(Value::as_object);
    let is_string = |name: &str| {
        properties
            .and_then(|props| props.get(name))
            .and_then(|prop| prop.get("type"))
            .and_then(Value::as_str)
            == Some("string")
    };

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    for name in required {
        if is_string(name) {
            return name.to_string();
        }
    }

    properties
        .into_iter()
        .flat_map(|props| props.keys())
        .find(|name| is_string(name))
        .cloned()
        .unwrap_or_else(|| DEFAULT_QUERY_FIELD.to_string())
}

/// Convert an MCP [`CallToolResult`] to a [`ToolResult`].
fn convert_mcp_result(mcp_result: CallToolResult) -> ToolResult {
    if mcp_result.is_error() {
        let error_text = mcp_result
            .text()
            .unwrap_or_else(|| "Unknown MCP error".to_string());
        return ToolResult::error(error_text);
    }

    // Several content items are joined; non-text items get a placeholder.
    let mut text_parts: Vec<String> = Vec::new();
    let mut has_non_text = false;

    for content in &mcp_result.content {
        match content {
            ToolContent::Text { text } => {
                text_parts.push(text.clone());
            }
            ToolContent::Image { .. } => {
                text_parts.push("[Image content not displayed]".to_string());
                has_non_text = true;
            }
            ToolContent::Resource { uri, text, .. } => {
                if let Some(t) = text {
                    text_parts.push(t.clone());
                } else {
                    text_parts.push(format!("[Resource: {}]", uri));
                    has_non_text = true;
                }
            }
        }
    }

    if text_parts.is_empty() {
        if has_non_text {
            ToolResult::text("[Non-text content returned]")
        } else {
            ToolResult::text("")
        }
    } else {
        ToolResult::text(text_parts.join("\n"))
    }
}
