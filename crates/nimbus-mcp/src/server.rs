//! Serving side of the protocol.
//!
//! [`McpServer`] hosts a set of [`ToolHandler`]s and answers a single client
//! over one transport until the client hangs up.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, ListToolsResult, MCP_PROTOCOL_VERSION,
    ServerCapabilities, ServerInfo, ToolInfo, ToolsCapability, is_supported_version, methods,
};
use crate::transport::{FrameWriter, McpTransport};

/// A capability served over MCP.
///
/// Failures while doing the tool's job are reported in the returned
/// [`CallToolResult`] with `isError` set, not as protocol errors.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Descriptor advertised in `tools/list`.
    fn info(&self) -> ToolInfo;

    /// Run the tool.
    async fn call(&self, arguments: Value) -> CallToolResult;
}

/// An MCP server hosting tool handlers.
pub struct McpServer {
    info: ServerInfo,
    instructions: Option<String>,
    tools: Vec<Arc<dyn ToolHandler>>,
}

impl McpServer {
    /// Create a server with no tools.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: version.into(),
            },
            instructions: None,
            tools: Vec::new(),
        }
    }

    /// Register a tool handler.
    pub fn with_tool<T: ToolHandler + 'static>(self, handler: T) -> Self {
        self.with_tool_arc(Arc::new(handler))
    }

    /// Register a shared tool handler.
    ///
    /// A handler with the same name as an earlier one replaces it in place.
    pub fn with_tool_arc(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        let name = handler.info().name;
        match self.tools.iter().position(|t| t.info().name == name) {
            Some(index) => self.tools[index] = handler,
            None => self.tools.push(handler),
        }
        self
    }

    /// Usage hints returned in the handshake.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Server identity.
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Descriptors of every registered tool, in registration order.
    pub fn tools(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(|t| t.info()).collect()
    }

    /// Serve one client until it closes the stream.
    ///
    /// Tool calls run concurrently; on EOF the server waits for calls still
    /// in flight before returning.
    pub async fn serve(self, transport: McpTransport) -> Result<()> {
        let (mut reader, writer, _child) = transport.into_parts();
        let writer = Arc::new(Mutex::new(writer));

        let catalog = self.tools();
        let handlers: HashMap<String, Arc<dyn ToolHandler>> = self
            .tools
            .iter()
            .map(|t| (t.info().name, Arc::clone(t)))
            .collect();

        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut initialized = false;

        tracing::info!(
            server = %self.info.name,
            tool_count = catalog.len(),
            "MCP server listening"
        );

        let outcome = loop {
            while in_flight.try_join_next().is_some() {}

            let frame = match reader.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            };

            let request = match JsonRpcMessage::from_slice(&frame) {
                Ok(JsonRpcMessage::Request(request)) => request,
                Ok(JsonRpcMessage::Notification(notification)) => {
                    if notification.method == methods::INITIALIZED {
                        tracing::debug!(server = %self.info.name, "client initialized");
                    } else {
                        tracing::debug!(
                            server = %self.info.name,
                            method = %notification.method,
                            "ignoring notification"
                        );
                    }
                    continue;
                }
                Ok(JsonRpcMessage::Response(response)) => {
                    tracing::debug!(server = %self.info.name, id = response.id, "ignoring response");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(server = %self.info.name, error = %e, "skipping unparseable frame");
                    continue;
                }
            };

            let id = request.id;
            let response = match request.method.as_str() {
                methods::INITIALIZE => {
                    let response = self.initialize(&request);
                    if !response.is_error() {
                        initialized = true;
                    }
                    response
                }
                methods::PING => JsonRpcResponse::success(id, serde_json::json!({})),
                methods::TOOLS_LIST | methods::TOOLS_CALL if !initialized => {
                    JsonRpcResponse::failure(
                        id,
                        JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "server not initialized"),
                    )
                }
                methods::TOOLS_LIST => list_tools(id, &catalog),
                methods::TOOLS_CALL => match resolve_call(&request, &handlers) {
                    Ok((handler, params)) => {
                        let writer = Arc::clone(&writer);
                        in_flight.spawn(run_call(id, handler, params, writer));
                        continue;
                    }
                    Err(error) => JsonRpcResponse::failure(id, error),
                },
                other => {
                    tracing::debug!(server = %self.info.name, method = %other, "unknown method");
                    JsonRpcResponse::failure(id, JsonRpcError::method_not_found(other))
                }
            };

            if let Err(e) = respond(&writer, response).await {
                break Err(e);
            }
        };

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(server = %self.info.name, error = %e, "tool call task failed");
            }
        }

        let mut writer = writer.lock().await;
        if let Err(e) = SinkExt::<JsonRpcMessage>::close(&mut *writer).await {
            tracing::debug!(server = %self.info.name, error = %e, "closing writer");
        }

        match &outcome {
            Ok(()) => tracing::info!(server = %self.info.name, "client disconnected"),
            Err(e) => tracing::warn!(server = %self.info.name, error = %e, "MCP server stopped"),
        }
        outcome
    }

    fn initialize(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let params: InitializeParams = match request
            .params
            .clone()
            .map(serde_json::from_value)
            .transpose()
        {
            Ok(Some(params)) => params,
            Ok(None) => InitializeParams::default(),
            Err(e) => {
                return JsonRpcResponse::failure(
                    request.id,
                    JsonRpcError::invalid_params(format!("invalid initialize params: {e}")),
                );
            }
        };

        let protocol_version = if is_supported_version(&params.protocol_version) {
            params.protocol_version
        } else {
            MCP_PROTOCOL_VERSION.to_string()
        };

        tracing::info!(
            server = %self.info.name,
            client = %params.client_info.name,
            protocol = %protocol_version,
            "client handshake"
        );

        let result = InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                ..Default::default()
            },
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        };

        to_response(request.id, &result)
    }
}

fn to_response<T: serde::Serialize>(id: u64, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(
            id,
            JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, format!("serialization failed: {e}")),
        ),
    }
}

fn list_tools(id: u64, catalog: &[ToolInfo]) -> JsonRpcResponse {
    to_response(
        id,
        &ListToolsResult {
            tools: catalog.to_vec(),
        },
    )
}

fn resolve_call(
    request: &JsonRpcRequest,
    handlers: &HashMap<String, Arc<dyn ToolHandler>>,
) -> std::result::Result<(Arc<dyn ToolHandler>, CallToolParams), JsonRpcError> {
    let params: CallToolParams = request
        .params
        .clone()
        .ok_or_else(|| JsonRpcError::invalid_params("missing tools/call params"))
        .and_then(|p| {
            serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(format!("invalid tools/call params: {e}")))
        })?;

    let handler = handlers
        .get(&params.name)
        .cloned()
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

    Ok((handler, params))
}

async fn run_call(
    id: u64,
    handler: Arc<dyn ToolHandler>,
    params: CallToolParams,
    writer: Arc<Mutex<FrameWriter>>,
) {
    let arguments = params
        .arguments
        .unwrap_or_else(|| Value::Object(Default::default()));

    tracing::debug!(id, tool = %params.name, "tool call started");

    let response = match AssertUnwindSafe(handler.call(arguments)).catch_unwind().await {
        Ok(result) => {
            if result.is_error() {
                tracing::debug!(id, tool = %params.name, "tool call returned error");
            }
            to_response(id, &result)
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(id, tool = %params.name, panic = %detail, "tool handler panicked");
            JsonRpcResponse::failure(
                id,
                JsonRpcError::new(
                    JsonRpcError::INTERNAL_ERROR,
                    format!("tool '{}' failed: {detail}", params.name),
                ),
            )
        }
    };

    if let Err(e) = respond(&writer, response).await {
        tracing::warn!(id, tool = %params.name, error = %e, "failed to send tool result");
    }
}

async fn respond(writer: &Mutex<FrameWriter>, response: JsonRpcResponse) -> Result<()> {
    writer
        .lock()
        .await
        .send(response.into())
        .await
        .map_err(|e| McpError::transport(format!("failed to send response: {e}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::{Framing, McpCodec};
    use crate::transport::{BoxedReader, BoxedWriter};

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        fn info(&self) -> ToolInfo {
            ToolInfo::with_text_input("echo", "Echo back", "message", "what to echo")
        }

        async fn call(&self, arguments: Value) -> CallToolResult {
            match arguments["message"].as_str() {
                Some(message) => CallToolResult::success_text(message),
                None => CallToolResult::error_text("missing message"),
            }
        }
    }

    struct Sleepy(Duration);

    #[async_trait]
    impl ToolHandler for Sleepy {
        fn info(&self) -> ToolInfo {
            ToolInfo::with_text_input("sleepy", "Answers late", "message", "anything")
        }

        async fn call(&self, _arguments: Value) -> CallToolResult {
            tokio::time::sleep(self.0).await;
            CallToolResult::success_text("awake")
        }
    }

    struct Panics;

    #[async_trait]
    impl ToolHandler for Panics {
        fn info(&self) -> ToolInfo {
            ToolInfo::with_text_input("panics", "Always panics", "message", "anything")
        }

        async fn call(&self, _arguments: Value) -> CallToolResult {
            panic!("handler blew up")
        }
    }

    struct Client {
        reader: FramedRead<BoxedReader, McpCodec>,
        writer: FramedWrite<BoxedWriter, McpCodec>,
    }

    impl Client {
        async fn request(&mut self, id: u64, method: &str, params: Option<Value>) {
            self.writer
                .send(JsonRpcRequest::new(id, method, params).into())
                .await
                .unwrap();
        }

        async fn response(&mut self) -> JsonRpcResponse {
            let frame = self.reader.next().await.unwrap().unwrap();
            match JsonRpcMessage::from_slice(&frame).unwrap() {
                JsonRpcMessage::Response(response) => response,
                other => panic!("expected response, got {other:?}"),
            }
        }

        async fn handshake(&mut self) {
            let params = serde_json::to_value(InitializeParams::default()).unwrap();
            self.request(0, methods::INITIALIZE, Some(params)).await;
            assert!(!self.response().await.is_error());
        }
    }

    fn start(server: McpServer) -> (Client, tokio::task::JoinHandle<Result<()>>) {
        let (client, remote) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        let (remote_read, remote_write) = tokio::io::split(remote);

        let transport =
            McpTransport::from_streams(remote_read, remote_write, Framing::NewlineDelimited);
        let handle = tokio::spawn(server.serve(transport));

        let client = Client {
            reader: FramedRead::new(Box::new(client_read) as BoxedReader, McpCodec::default()),
            writer: FramedWrite::new(Box::new(client_write) as BoxedWriter, McpCodec::default()),
        };
        (client, handle)
    }

    #[tokio::test]
    async fn test_initialize_echoes_supported_version() {
        let server = McpServer::new("test", "1.2.3").with_instructions("be nice");
        let (mut client, _handle) = start(server);

        client
            .request(
                1,
                methods::INITIALIZE,
                Some(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "tester", "version": "0" }
                })),
            )
            .await;
        let result: InitializeResult =
            serde_json::from_value(client.response().await.into_result().unwrap()).unwrap();
        assert_eq!(result.protocol_version, "2024-11-05");
        assert_eq!(result.server_info.version, "1.2.3");
        assert!(result.capabilities.tools.is_some());
        assert_eq!(result.instructions.as_deref(), Some("be nice"));
    }

    #[tokio::test]
    async fn test_initialize_answers_unknown_version_with_latest() {
        let (mut client, _handle) = start(McpServer::new("test", "0.1.0"));
        client
            .request(
                1,
                methods::INITIALIZE,
                Some(json!({
                    "protocolVersion": "2099-01-01",
                    "clientInfo": { "name": "future", "version": "9" }
                })),
            )
            .await;
        let value = client.response().await.into_result().unwrap();
        assert_eq!(value["protocolVersion"], MCP_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_tools_before_initialize_rejected() {
        let (mut client, _handle) = start(McpServer::new("test", "0.1.0").with_tool(Echo));
        client.request(1, methods::TOOLS_LIST, None).await;
        let err = client.response().await.into_result().unwrap_err();
        assert_eq!(err.code, JsonRpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_list_and_call() {
        let server = McpServer::new("test", "0.1.0").with_tool(Echo).with_tool(Panics);
        let (mut client, _handle) = start(server);
        client.handshake().await;

        client.request(1, methods::TOOLS_LIST, None).await;
        let list: ListToolsResult =
            serde_json::from_value(client.response().await.into_result().unwrap()).unwrap();
        let names: Vec<_> = list.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "panics"]);

        client
            .request(
                2,
                methods::TOOLS_CALL,
                Some(json!({ "name": "echo", "arguments": { "message": "hi" } })),
            )
            .await;
        let result: CallToolResult =
            serde_json::from_value(client.response().await.into_result().unwrap()).unwrap();
        assert_eq!(result.text().unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let (mut client, _handle) = start(McpServer::new("test", "0.1.0").with_tool(Echo));
        client.handshake().await;

        client
            .request(1, methods::TOOLS_CALL, Some(json!({ "name": "nope" })))
            .await;
        let err = client.response().await.into_result().unwrap_err();
        assert_eq!(err.code, JsonRpcError::INVALID_PARAMS);
        assert!(err.message.contains("nope"));

        client.request(2, "resources/list", None).await;
        let err = client.response().await.into_result().unwrap_err();
        assert_eq!(err.code, JsonRpcError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_panicking_handler_yields_internal_error() {
        let (mut client, _handle) = start(McpServer::new("test", "0.1.0").with_tool(Panics));
        client.handshake().await;

        client
            .request(1, methods::TOOLS_CALL, Some(json!({ "name": "panics" })))
            .await;
        let response = client.response().await;
        assert_eq!(response.id, 1);
        let err = response.into_result().unwrap_err();
        assert_eq!(err.code, JsonRpcError::INTERNAL_ERROR);
        assert!(err.message.contains("handler blew up"));

        // The server keeps serving.
        client.request(2, methods::PING, None).await;
        assert!(!client.response().await.is_error());
    }

    #[tokio::test]
    async fn test_garbage_frame_is_skipped() {
        let (mut client, _handle) = start(McpServer::new("test", "0.1.0"));
        {
            use tokio::io::AsyncWriteExt;
            let raw = client.writer.get_mut();
            raw.write_all(b"{not json}\n").await.unwrap();
            raw.flush().await.unwrap();
        }
        client.request(5, methods::PING, None).await;
        assert_eq!(client.response().await.id, 5);
    }

    #[tokio::test]
    async fn test_plain_text_line_is_skipped() {
        let (mut client, _handle) = start(McpServer::new("test", "0.1.0"));
        {
            use tokio::io::AsyncWriteExt;
            let raw = client.writer.get_mut();
            raw.write_all(b"hello from a stray log line\n").await.unwrap();
            raw.flush().await.unwrap();
        }
        client.request(5, methods::PING, None).await;
        assert_eq!(client.response().await.id, 5);
    }

    #[tokio::test]
    async fn test_calls_complete_out_of_order() {
        let server = McpServer::new("test", "0.1.0")
            .with_tool(Echo)
            .with_tool(Sleepy(Duration::from_millis(200)));
        let (mut client, _handle) = start(server);
        client.handshake().await;

        client
            .request(1, methods::TOOLS_CALL, Some(json!({ "name": "sleepy" })))
            .await;
        client
            .request(
                2,
                methods::TOOLS_CALL,
                Some(json!({ "name": "echo", "arguments": { "message": "quick" } })),
            )
            .await;

        assert_eq!(client.response().await.id, 2);
        assert_eq!(client.response().await.id, 1);
    }

    #[tokio::test]
    async fn test_eof_waits_for_in_flight_calls() {
        let server = McpServer::new("test", "0.1.0").with_tool(Sleepy(Duration::from_millis(100)));
        let (mut client, handle) = start(server);
        client.handshake().await;

        client
            .request(1, methods::TOOLS_CALL, Some(json!({ "name": "sleepy" })))
            .await;
        let Client { mut reader, mut writer } = client;
        SinkExt::<JsonRpcMessage>::close(&mut writer).await.unwrap();

        let frame = reader.next().await.unwrap().unwrap();
        let message = JsonRpcMessage::from_slice(&frame).unwrap();
        assert!(matches!(message, JsonRpcMessage::Response(r) if r.id == 1));

        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_duplicate_tool_replaces_in_place() {
        let server = McpServer::new("test", "0.1.0")
            .with_tool(Echo)
            .with_tool(Panics)
            .with_tool(Echo);
        let names: Vec<_> = server.tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo", "panics"]);
    }
}
