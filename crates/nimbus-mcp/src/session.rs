//! Client-side MCP session.
//!
//! A session owns one transport. A background reader task routes every
//! inbound response to the caller waiting on its correlation id, so any
//! number of calls may be in flight at once and may complete in any order.
//!
//! ```text
//! Disconnected ──initialize()──▶ Handshaking ──InitializeResult──▶ Ready
//!       │                             │                              │
//!       └──────── close() / transport error / malformed frame ───────┴──▶ Closed
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::process::Child;
use tokio::sync::{OnceCell, oneshot};
use tokio::task::JoinHandle;

use crate::codec::Framing;
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, ClientInfo, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ServerInfo, ToolInfo, is_supported_version, methods,
};
use crate::transport::{FrameReader, FrameWriter, McpTransport};

/// Default bound on the whole handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a single request. Longer than the weather provider's
/// own timeout so that provider timeouts come back as tool errors.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// How long `close()` waits for a spawned server to exit after EOF.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Transport type for MCP server connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransportType {
    /// Stdio transport - spawns a child process.
    #[default]
    Stdio,
}

/// Configuration for an MCP server connection.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Unique name for this server.
    pub name: String,
    /// Transport type.
    pub transport: TransportType,
    /// Command to spawn.
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment variables to set.
    pub env: Vec<(String, String)>,
    /// Session behaviour once connected.
    pub session: SessionConfig,
}

impl McpServerConfig {
    /// Create a new server config for stdio transport.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportType::Stdio,
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            session: SessionConfig::default(),
        }
    }

    /// Add arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the session configuration.
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

/// Timeouts and identity for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on the handshake.
    pub handshake_timeout: Duration,
    /// Bound on each request after the handshake.
    pub request_timeout: Duration,
    /// Framing for the spawned server's stdio.
    pub framing: Framing,
    /// How this client introduces itself.
    pub client_info: ClientInfo,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            framing: Framing::default(),
            client_info: ClientInfo::default(),
        }
    }
}

impl SessionConfig {
    /// Set the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the framing.
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, handshake not started.
    Disconnected,
    /// `initialize` sent, waiting for the peer.
    Handshaking,
    /// Handshake complete; tools may be listed and called.
    Ready,
    /// Terminal.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One in-flight request.
struct PendingRequest {
    method: String,
    submitted_at: Instant,
    responder: oneshot::Sender<Result<Value>>,
}

/// Lifecycle state and pending requests share one lock so that
/// registering a request and draining the table on close never interleave.
struct PendingTable {
    state: SessionState,
    entries: HashMap<u64, PendingRequest>,
}

/// State shared between the session handle and its reader task.
struct Shared {
    name: String,
    table: Mutex<PendingTable>,
    writer: tokio::sync::Mutex<Option<FrameWriter>>,
    next_id: AtomicU64,
}

impl Shared {
    fn state(&self) -> SessionState {
        self.table.lock().state
    }

    /// Allocate an id and register a waiter for it.
    fn register(&self, method: &str) -> Result<(u64, oneshot::Receiver<Result<Value>>)> {
        let mut table = self.table.lock();
        if table.state == SessionState::Closed {
            return Err(McpError::SessionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (responder, receiver) = oneshot::channel();
        table.entries.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                submitted_at: Instant::now(),
                responder,
            },
        );
        Ok((id, receiver))
    }

    /// Deliver a response to whoever is waiting on its id.
    fn resolve(&self, response: JsonRpcResponse) {
        let id = response.id;
        let Some(pending) = self.table.lock().entries.remove(&id) else {
            tracing::debug!(
                server = %self.name,
                id,
                "dropping response for unknown or expired request"
            );
            return;
        };

        tracing::trace!(
            server = %self.name,
            id,
            method = %pending.method,
            elapsed_ms = pending.submitted_at.elapsed().as_millis() as u64,
            "response matched"
        );

        let outcome = response.into_result().map_err(McpError::from);
        // The waiter may have given up in the meantime.
        let _ = pending.responder.send(outcome);
    }

    /// Move to `Closed` and fail every pending request.
    ///
    /// Returns `None` if the session was already closed.
    fn shut_down(&self, reason: &str) -> Option<usize> {
        let drained: Vec<PendingRequest> = {
            let mut table = self.table.lock();
            if table.state == SessionState::Closed {
                return None;
            }
            table.state = SessionState::Closed;
            table.entries.drain().map(|(_, pending)| pending).collect()
        };

        let cancelled = drained.len();
        for pending in drained {
            let _ = pending.responder.send(Err(McpError::SessionClosed));
        }

        tracing::info!(server = %self.name, reason, cancelled, "MCP session closed");
        Some(cancelled)
    }

    /// Write one message. A failed write closes the session.
    async fn send(&self, message: JsonRpcMessage) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(McpError::SessionClosed);
        };

        if let Err(e) = sink.send(message).await {
            writer.take();
            drop(writer);
            self.shut_down("write failed");
            return Err(McpError::transport(format!("failed to send message: {e}")));
        }
        Ok(())
    }

    /// Send a request and wait for its response.
    ///
    /// The pending entry is removed on every exit path, including the
    /// caller dropping this future.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let (id, receiver) = self.register(method)?;
        let _guard = PendingGuard { shared: self, id };

        tracing::trace!(server = %self.name, id, method, "sending MCP request");
        self.send(JsonRpcRequest::new(id, method, params).into())
            .await?;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::warn!(
                        server = %self.name,
                        id,
                        method,
                        timeout_ms = limit.as_millis() as u64,
                        "MCP request timed out"
                    );
                    return Err(McpError::InvocationTimeout {
                        method: method.to_string(),
                        timeout: limit,
                    });
                }
            },
            None => receiver.await,
        };

        received.unwrap_or(Err(McpError::SessionClosed))
    }

    /// Answer a request the server sent to us.
    async fn answer_peer_request(&self, request: JsonRpcRequest) {
        let response = if request.method == methods::PING {
            JsonRpcResponse::success(request.id, serde_json::json!({}))
        } else {
            tracing::debug!(
                server = %self.name,
                method = %request.method,
                "rejecting unsupported server request"
            );
            JsonRpcResponse::failure(request.id, JsonRpcError::method_not_found(&request.method))
        };

        if let Err(e) = self.send(response.into()).await {
            tracing::warn!(server = %self.name, error = %e, "failed to answer server request");
        }
    }
}

/// Removes a pending entry when the waiting call finishes or is dropped.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.table.lock().entries.remove(&self.id);
    }
}

/// Route inbound frames until the stream ends or turns to garbage.
async fn read_loop(shared: Arc<Shared>, mut reader: FrameReader) {
    let reason = loop {
        let frame = match reader.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                tracing::warn!(server = %shared.name, error = %e, "MCP transport read failed");
                break "transport error";
            }
            None => break "transport closed",
        };

        match JsonRpcMessage::from_slice(&frame) {
            Ok(JsonRpcMessage::Response(response)) => shared.resolve(response),
            Ok(JsonRpcMessage::Request(request)) => {
                // Replies wait on the writer; routing responses must not.
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.answer_peer_request(request).await });
            }
            Ok(JsonRpcMessage::Notification(notification)) => {
                tracing::debug!(
                    server = %shared.name,
                    method = %notification.method,
                    "ignoring server notification"
                );
            }
            Err(e) => {
                tracing::warn!(server = %shared.name, error = %e, "malformed message from server");
                break "malformed message";
            }
        }
    };

    shared.shut_down(reason);
}

/// A client session with a single MCP server.
pub struct McpSession {
    shared: Arc<Shared>,
    config: SessionConfig,
    reader: Mutex<Option<FrameReader>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
    init: OnceLock<InitializeResult>,
    catalog: OnceCell<Vec<ToolInfo>>,
}

impl McpSession {
    /// Create a session over `transport` without starting the handshake.
    pub fn new(name: impl Into<String>, transport: McpTransport, config: SessionConfig) -> Self {
        let (reader, writer, child) = transport.into_parts();
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                table: Mutex::new(PendingTable {
                    state: SessionState::Disconnected,
                    entries: HashMap::new(),
                }),
                writer: tokio::sync::Mutex::new(Some(writer)),
                next_id: AtomicU64::new(1),
            }),
            config,
            reader: Mutex::new(Some(reader)),
            reader_task: Mutex::new(None),
            child: Mutex::new(child),
            init: OnceLock::new(),
            catalog: OnceCell::new(),
        }
    }

    /// Create a session over `transport` and complete the handshake.
    pub async fn connect(
        name: impl Into<String>,
        transport: McpTransport,
        config: SessionConfig,
    ) -> Result<Self> {
        let session = Self::new(name, transport, config);
        session.initialize().await?;
        Ok(session)
    }

    /// Spawn the configured server over stdio and complete the handshake.
    pub async fn connect_stdio(config: McpServerConfig) -> Result<Self> {
        let transport = McpTransport::spawn_stdio(
            &config.command,
            &config.args,
            &config.env,
            config.session.framing,
        )?;

        tracing::info!(
            server = %config.name,
            command = %config.command,
            "connected to MCP server via stdio"
        );

        Self::connect(config.name, transport, config.session).await
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Server info (after the handshake).
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.init.get().map(|init| &init.server_info)
    }

    /// Whether the session can still carry requests.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Number of requests currently waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.table.lock().entries.len()
    }

    /// Perform the handshake.
    ///
    /// Calling this again on a ready session returns the cached server info.
    pub async fn initialize(&self) -> Result<&ServerInfo> {
        {
            let mut table = self.shared.table.lock();
            match table.state {
                SessionState::Disconnected => table.state = SessionState::Handshaking,
                SessionState::Ready => {
                    return self.server_info().ok_or(McpError::NotReady);
                }
                SessionState::Handshaking => {
                    return Err(McpError::handshake("handshake already in progress"));
                }
                SessionState::Closed => return Err(McpError::SessionClosed),
            }
        }

        let Some(reader) = self.reader.lock().take() else {
            self.shared.shut_down("transport reader unavailable");
            return Err(McpError::handshake("transport reader unavailable"));
        };
        let handle = tokio::spawn(read_loop(Arc::clone(&self.shared), reader));
        *self.reader_task.lock() = Some(handle);

        let limit = self.config.handshake_timeout;
        let outcome = match tokio::time::timeout(limit, self.handshake()).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(McpError::Handshake(msg))) => Err(McpError::Handshake(msg)),
            Ok(Err(e)) => Err(McpError::handshake(e.to_string())),
            Err(_) => Err(McpError::handshake(format!(
                "no response from server within {limit:?}"
            ))),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(server = %self.name(), error = %e, "MCP handshake failed");
                if let Err(close_err) = self.close().await {
                    tracing::debug!(server = %self.name(), error = %close_err, "close after failed handshake");
                }
                return Err(e);
            }
        };

        let init = self.init.get_or_init(|| result);
        {
            let mut table = self.shared.table.lock();
            if table.state != SessionState::Handshaking {
                return Err(McpError::SessionClosed);
            }
            table.state = SessionState::Ready;
        }

        tracing::info!(
            server = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "MCP server initialized"
        );

        Ok(&init.server_info)
    }

    async fn handshake(&self) -> Result<InitializeResult> {
        let params = InitializeParams::new(self.config.client_info.clone());
        let value = self
            .shared
            .request(methods::INITIALIZE, Some(serde_json::to_value(&params)?), None)
            .await?;

        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| McpError::handshake(format!("malformed initialize result: {e}")))?;

        if !is_supported_version(&result.protocol_version) {
            return Err(McpError::handshake(format!(
                "unsupported protocol version '{}'",
                result.protocol_version
            )));
        }

        self.shared
            .send(JsonRpcNotification::new(methods::INITIALIZED, None).into())
            .await?;

        Ok(result)
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            SessionState::Ready => Ok(()),
            SessionState::Closed => Err(McpError::SessionClosed),
            SessionState::Disconnected | SessionState::Handshaking => Err(McpError::NotReady),
        }
    }

    /// List the tools the server advertises.
    ///
    /// The catalog is fetched once per session; later calls return the cached copy.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        self.ensure_ready()?;

        let tools = self
            .catalog
            .get_or_try_init(|| async {
                let value = self
                    .shared
                    .request(methods::TOOLS_LIST, None, Some(self.config.request_timeout))
                    .await?;
                let list: ListToolsResult = serde_json::from_value(value)
                    .map_err(|e| McpError::protocol(format!("malformed tools/list result: {e}")))?;

                tracing::debug!(
                    server = %self.name(),
                    tool_count = list.tools.len(),
                    "listed MCP tools"
                );
                Ok::<_, McpError>(list.tools)
            })
            .await?;

        Ok(tools.clone())
    }

    /// Call a tool on the server.
    ///
    /// A tool that fails at its own job still returns `Ok` with
    /// [`CallToolResult::is_error`] set; `Err` means the protocol failed.
    ///
    /// # Arguments
    /// * `name` - The name of the tool to call
    /// * `arguments` - The arguments to pass to the tool
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        self.ensure_ready()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let value = self
            .shared
            .request(
                methods::TOOLS_CALL,
                Some(serde_json::to_value(&params)?),
                Some(self.config.request_timeout),
            )
            .await?;
        let result: CallToolResult = serde_json::from_value(value)
            .map_err(|e| McpError::protocol(format!("malformed tools/call result: {e}")))?;

        if result.is_error() {
            tracing::warn!(server = %self.name(), tool = %name, "tool call returned error");
        } else {
            tracing::debug!(server = %self.name(), tool = %name, "tool call succeeded");
        }

        Ok(result)
    }

    /// Send a ping and wait for the reply.
    pub async fn ping(&self) -> Result<()> {
        self.ensure_ready()?;
        self.shared
            .request(methods::PING, None, Some(self.config.request_timeout))
            .await
            .map(|_| ())
    }

    /// Close the session.
    ///
    /// Every pending request fails with [`McpError::SessionClosed`]. Closing
    /// twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        self.shared.shut_down("closed by client");

        if let Some(handle) = self.reader_task.lock().take() {
            handle.abort();
        }

        // Closing the writer sends EOF, which lets a well-behaved server exit.
        match tokio::time::timeout(SHUTDOWN_GRACE, self.shared.writer.lock()).await {
            Ok(mut writer) => {
                if let Some(mut sink) = writer.take() {
                    if let Err(e) = SinkExt::<JsonRpcMessage>::close(&mut sink).await {
                        tracing::debug!(server = %self.name(), error = %e, "closing writer");
                    }
                }
            }
            Err(_) => tracing::warn!(server = %self.name(), "writer busy during close"),
        }

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(server = %self.name(), %status, "MCP server exited");
                }
                _ => {
                    tracing::debug!(server = %self.name(), "killing MCP server");
                    child.kill().await?;
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish_non_exhaustive()
    }
}

impl Drop for McpSession {
    fn drop(&mut self) {
        self.shared.shut_down("session dropped");
        if let Some(handle) = self.reader_task.lock().take() {
            handle.abort();
        }
        // A spawned child is killed by `kill_on_drop`.
    }
}
