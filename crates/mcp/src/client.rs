//! MCP client implementation.
//!
//! Launches a tool server script as a child process, performs the MCP
//! handshake over its stdio and exposes `tools/list` / `tools/call` through
//! the [`ToolSession`] trait the conversation engine consumes.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use toolchat_runtime::{SessionError, ToolArguments, ToolDefinition, ToolResult, ToolSession};

use crate::error::McpError;
use crate::transport::{ChildTransport, McpTransport};
use crate::types::*;

/// How long a server gets to exit on its own after its stdin closes.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Launchers and time limits for a tool server.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Interpreter for `.py` scripts.
    pub python: String,
    /// Interpreter for `.js` scripts.
    pub node: String,
    /// Limit for each request/response round trip.
    pub request_timeout: Duration,
    /// Limit for the whole handshake (initialize + first tool listing).
    pub handshake_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            node: "node".to_string(),
            request_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(30),
        }
    }
}

impl LaunchOptions {
    /// Pick the interpreter for a script by its extension.
    pub fn launcher_for(&self, script: &Path) -> Result<&str, McpError> {
        match script.extension().and_then(|ext| ext.to_str()) {
            Some("py") => Ok(&self.python),
            Some("js") => Ok(&self.node),
            _ => Err(McpError::InvalidInput(format!(
                "{}: tool server script must be a .py or .js file",
                script.display()
            ))),
        }
    }
}

/// An MCP client connected to one tool server.
///
/// Requests are serialised: the transport lock is held for a whole round
/// trip, so responses never interleave.
pub struct McpClient {
    child: Option<Child>,
    transport: Mutex<Option<Box<dyn McpTransport>>>,
    next_id: AtomicI64,
    request_timeout: Duration,
    server_info: Option<ServerInfo>,
    stderr_task: Option<JoinHandle<()>>,
}

impl McpClient {
    /// Launch `script` with the interpreter matching its extension and
    /// complete the MCP handshake.
    ///
    /// The extension and the file's existence are checked before anything is
    /// spawned. If the handshake fails the child is stopped before the error
    /// is returned.
    pub async fn connect(script: &Path, options: &LaunchOptions) -> Result<Self, McpError> {
        let launcher = options.launcher_for(script)?;
        if !script.is_file() {
            return Err(McpError::InvalidInput(format!(
                "{}: tool server script not found",
                script.display()
            )));
        }

        tracing::info!(launcher = %launcher, script = %script.display(), "Spawning tool server");

        let mut child = Command::new(launcher)
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::ConnectionFailed(format!("failed to spawn {}: {}", launcher, e)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        tracing::warn!(line = %trimmed, "tool server stderr");
                    }
                }
            })
        });

        let mut client = Self::unconnected(options.request_timeout);
        client.child = Some(child);
        client.stderr_task = stderr_task;

        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            client.disconnect().await;
            return Err(McpError::ConnectionFailed(
                "failed to capture tool server stdio".to_string(),
            ));
        };
        *client.transport.get_mut() = Some(Box::new(ChildTransport::new(stdin, stdout)));

        client.handshake(options.handshake_timeout).await?;
        Ok(client)
    }

    /// Complete the MCP handshake over an already established transport.
    pub async fn with_transport(
        transport: Box<dyn McpTransport>,
        options: &LaunchOptions,
    ) -> Result<Self, McpError> {
        let mut client = Self::unconnected(options.request_timeout);
        *client.transport.get_mut() = Some(transport);
        client.handshake(options.handshake_timeout).await?;
        Ok(client)
    }

    fn unconnected(request_timeout: Duration) -> Self {
        Self {
            child: None,
            transport: Mutex::new(None),
            next_id: AtomicI64::new(1),
            request_timeout,
            server_info: None,
            stderr_task: None,
        }
    }

    /// Run `initialize` and a first tool listing under `limit`; on any
    /// failure the client is disconnected and `ConnectionFailed` returned.
    async fn handshake(&mut self, limit: Duration) -> Result<(), McpError> {
        let outcome = tokio::time::timeout(limit, async {
            self.initialize().await?;
            self.list_tools().await
        })
        .await;

        let failure = match outcome {
            Ok(Ok(tools)) => {
                let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
                tracing::info!(?names, "Connected to tool server");
                return Ok(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("handshake timed out after {:?}", limit),
        };

        self.disconnect().await;
        Err(McpError::ConnectionFailed(failure))
    }

    /// Perform the MCP initialization exchange.
    async fn initialize(&mut self) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: "toolchat".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        };

        let resp = self.request("initialize", Some(serde_json::to_value(params)?)).await?;
        if let Some(err) = resp.error {
            return Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result: InitializeResult = serde_json::from_value(
            resp.result
                .ok_or_else(|| McpError::Protocol("initialize response has no result".into()))?,
        )?;
        tracing::info!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP client initialized"
        );
        self.server_info = Some(result.server_info);

        self.notify("notifications/initialized", None).await
    }

    /// Send a JSON-RPC request and wait for the response with the same id.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(RpcId::Number(id), method, params);
        let json = serde_json::to_string(&request)?;

        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut().ok_or(McpError::NotConnected)?;

        tracing::debug!(method = %method, id = %id, "Sending request");
        let round_trip = async {
            transport.send(&json).await?;
            read_response(transport.as_mut(), &RpcId::Number(id)).await
        };
        tokio::time::timeout(self.request_timeout, round_trip)
            .await
            .map_err(|_| McpError::Timeout(self.request_timeout))?
    }

    /// Send a JSON-RPC notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notif = JsonRpcNotification::new(method, params);
        let json = serde_json::to_string(&notif)?;

        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut().ok_or(McpError::NotConnected)?;
        transport.send(&json).await
    }

    /// Fetch every tool the server offers, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = ListToolsParams { cursor: cursor.take() };
            let resp = self
                .request("tools/list", Some(serde_json::to_value(params)?))
                .await?;
            if let Some(err) = resp.error {
                return Err(McpError::Rpc {
                    code: err.code,
                    message: err.message,
                });
            }
            let result: ListToolsResult = serde_json::from_value(
                resp.result
                    .ok_or_else(|| McpError::Protocol("tools/list response has no result".into()))?,
            )?;

            tools.extend(result.tools.into_iter().map(ToolDefinition::from));
            match result.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(count = tools.len(), "Tool discovery complete");
        Ok(tools)
    }

    /// Call a tool on the remote MCP server.
    ///
    /// Failures reported by the tool come back as an error-flagged
    /// [`ToolResult`]; only an unknown tool name is an `Err`.
    pub async fn call_tool(&self, name: &str, arguments: &ToolArguments) -> Result<ToolResult, McpError> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments: arguments.to_value(),
        };

        let resp = self
            .request("tools/call", Some(serde_json::to_value(params)?))
            .await?;
        if let Some(err) = resp.error {
            if err.code == error_codes::METHOD_NOT_FOUND || reports_unknown_tool(&err.message) {
                return Err(McpError::ToolNotFound(name.to_string()));
            }
            return Ok(ToolResult::error(format!("Tool error: {}", err.message)));
        }

        let result: CallToolResult = serde_json::from_value(
            resp.result
                .ok_or_else(|| McpError::Protocol("tools/call response has no result".into()))?,
        )?;
        let text = result.text();

        if result.is_error {
            if reports_unknown_tool(&text) {
                return Err(McpError::ToolNotFound(name.to_string()));
            }
            return Ok(ToolResult::error(text));
        }
        Ok(ToolResult::text(text))
    }

    /// Server name and version reported during the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Whether the client still owns a live channel.
    pub fn is_connected(&mut self) -> bool {
        self.transport.get_mut().is_some()
    }

    /// Close the channel and stop the server process.
    ///
    /// Closing stdin asks the server to exit; it is killed if it has not done
    /// so within a short grace period. Idempotent.
    pub async fn disconnect(&mut self) {
        let had_transport = self.transport.get_mut().take().is_some();

        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::info!(?pid, %status, "Tool server exited");
                }
                _ => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(?pid, error = %e, "Failed to kill tool server");
                    } else {
                        tracing::info!(?pid, "Tool server killed");
                    }
                }
            }
        } else if had_transport {
            tracing::info!("MCP client disconnected");
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        // Best-effort kill when the owner never called `disconnect`.
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl ToolSession for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, SessionError> {
        Ok(McpClient::list_tools(self).await?)
    }

    async fn invoke(&self, name: &str, arguments: &ToolArguments) -> Result<ToolResult, SessionError> {
        Ok(self.call_tool(name, arguments).await?)
    }
}

/// Read messages until the response to `id` arrives.
///
/// Notifications are logged and skipped, `ping` requests from the server are
/// answered, and responses to other ids (left over from a timed-out request)
/// are discarded.
async fn read_response(
    transport: &mut dyn McpTransport,
    id: &RpcId,
) -> Result<JsonRpcResponse, McpError> {
    loop {
        let line = transport.receive().await?.ok_or(McpError::Closed)?;
        let message = IncomingMessage::parse(&line)
            .map_err(|e| McpError::Protocol(format!("malformed message from server: {}", e)))?;

        match message {
            IncomingMessage::Response(resp) if resp.id == *id => return Ok(resp),
            IncomingMessage::Response(resp) => {
                tracing::warn!(id = ?resp.id, "Discarding response to an earlier request");
            }
            IncomingMessage::Notification(notif) => {
                tracing::debug!(method = %notif.method, "Server notification");
            }
            IncomingMessage::Request(req) => {
                let reply = if req.method == "ping" {
                    JsonRpcResponse::success(req.id, serde_json::json!({}))
                } else {
                    let err = McpError::MethodNotFound(req.method);
                    JsonRpcResponse::error(req.id, err.to_rpc_error().code, err.to_string())
                };
                transport.send(&serde_json::to_string(&reply)?).await?;
            }
        }
    }
}

fn reports_unknown_tool(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("unknown tool") || lower.contains("tool not found")
}
