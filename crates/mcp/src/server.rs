//! In-process MCP server for tests.
//!
//! Serves a fixed set of scripted tools over any [`McpTransport`], so the
//! client can be exercised without spawning an interpreter. Enabled by the
//! `test-utils` feature.

use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::error::McpError;
use crate::transport::McpTransport;
use crate::types::*;

type Handler = Box<dyn Fn(&Value) -> Result<String, String> + Send + Sync>;

/// Every `tools/call` the server received, as `(name, arguments)`.
pub type CallLog = Arc<Mutex<Vec<(String, Value)>>>;

struct ScriptedTool {
    info: ToolInfo,
    handler: Handler,
}

/// MCP server answering from scripted tool handlers.
pub struct McpServer {
    server_name: String,
    tools: Vec<ScriptedTool>,
    page_size: Option<usize>,
    chatter: bool,
    pings_sent: u64,
    calls: CallLog,
}

impl McpServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            server_name: name.into(),
            tools: Vec::new(),
            page_size: None,
            chatter: false,
            pings_sent: 0,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a tool. `handler` receives the call arguments; `Err` text is
    /// reported back as an error-flagged result.
    pub fn with_tool<F>(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(&Value) -> Result<String, String> + Send + Sync + 'static,
    {
        self.tools.push(ScriptedTool {
            info: ToolInfo {
                name: name.into(),
                description: description.into(),
                input_schema,
            },
            handler: Box::new(handler),
        });
        self
    }

    /// Split `tools/list` into pages of `size` tools.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Precede every response with a log notification and a `ping` request,
    /// as chatty servers do.
    pub fn with_chatter(mut self) -> Self {
        self.chatter = true;
        self
    }

    /// Shared handle on the calls received so far.
    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }

    /// Serve requests until the transport closes.
    pub async fn run<T: McpTransport + ?Sized>(&mut self, transport: &mut T) -> Result<(), McpError> {
        tracing::info!(server = %self.server_name, "MCP test server starting");

        while let Some(line) = transport.receive().await? {
            let message = match IncomingMessage::parse(&line) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse JSON-RPC message");
                    let err = McpError::JsonParse(e).to_rpc_error();
                    let resp = JsonRpcResponse::error(RpcId::Number(0), err.code, err.message);
                    transport.send(&serde_json::to_string(&resp)?).await?;
                    continue;
                }
            };

            let request = match message {
                IncomingMessage::Request(request) => request,
                IncomingMessage::Notification(notif) => {
                    tracing::debug!(method = %notif.method, "Client notification");
                    continue;
                }
                // Answers to our own pings.
                IncomingMessage::Response(_) => continue,
            };

            if self.chatter {
                self.send_chatter(transport).await?;
            }
            let response = self.handle_request(&request);
            transport.send(&serde_json::to_string(&response)?).await?;
        }

        tracing::info!("Transport closed, shutting down");
        Ok(())
    }

    async fn send_chatter<T: McpTransport + ?Sized>(&mut self, transport: &mut T) -> Result<(), McpError> {
        let log = JsonRpcNotification::new(
            "notifications/message",
            Some(serde_json::json!({"level": "info", "data": "working"})),
        );
        transport.send(&serde_json::to_string(&log)?).await?;

        self.pings_sent += 1;
        let ping = JsonRpcRequest::new(RpcId::String(format!("srv-{}", self.pings_sent)), "ping", None);
        transport.send(&serde_json::to_string(&ping)?).await
    }

    /// Handle a single JSON-RPC request and produce a response.
    pub fn handle_request(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(),
            "tools/list" => self.list_tools(&request.params),
            "tools/call" => self.call_tool(&request.params),
            "ping" => Ok(serde_json::json!({})),
            method => Err(McpError::MethodNotFound(method.to_string())),
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                let err = e.to_rpc_error();
                JsonRpcResponse::error(id, err.code, err.message)
            }
        }
    }

    fn initialize(&self) -> Result<Value, McpError> {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ServerInfo {
                name: self.server_name.clone(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        };
        Ok(serde_json::to_value(result)?)
    }

    fn list_tools(&self, params: &Option<Value>) -> Result<Value, McpError> {
        let params: ListToolsParams = match params {
            Some(p) => serde_json::from_value(p.clone()).map_err(|e| McpError::InvalidParams(e.to_string()))?,
            None => ListToolsParams::default(),
        };
        let start = match params.cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| McpError::InvalidParams(format!("bad cursor: {}", cursor)))?,
            None => 0,
        };
        let end = match self.page_size {
            Some(size) => (start + size).min(self.tools.len()),
            None => self.tools.len(),
        };

        let result = ListToolsResult {
            tools: self
                .tools
                .get(start..end)
                .unwrap_or_default()
                .iter()
                .map(|t| t.info.clone())
                .collect(),
            next_cursor: (end < self.tools.len()).then(|| end.to_string()),
        };
        Ok(serde_json::to_value(result)?)
    }

    fn call_tool(&self, params: &Option<Value>) -> Result<Value, McpError> {
        let params = params
            .as_ref()
            .ok_or_else(|| McpError::InvalidParams("missing params".to_string()))?;
        let call: CallToolParams =
            serde_json::from_value(params.clone()).map_err(|e| McpError::InvalidParams(e.to_string()))?;

        tracing::debug!(tool = %call.name, "Handling tools/call");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((call.name.clone(), call.arguments.clone()));
        }

        let tool = self
            .tools
            .iter()
            .find(|t| t.info.name == call.name)
            .ok_or_else(|| McpError::ToolNotFound(call.name.clone()))?;

        let result = match (tool.handler)(&call.arguments) {
            Ok(text) => CallToolResult {
                content: vec![ToolContent::Text { text }],
                is_error: false,
            },
            Err(text) => CallToolResult {
                content: vec![ToolContent::Text { text }],
                is_error: true,
            },
        };
        Ok(serde_json::to_value(result)?)
    }
}
