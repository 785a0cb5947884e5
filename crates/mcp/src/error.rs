//! Error types for the MCP crate.

use std::time::Duration;

use toolchat_runtime::SessionError;

use crate::types::{error_codes, JsonRpcError};

/// Errors that can occur during MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The tool server path was rejected before anything was spawned.
    #[error("Invalid tool server script: {0}")]
    InvalidInput(String),

    /// Spawning the server or completing the handshake failed.
    #[error("Failed to connect to tool server: {0}")]
    ConnectionFailed(String),

    /// Failed to parse JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A message was well-formed JSON but not what the protocol requires.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport I/O error.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The server closed its end of the channel.
    #[error("Tool server closed the connection")]
    Closed,

    /// No response within the configured request timeout.
    #[error("Tool server did not respond within {0:?}")]
    Timeout(Duration),

    /// The server returned a JSON-RPC error for a request.
    #[error("Server error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The requested method is not supported.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters for a method.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// The requested tool is not offered by the server.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The client was disconnected.
    #[error("Not connected to a tool server")]
    NotConnected,
}

impl McpError {
    /// Convert to a JSON-RPC error object.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let (code, message) = match self {
            McpError::JsonParse(_) => (error_codes::PARSE_ERROR, self.to_string()),
            McpError::MethodNotFound(_) => (error_codes::METHOD_NOT_FOUND, self.to_string()),
            McpError::InvalidParams(_) => (error_codes::INVALID_PARAMS, self.to_string()),
            McpError::ToolNotFound(_) => (error_codes::INVALID_PARAMS, self.to_string()),
            _ => (error_codes::INTERNAL_ERROR, self.to_string()),
        };
        JsonRpcError {
            code,
            message,
            data: None,
        }
    }
}

impl From<McpError> for SessionError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Timeout(limit) => SessionError::Timeout(limit),
            McpError::ToolNotFound(name) => SessionError::ToolNotFound(name),
            McpError::NotConnected => SessionError::NotConnected,
            McpError::JsonParse(_)
            | McpError::Protocol(_)
            | McpError::Rpc { .. }
            | McpError::MethodNotFound(_)
            | McpError::InvalidParams(_) => SessionError::Protocol(err.to_string()),
            McpError::Transport(io) => SessionError::Transport(io.to_string()),
            McpError::Closed
            | McpError::InvalidInput(_)
            | McpError::ConnectionFailed(_) => SessionError::Transport(err.to_string()),
        }
    }
}
