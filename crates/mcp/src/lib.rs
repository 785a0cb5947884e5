//! MCP (Model Context Protocol) client for toolchat.
//!
//! Speaks JSON-RPC 2.0 over a child process's stdin/stdout so the
//! conversation engine can list and call the tools of an external tool
//! server (for example a FastMCP Python script).
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **transport**: Pluggable transport layer (child process, channels)
//! - **client**: MCP client owning the server subprocess
//! - **server**: In-process MCP server for tests (`test-utils` feature)
//! - **error**: Unified error types
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use toolchat_mcp::{LaunchOptions, McpClient};
//!
//! # async fn example() {
//! let mut client = McpClient::connect(Path::new("servers/tushareserver.py"), &LaunchOptions::default())
//!     .await
//!     .unwrap();
//! let tools = client.list_tools().await.unwrap();
//! client.disconnect().await;
//! # }
//! ```

pub mod types;
pub mod transport;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod server;

pub use types::*;
pub use transport::{ChannelTransport, ChildTransport, McpTransport};
pub use client::{LaunchOptions, McpClient};
pub use error::McpError;
#[cfg(any(test, feature = "test-utils"))]
pub use server::McpServer;
