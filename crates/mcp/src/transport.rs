//! MCP transport layer.
//!
//! Defines the `McpTransport` trait for sending/receiving JSON-RPC messages,
//! with a `ChildTransport` implementation over a spawned server's stdio and
//! an in-memory `ChannelTransport` for tests.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};

use crate::error::McpError;

/// Trait for MCP message transport.
///
/// Implementations handle the wire format (newline-delimited JSON) over
/// different channels.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Read the next JSON-RPC message line from the transport.
    /// Returns `None` when the transport is closed.
    async fn receive(&mut self) -> Result<Option<String>, McpError>;

    /// Write a JSON-RPC message line to the transport.
    async fn send(&mut self, message: &str) -> Result<(), McpError>;
}

/// Transport over a child process's stdin (writes) and stdout (reads).
///
/// Dropping it closes the child's stdin, which MCP servers treat as the
/// signal to exit.
pub struct ChildTransport {
    reader: BufReader<ChildStdout>,
    writer: ChildStdin,
}

impl ChildTransport {
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            reader: BufReader::new(stdout),
            writer: stdin,
        }
    }
}

#[async_trait]
impl McpTransport for ChildTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Ok(None); // EOF
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// In-memory transport for testing, backed by channel pairs.
pub struct ChannelTransport {
    rx: tokio::sync::mpsc::Receiver<String>,
    tx: tokio::sync::mpsc::Sender<String>,
}

impl ChannelTransport {
    /// Create a pair of connected transports for testing.
    ///
    /// Messages sent on one transport are received by the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = tokio::sync::mpsc::channel(32);
        let (tx_b, rx_a) = tokio::sync::mpsc::channel(32);
        (
            Self { rx: rx_a, tx: tx_a },
            Self { rx: rx_b, tx: tx_b },
        )
    }
}

#[async_trait]
impl McpTransport for ChannelTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        Ok(self.rx.recv().await)
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.tx
            .send(message.to_string())
            .await
            .map_err(|e| McpError::Transport(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_pair() {
        let (mut a, mut b) = ChannelTransport::pair();

        a.send("hello from a").await.unwrap();
        let msg = b.receive().await.unwrap();
        assert_eq!(msg, Some("hello from a".to_string()));

        b.send("hello from b").await.unwrap();
        let msg = a.receive().await.unwrap();
        assert_eq!(msg, Some("hello from b".to_string()));
    }

    #[tokio::test]
    async fn test_channel_transport_closed() {
        let (mut a, b) = ChannelTransport::pair();
        drop(b);
        let result = a.receive().await.unwrap();
        assert_eq!(result, None);
        assert!(matches!(a.send("late").await, Err(McpError::Transport(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_transport_skips_blank_lines() {
        use std::process::Stdio;

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("read -r line; printf '\\n\\n%s\\n' \"$line\"")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut transport =
            ChildTransport::new(child.stdin.take().unwrap(), child.stdout.take().unwrap());

        transport.send(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).await.unwrap();
        let echoed = transport.receive().await.unwrap();
        assert_eq!(echoed.as_deref(), Some(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#));
        assert_eq!(transport.receive().await.unwrap(), None);
        child.wait().await.unwrap();
    }
}
