use crate::tool::{ToolArguments, ToolDefinition, ToolResult};
use async_trait::async_trait;
use std::time::Duration;

/// A live connection to a tool server, as seen by the conversation engine.
///
/// The engine only borrows a session for the duration of one call; opening
/// and closing it is the owner's job.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Fetch the tools the server currently offers.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, SessionError>;

    /// Invoke a tool by name.
    ///
    /// A failure reported by the tool itself is not an error: it comes back as
    /// a [`ToolResult`] with `is_error` set so the model can react to it.
    async fn invoke(
        &self,
        name: &str,
        arguments: &ToolArguments,
    ) -> Result<ToolResult, SessionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Tool server did not respond within {0:?}")]
    Timeout(Duration),
    #[error("Tool not found: {0}")]
    ToolNotFound(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Tool session is not connected")]
    NotConnected,
}

impl SessionError {
    /// Whether the session that produced this error can no longer be trusted
    /// and has to be replaced. An unknown tool leaves the session usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::ToolNotFound(_))
    }
}

/// In-memory tool session for engine tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed text results per tool name and records invocations.
    #[derive(Default)]
    pub struct MockToolSession {
        tools: Vec<ToolDefinition>,
        results: HashMap<String, ToolResult>,
        fail_listing: bool,
        invocations: Mutex<Vec<(String, ToolArguments)>>,
    }

    impl MockToolSession {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a tool that answers every call with `result`.
        pub fn with_tool(mut self, name: &str, result: ToolResult) -> Self {
            self.tools.push(ToolDefinition {
                name: name.to_string(),
                description: format!("{} (mock)", name),
                input_schema: serde_json::json!({"type": "object"}),
            });
            self.results.insert(name.to_string(), result);
            self
        }

        /// Make `list_tools` fail with a protocol error.
        pub fn failing_listing(mut self) -> Self {
            self.fail_listing = true;
            self
        }

        pub fn invocations(&self) -> Vec<(String, ToolArguments)> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolSession for MockToolSession {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, SessionError> {
            if self.fail_listing {
                return Err(SessionError::Protocol("malformed tools/list result".into()));
            }
            Ok(self.tools.clone())
        }

        async fn invoke(
            &self,
            name: &str,
            arguments: &ToolArguments,
        ) -> Result<ToolResult, SessionError> {
            self.invocations
                .lock()
                .unwrap()
                .push((name.to_string(), arguments.clone()));
            self.results
                .get(name)
                .cloned()
                .ok_or_else(|| SessionError::ToolNotFound(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unknown_tool_keeps_session() {
        assert!(!SessionError::ToolNotFound("x".into()).is_fatal());
        assert!(SessionError::Protocol("bad frame".into()).is_fatal());
        assert!(SessionError::Transport("Broken pipe".into()).is_fatal());
        assert!(SessionError::Timeout(Duration::from_secs(30)).is_fatal());
        assert!(SessionError::NotConnected.is_fatal());
    }
}
