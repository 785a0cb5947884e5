//! Synchronous facade for callers that cannot suspend.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use toolchat_mcp::McpTransport;
use toolchat_runtime::{ToolDefinition, Transcript, TransportBridge};

use crate::error::ClientError;
use crate::lifecycle::{ClientOptions, ProviderFactory, SessionManager};

/// Blocking client: every call runs on the bridge worker and the calling
/// thread waits for its result.
///
/// Dropping the client closes the tool session and stops the worker.
pub struct BlockingClient {
    bridge: TransportBridge,
    manager: Arc<SessionManager>,
}

impl BlockingClient {
    /// Start the bridge worker. Nothing is connected yet.
    pub fn new(options: ClientOptions, factory: ProviderFactory) -> Result<Self, ClientError> {
        Ok(Self {
            bridge: TransportBridge::start()?,
            manager: Arc::new(SessionManager::new(options, factory)),
        })
    }

    pub fn connect(&self, script: impl AsRef<Path>) -> Result<(), ClientError> {
        let manager = self.manager.clone();
        let script = script.as_ref().to_path_buf();
        self.bridge.submit(async move { manager.connect(&script).await })?
    }

    /// Handshake over a custom transport and use it as the tool session.
    pub fn attach(&self, transport: Box<dyn McpTransport>) -> Result<(), ClientError> {
        let manager = self.manager.clone();
        self.bridge
            .submit(async move { manager.attach_transport(transport).await })?
    }

    /// Answer the conversation in `transcript`, appending the new turns.
    pub fn process(&self, transcript: &mut Transcript) -> Result<String, ClientError> {
        let manager = self.manager.clone();
        let mut working = transcript.clone();
        let (working, outcome) = self.bridge.submit(async move {
            let outcome = manager.process(&mut working).await;
            (working, outcome)
        })?;
        // The manager leaves the copy untouched on failure.
        *transcript = working;
        outcome
    }

    pub fn list_tools(&self) -> Result<Vec<ToolDefinition>, ClientError> {
        let manager = self.manager.clone();
        self.bridge.submit(async move { manager.list_tools().await })?
    }

    /// Replace the API credential; see [`SessionManager::reconfigure`].
    pub fn reconfigure(&self, credential: &str) -> Result<bool, ClientError> {
        let manager = self.manager.clone();
        let credential = credential.to_string();
        Ok(self
            .bridge
            .submit(async move { manager.reconfigure(&credential).await })?)
    }

    pub fn cleanup(&self) -> Result<(), ClientError> {
        let manager = self.manager.clone();
        Ok(self.bridge.submit(async move { manager.cleanup().await })?)
    }

    pub fn is_connected(&self) -> Result<bool, ClientError> {
        let manager = self.manager.clone();
        Ok(self.bridge.submit(async move { manager.is_connected().await })?)
    }
}

impl Drop for BlockingClient {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!(error = %e, "Cleanup on drop failed");
        }
        self.bridge.shutdown();
    }
}
