use toolchat_mcp::McpError;
use toolchat_runtime::{BridgeError, EngineError, LlmError, SessionError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The tool server could not be launched or refused the handshake.
    #[error(transparent)]
    Connect(#[from] McpError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The provider factory rejected the credential or configuration.
    #[error("Cannot create chat provider: {0}")]
    Provider(#[source] LlmError),

    #[error("No tool server script configured; connect to one first")]
    NotConnected,

    #[error("No API key set")]
    MissingCredential,

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
