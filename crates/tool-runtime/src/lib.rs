pub mod tool;
pub mod conversation;
pub mod provider;
pub mod session;
pub mod engine;
pub mod bridge;

pub use tool::{ToolArguments, ToolCall, ToolDefinition, ToolResult};
pub use conversation::{Role, Transcript, Turn};
pub use provider::{ChatProvider, Completion, FinishReason, LlmError};
pub use session::{SessionError, ToolSession};
pub use engine::{ConversationEngine, EngineError};
pub use bridge::{BridgeError, TransportBridge};
