use crate::conversation::Turn;
use crate::tool::{ToolCall, ToolDefinition};
use async_trait::async_trait;

/// Why the model stopped producing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Normal end of response
    Stop,
    /// Model wants to call tools
    ToolCalls,
    /// Hit max tokens limit
    Length,
    /// Anything else the endpoint reported
    Other(String),
}

impl FinishReason {
    pub fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") | None => FinishReason::Stop,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("length") => FinishReason::Length,
            Some(other) => FinishReason::Other(other.to_string()),
        }
    }
}

/// One chat completion returned by the endpoint.
#[derive(Debug, Clone)]
pub struct Completion {
    pub finish_reason: FinishReason,
    /// Assistant text; may be empty when the model only requests tools.
    pub content: String,
    /// Tool calls in the order the model listed them.
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            finish_reason: FinishReason::Stop,
            content: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            finish_reason: FinishReason::ToolCalls,
            content: String::new(),
            tool_calls: vec![call],
        }
    }
}

/// Trait for chat-completion endpoints that can offer tools to the model.
///
/// Defined here, next to the engine that consumes it; the HTTP
/// implementation lives in the `toolchat-llm` crate.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Request one completion for `messages`. An empty `tools` slice means the
    /// model is offered no tools.
    async fn complete(
        &self,
        messages: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<Completion, LlmError>;

    /// Provider name for logging/debugging (e.g., "openai")
    fn provider_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed")]
    AuthError,
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Mock provider for testing the engine without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What the engine sent on one `complete` call.
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub messages: Vec<Turn>,
        pub tools: Vec<ToolDefinition>,
    }

    /// Returns queued completions in FIFO order and records every request.
    #[derive(Default)]
    pub struct MockChatProvider {
        responses: Mutex<VecDeque<Result<Completion, LlmError>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockChatProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue(&self, completion: Completion) {
            self.responses.lock().unwrap().push_back(Ok(completion));
        }

        pub fn queue_text(&self, text: &str) {
            self.queue(Completion::answer(text));
        }

        pub fn queue_error(&self, error: LlmError) {
            self.responses.lock().unwrap().push_back(Err(error));
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatProvider for MockChatProvider {
        async fn complete(
            &self,
            messages: &[Turn],
            tools: &[ToolDefinition],
        ) -> Result<Completion, LlmError> {
            self.requests.lock().unwrap().push(RecordedRequest {
                messages: messages.to_vec(),
                tools: tools.to_vec(),
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::NetworkError("no queued response".into())))
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }
}
