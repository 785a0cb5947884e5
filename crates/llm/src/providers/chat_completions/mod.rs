//! OpenAI-compatible chat-completions implementation of [`ChatProvider`].
//!
//! Works with any endpoint that speaks the `/chat/completions` wire format
//! with function tools (OpenAI, DeepSeek, most self-hosted gateways).
//!
//! [`ChatProvider`]: toolchat_runtime::ChatProvider

mod provider;
mod translate;

pub use self::provider::OpenAiChatProvider;
