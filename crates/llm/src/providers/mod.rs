pub mod chat_completions;

use std::sync::Arc;

use toolchat_core::LlmConfig;
use toolchat_runtime::{ChatProvider, LlmError};

/// Create the chat provider described by `config`, authenticated with
/// `api_key`.
///
/// The credential is passed separately because it can be replaced at runtime
/// without touching the rest of the configuration.
pub fn create_provider(config: &LlmConfig, api_key: &str) -> Result<Arc<dyn ChatProvider>, LlmError> {
    if api_key.trim().is_empty() {
        return Err(LlmError::NotConfigured("API key is empty".into()));
    }
    let base_url = config
        .base_url
        .as_deref()
        .ok_or_else(|| LlmError::NotConfigured("BASE_URL not set".into()))?;
    let model = config
        .model
        .as_deref()
        .ok_or_else(|| LlmError::NotConfigured("MODEL not set".into()))?;

    Ok(Arc::new(chat_completions::OpenAiChatProvider::new(
        api_key.to_string(),
        model.to_string(),
        base_url.to_string(),
    )))
}
