use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use toolchat_runtime::{ChatProvider, Completion, LlmError, ToolDefinition, Turn};

use super::translate::{parse_completion, request_body};

/// Fallback wait when a 429 carries no usable Retry-After.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Chat-completions provider with function-tool support.
///
/// Each call is a single non-streaming `POST {base_url}/chat/completions`.
pub struct OpenAiChatProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiChatProvider {
    /// Create a new provider.
    ///
    /// # Arguments
    /// * `api_key` - Bearer credential for the endpoint
    /// * `model` - Model name (e.g. `"deepseek-chat"`)
    /// * `base_url` - API base URL (e.g. `"https://api.deepseek.com"`)
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(super) fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    async fn complete(
        &self,
        messages: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<Completion, LlmError> {
        let url = self.endpoint();
        let body = request_body(&self.model, messages, tools);

        debug!(
            model = %self.model,
            url = %url,
            messages = messages.len(),
            tools = tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body_text = response.text().await.unwrap_or_default();

            if status == 401 || status == 403 {
                return Err(LlmError::AuthError);
            }
            if status == 429 {
                let retry_after_secs = retry_after
                    .or_else(|| {
                        serde_json::from_str::<Value>(&body_text)
                            .ok()
                            .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    })
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                return Err(LlmError::RateLimited { retry_after_secs });
            }
            return Err(LlmError::ApiError {
                status,
                message: body_text,
            });
        }

        let resp: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let completion = parse_completion(&resp)?;

        debug!(
            finish_reason = ?completion.finish_reason,
            tool_calls = completion.tool_calls.len(),
            "Chat completion received"
        );
        Ok(completion)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
