//! Translation between transcript types and the chat-completions wire format.

use serde_json::{json, Value};
use tracing::warn;

use toolchat_runtime::{
    Completion, FinishReason, LlmError, Role, ToolArguments, ToolCall, ToolDefinition, Turn,
};

/// Translate a [`ToolDefinition`] into a function tool entry.
pub(super) fn tool_definition_to_openai(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

/// Translate a [`Turn`] into a chat message object.
pub(super) fn turn_to_openai(turn: &Turn) -> Value {
    match turn.role {
        Role::System => json!({"role": "system", "content": turn.content}),
        Role::User => json!({"role": "user", "content": turn.content}),
        Role::Assistant => match &turn.tool_call {
            Some(call) => {
                let content = if turn.content.is_empty() {
                    Value::Null
                } else {
                    json!(turn.content)
                };
                json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": [{
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    }]
                })
            }
            None => json!({"role": "assistant", "content": turn.content}),
        },
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": turn.tool_call_id.as_deref().unwrap_or_default(),
            "content": turn.content,
        }),
    }
}

/// Build the request body for one completion.
///
/// The `tools` key is omitted entirely when no tools are offered.
pub(super) fn request_body(model: &str, messages: &[Turn], tools: &[ToolDefinition]) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages.iter().map(turn_to_openai).collect::<Vec<_>>(),
    });
    if !tools.is_empty() {
        body["tools"] = json!(tools.iter().map(tool_definition_to_openai).collect::<Vec<_>>());
    }
    body
}

/// Decode the first choice of a chat-completions response.
pub(super) fn parse_completion(resp: &Value) -> Result<Completion, LlmError> {
    let choice = resp["choices"]
        .get(0)
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".into()))?;
    let message = &choice["message"];

    let finish_reason = FinishReason::from_wire(choice["finish_reason"].as_str());
    let content = message["content"].as_str().unwrap_or_default().to_string();

    // Only the first call is acted on, so only it must decode; later ones
    // that do not are skipped.
    let mut tool_calls = Vec::new();
    if let Some((first, rest)) = message["tool_calls"].as_array().and_then(|c| c.split_first()) {
        tool_calls.push(parse_tool_call(first)?);
        for raw in rest {
            match parse_tool_call(raw) {
                Ok(call) => tool_calls.push(call),
                Err(e) => warn!(error = %e, "Skipping undecodable extra tool call"),
            }
        }
    }

    Ok(Completion {
        finish_reason,
        content,
        tool_calls,
    })
}

fn parse_tool_call(raw: &Value) -> Result<ToolCall, LlmError> {
    let function = &raw["function"];
    let name = function["name"]
        .as_str()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| LlmError::InvalidResponse("tool call has no function name".into()))?;

    // Arguments are a JSON-encoded string on the wire; some gateways send
    // the object itself.
    let arguments = match &function["arguments"] {
        Value::String(raw_args) => ToolArguments::parse(raw_args),
        other => ToolArguments::try_from(other.clone()),
    }
    .map_err(|e| LlmError::InvalidResponse(format!("tool '{}': {}", name, e)))?;

    let id = match raw["id"].as_str() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => ToolCall::generate_id(),
    };

    Ok(ToolCall {
        id,
        name: name.to_string(),
        arguments,
    })
}
