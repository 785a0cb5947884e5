use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Describes a tool's interface for LLM consumption.
/// Maps to the MCP `tools/list` entry and OpenAI's function format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique within one tool server (e.g., "get_daily_quote")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// JSON Schema describing the expected input
    pub input_schema: Value,
}

/// Arguments of a tool call: an opaque key/value payload.
///
/// The tool set is discovered at runtime, so arguments are never typed
/// statically. The only check is at the boundary where the model's output is
/// decoded: the payload must be a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the raw argument string produced by the model.
    ///
    /// An empty (or whitespace-only) string is treated as `{}`.
    pub fn parse(raw: &str) -> Result<Self, InvalidArguments> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value =
            serde_json::from_str(raw).map_err(|e| InvalidArguments(e.to_string()))?;
        Self::try_from(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl TryFrom<Value> for ToolArguments {
    type Error = InvalidArguments;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(InvalidArguments(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ToolArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid tool arguments: {0}")]
pub struct InvalidArguments(pub String);

/// Represents an LLM requesting execution of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this invocation (used to match results)
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// Decoded arguments
    pub arguments: ToolArguments,
}

impl ToolCall {
    /// Generate a call id for endpoints that omit one.
    pub fn generate_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }
}

/// Result of executing a tool, sent back to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Must match the ToolCall id
    pub tool_call_id: String,
    /// Result content (text)
    pub content: String,
    /// Whether the tool itself reported a failure
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            tool_call_id: String::new(), // Set by caller
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            tool_call_id: String::new(), // Set by caller
            content: content.into(),
            is_error: true,
        }
    }
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}
