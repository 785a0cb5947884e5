use crate::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Set on `tool` turns: the id of the call this turn answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on `assistant` turns that request a tool instead of answering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
}

impl Turn {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_call: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    fn tool_request(content: impl Into<String>, call: ToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_call: Some(call),
        }
    }

    fn tool_response(result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: result.content,
            tool_call_id: Some(result.tool_call_id),
            tool_call: None,
        }
    }
}

/// Ordered conversation history.
///
/// Tool turns can only enter through [`Transcript::push_tool_exchange`], which
/// appends the assistant's tool call and its result together. A transcript
/// built through this API therefore never holds a tool call without its
/// answer, nor an answer without its call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user(text));
    }

    pub fn add_assistant_message(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::assistant(text));
    }

    pub fn add_system_message(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::system(text));
    }

    /// Append an assistant tool-call turn and the matching tool-result turn.
    ///
    /// The result's `tool_call_id` is overwritten with the call's id.
    pub fn push_tool_exchange(
        &mut self,
        content: impl Into<String>,
        call: ToolCall,
        mut result: ToolResult,
    ) {
        result.tool_call_id = call.id.clone();
        self.turns.push(Turn::tool_request(content, call));
        self.turns.push(Turn::tool_response(result));
    }

    /// Append every turn of `other` after the existing ones.
    pub fn extend(&mut self, other: Transcript) {
        self.turns.extend(other.turns);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Reset the whole conversation.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Check that every tool turn directly follows the assistant turn that
    /// requested it, with a matching id.
    pub fn is_well_paired(&self) -> bool {
        self.turns.iter().enumerate().all(|(i, turn)| match turn.role {
            Role::Tool => {
                let Some(prev) = i.checked_sub(1).map(|p| &self.turns[p]) else {
                    return false;
                };
                match (&prev.tool_call, &turn.tool_call_id) {
                    (Some(call), Some(id)) => prev.role == Role::Assistant && call.id == *id,
                    _ => false,
                }
            }
            _ if turn.tool_call.is_some() => self
                .turns
                .get(i + 1)
                .is_some_and(|next| next.role == Role::Tool),
            _ => true,
        })
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}
