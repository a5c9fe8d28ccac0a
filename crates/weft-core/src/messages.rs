//! Conversation message types.
//!
//! A [`Message`] is a flat record: role, text content, optional tool calls (on
//! assistant messages) or a tool-call back-reference (on tool messages), plus
//! identity, timestamp and metadata flags. Rewind, compaction and session load
//! all round-trip through this shape, so it must stay serde-stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::MessageId;

// ─────────────────────────────────────────────────────────────────────────────
// Role
// ─────────────────────────────────────────────────────────────────────────────

/// Who produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt or system-level annotation.
    System,
    /// Human (or delegating agent) input.
    User,
    /// Model output, possibly carrying tool calls.
    Assistant,
    /// Result of one tool call.
    Tool,
}

impl Role {
    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool call
// ─────────────────────────────────────────────────────────────────────────────

/// A tool invocation requested by an assistant message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id; tool messages point back at it through `toolCallId`.
    pub id: String,
    /// Function name.
    pub name: String,
    /// Arguments as emitted by the model (usually a JSON object).
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    /// Create a tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// String argument by key, if present.
    #[must_use]
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Optional flags attached to a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Visible to the model for one turn only.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ephemeral: bool,
    /// Output of a slash command rather than of the model.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_command_response: bool,
    /// Injected by the runtime, not typed by the user.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_reminder: bool,
    /// Summary produced by compaction.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_conversation_summary: bool,
    /// Files whose content was injected alongside this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_file_references: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// One turn unit of the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique id; assigned by the store when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Producer of the message.
    pub role: Role,
    /// Text content. May be empty when only tool calls are present.
    #[serde(default)]
    pub content: String,
    /// Tool calls issued by an assistant message, in emission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Back-reference to the originating call (role = tool only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name (role = tool only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Creation time; assigned by the store when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Optional flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    fn bare(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            timestamp: None,
            metadata: None,
        }
    }

    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::bare(Role::System, content)
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::bare(Role::User, content)
    }

    /// Plain assistant reply.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::bare(Role::Assistant, content)
    }

    /// Assistant message carrying tool calls.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::bare(Role::Assistant, content)
        }
    }

    /// Tool result for `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::bare(Role::Tool, content)
        }
    }

    /// Builder: attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Builder: mark as ephemeral.
    #[must_use]
    pub fn ephemeral(self) -> Self {
        let mut metadata = self.metadata.clone().unwrap_or_default();
        metadata.ephemeral = true;
        self.with_metadata(metadata)
    }

    /// Builder: mark as a runtime-injected reminder.
    #[must_use]
    pub fn reminder(self) -> Self {
        let mut metadata = self.metadata.clone().unwrap_or_default();
        metadata.is_reminder = true;
        self.with_metadata(metadata)
    }

    /// Fill in id and timestamp if missing.
    pub fn ensure_identity(&mut self) {
        if self.id.is_none() {
            self.id = Some(MessageId::new());
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
    }

    /// Whether this is a user message.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Whether this is a user message the user actually sent.
    #[must_use]
    pub fn is_user_turn(&self) -> bool {
        self.is_user() && !self.is_reminder()
    }

    /// Whether this is a system message.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Whether this is an assistant message.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Whether this is a tool result.
    #[must_use]
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }

    /// Whether the ephemeral metadata flag is set.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.ephemeral)
    }

    /// Whether the reminder metadata flag is set.
    #[must_use]
    pub fn is_reminder(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.is_reminder)
    }

    /// Tool-call id for role = tool messages that carry one.
    #[must_use]
    pub fn result_call_id(&self) -> Option<&str> {
        if self.is_tool_result() {
            self.tool_call_id.as_deref()
        } else {
            None
        }
    }
}
