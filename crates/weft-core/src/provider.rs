//! Model-client seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::messages::{Message, ToolCall};

/// Per-call options.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    /// Disable streaming (summarisation-style calls).
    #[serde(default)]
    pub no_streaming: bool,
    /// Upper bound on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// What the model sent back: text, tool calls, or both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelReply {
    /// Reply text (may be empty when only tool calls are present).
    #[serde(default)]
    pub content: String,
    /// Requested tool calls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ModelReply {
    /// Text-only reply.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Reply requesting tool calls.
    pub fn with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }

    /// Convert into the assistant message appended to the conversation.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::assistant_with_tools(self.content, self.tool_calls)
    }
}

/// The language-model wire client.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the full current message sequence.
    async fn send(
        &self,
        messages: &[Message],
        options: &SendOptions,
    ) -> Result<ModelReply, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_becomes_assistant_message() {
        let reply = ModelReply::with_tools("", vec![ToolCall::new("tc1", "read", json!({}))]);
        let msg = reply.into_message();
        assert!(msg.is_assistant());
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.content, "");
    }

    #[test]
    fn options_default_to_streaming() {
        assert!(!SendOptions::default().no_streaming);
    }
}
