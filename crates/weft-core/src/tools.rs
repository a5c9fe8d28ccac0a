//! Tool-execution seam.
//!
//! [`ToolExecutor`] is what the orchestration loop calls for every tool call in
//! a batch. [`Tool`] is the narrower trait for tools the core itself provides
//! (todo list, delegation); a router maps names onto them and falls back to an
//! external executor for everything else.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::errors::ToolError;
use crate::ids::AgentId;
use crate::messages::ToolCall;

/// Context handed to every tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Id of the call being executed.
    pub tool_call_id: String,
    /// Agent whose loop issued the call.
    pub agent_id: AgentId,
    /// Batch cancellation token. Shared by every call in the batch and
    /// threaded into delegated sub-agents.
    pub cancellation: CancellationToken,
    /// Delegation depth of the calling agent (0 = top level).
    pub depth: u32,
}

impl ToolContext {
    /// Context for a top-level agent call.
    pub fn new(tool_call_id: impl Into<String>, agent_id: AgentId, cancellation: CancellationToken) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            agent_id,
            cancellation,
            depth: 0,
        }
    }

    /// Builder: set delegation depth.
    #[must_use]
    pub fn at_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

/// Structured tool result. Serialized as the tool message's content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the tool did what was asked.
    pub success: bool,
    /// Output on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Actionable error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tool-specific extra fields, flattened into the record.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolOutcome {
    /// Successful outcome.
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Failed outcome with an actionable message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Builder: attach an extra field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.extra.insert(key.into(), value);
        self
    }

    /// JSON text stored in the tool message.
    #[must_use]
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"success":{},"error":"unserializable tool outcome"}}"#,
                self.success
            )
        })
    }
}

/// Executes arbitrary tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run one call. Return `Err` only on non-user-facing failure.
    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolOutcome, ToolError>;
}

/// A named tool provided by the core.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call this tool.
    fn name(&self) -> &str;

    /// One-line description.
    fn description(&self) -> &str;

    /// Run with the call's arguments.
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_content_is_structured_json() {
        let outcome = ToolOutcome::ok("done").with_extra("agentId", json!("agent_1"));
        let v: Value = serde_json::from_str(&outcome.to_content()).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["content"], "done");
        assert_eq!(v["agentId"], "agent_1");
        assert!(v.get("error").is_none());
    }

    #[test]
    fn failure_round_trips() {
        let outcome = ToolOutcome::failure("file not found");
        let parsed: ToolOutcome = serde_json::from_str(&outcome.to_content()).unwrap();
        assert_eq!(parsed, outcome);
    }

    #[test]
    fn context_depth_builder() {
        let ctx = ToolContext::new("tc1", AgentId::new(), CancellationToken::new()).at_depth(2);
        assert_eq!(ctx.depth, 2);
        assert!(!ctx.cancellation.is_cancelled());
    }
}
