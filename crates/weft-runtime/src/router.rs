//! Name-based dispatch for a tool batch.
//!
//! Core tools (todo list, delegation) are registered by name. Anything else
//! goes to the fallback executor supplied by the embedding application.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use weft_core::errors::ToolError;
use weft_core::messages::ToolCall;
use weft_core::tools::{Tool, ToolContext, ToolExecutor, ToolOutcome};

/// Routes tool calls to registered tools or a fallback executor.
#[derive(Default)]
pub struct ToolRouter {
    tools: HashMap<String, Arc<dyn Tool>>,
    fallback: Option<Arc<dyn ToolExecutor>>,
}

impl ToolRouter {
    /// Router with no tools.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` under its own name. A later tool with the same name wins.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        let _ = self.tools.insert(tool.name().to_string(), tool);
        self
    }

    /// Executor for calls no registered tool matches.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn ToolExecutor>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

#[async_trait]
impl ToolExecutor for ToolRouter {
    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolOutcome, ToolError> {
        if let Some(tool) = self.tools.get(&call.name) {
            return tool.execute(&call.arguments, ctx).await;
        }
        match &self.fallback {
            Some(fallback) => fallback.execute(call, ctx).await,
            None => Err(ToolError::UnknownTool(call.name.clone())),
        }
    }
}
