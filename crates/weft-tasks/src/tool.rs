//! `TodoWrite`: the model-facing entry point to the todo list.
//!
//! The model sends the whole list every time. The tool normalizes it, runs it
//! through [`TodoList::apply`], and either reports the new checklist or hands
//! back the first validation failure as a failed outcome so the model can fix
//! its proposal and retry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;
use weft_core::errors::ToolError;
use weft_core::events::{AgentEvent, EventEmitter, EventType};
use weft_core::tools::{Tool, ToolContext, ToolOutcome};

use crate::list::SharedTodoList;
use crate::types::{TodoItem, TodoStatus};

/// Default tool name.
pub const TODO_WRITE_TOOL_NAME: &str = "TodoWrite";

#[derive(Deserialize)]
struct TodoWriteArgs {
    todos: Vec<ProposedTodo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposedTodo {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "content")]
    task: String,
    #[serde(default)]
    status: Option<TodoStatus>,
    #[serde(default)]
    active_form: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    subtasks: Vec<ProposedTodo>,
}

impl ProposedTodo {
    fn into_item(self) -> Result<TodoItem, String> {
        let task = self.task.trim().to_string();
        if task.is_empty() {
            return Err("Every todo needs non-empty task text.".to_string());
        }
        let id = self
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("todo_{}", Uuid::now_v7().simple()));
        let active_form = self
            .active_form
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| task.clone());
        let subtasks = self
            .subtasks
            .into_iter()
            .map(ProposedTodo::into_item)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TodoItem::new(id, task)
            .with_status(self.status.unwrap_or_default())
            .with_active_form(active_form)
            .with_dependencies(self.dependencies)
            .with_subtasks(subtasks))
    }
}

/// Replaces the session todo list with a model-proposed one.
pub struct TodoWriteTool {
    list: SharedTodoList,
    emitter: Arc<EventEmitter>,
}

impl TodoWriteTool {
    /// Tool writing into `list` and announcing changes on `emitter`.
    pub fn new(list: SharedTodoList, emitter: Arc<EventEmitter>) -> Self {
        Self { list, emitter }
    }
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        TODO_WRITE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Create or update the task list for the current session"
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let args: TodoWriteArgs = serde_json::from_value(args.clone())
            .map_err(|e| ToolError::InvalidArguments(format!("expected {{\"todos\": [...]}}: {e}")))?;

        let items = match args
            .todos
            .into_iter()
            .map(ProposedTodo::into_item)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(items) => items,
            Err(message) => return Ok(ToolOutcome::failure(message)),
        };

        let applied = {
            let mut list = self.list.lock();
            list.apply(items)
                .map(|()| (list.render(), list.summary(), serde_json::to_value(list.items())))
        };

        match applied {
            Ok((rendered, summary, todos)) => {
                let _ = self.emitter.emit(AgentEvent::new(
                    EventType::TodoUpdate,
                    json!({
                        "agentId": ctx.agent_id.as_str(),
                        "toolCallId": ctx.tool_call_id,
                        "todos": todos.unwrap_or(Value::Null),
                        "summary": summary,
                    }),
                ));
                Ok(ToolOutcome::ok(rendered).with_extra("summary", json!(summary)))
            }
            Err(error) => {
                debug!(tool_call_id = %ctx.tool_call_id, %error, "rejected todo list");
                Ok(ToolOutcome::failure(error.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::TodoList;
    use assert_matches::assert_matches;
    use tokio_util::sync::CancellationToken;
    use weft_core::ids::AgentId;

    fn setup() -> (TodoWriteTool, SharedTodoList, Arc<EventEmitter>) {
        let list = TodoList::shared();
        let emitter = Arc::new(EventEmitter::new());
        (TodoWriteTool::new(list.clone(), emitter.clone()), list, emitter)
    }

    fn ctx() -> ToolContext {
        ToolContext::new("tc1", AgentId::new(), CancellationToken::new())
    }

    #[tokio::test]
    async fn writes_normalized_list_and_emits_update() {
        let (tool, list, emitter) = setup();
        let mut rx = emitter.subscribe();
        let outcome = tool
            .execute(
                &json!({"todos": [
                    {"id": "a", "task": "  Write tests  ", "status": "in_progress"},
                    {"content": "Fix bug", "dependencies": ["a"]}
                ]}),
                &ctx(),
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.content.unwrap().contains("[~] Write tests (a)"));
        let list = list.lock();
        assert_eq!(list.items()[0].task, "Write tests");
        assert_eq!(list.items()[0].active_form, "Write tests");
        assert_eq!(list.items()[1].status, TodoStatus::Pending);
        assert!(list.items()[1].id.starts_with("todo_"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::TodoUpdate);
        assert_eq!(event.data["toolCallId"], "tc1");
        assert_eq!(event.data["todos"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn validation_failure_is_a_failed_outcome() {
        let (tool, list, emitter) = setup();
        let outcome = tool
            .execute(
                &json!({"todos": [
                    {"id": "A", "task": "First"},
                    {"id": "B", "task": "Second", "status": "in_progress", "dependencies": ["A"]}
                ]}),
                &ctx(),
            )
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("must complete first"));
        assert!(list.lock().is_empty());
        assert_eq!(emitter.emit_count(), 0);
    }

    #[tokio::test]
    async fn empty_task_text_is_rejected() {
        let (tool, _, _) = setup();
        let outcome = tool
            .execute(&json!({"todos": [{"task": "   "}]}), &ctx())
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn malformed_arguments_are_an_error() {
        let (tool, _, _) = setup();
        assert_matches!(
            tool.execute(&json!({"items": []}), &ctx()).await,
            Err(ToolError::InvalidArguments(_))
        );
    }
}
