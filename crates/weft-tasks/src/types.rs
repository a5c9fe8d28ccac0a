//! Todo item types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a todo: `proposed → pending → in_progress → completed`.
///
/// `proposed` and `pending` are both valid entry points. An item may go from
/// `in_progress` back to `pending`, but nothing regresses on its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Suggested, not yet accepted.
    Proposed,
    /// Accepted, not started.
    #[default]
    Pending,
    /// Being worked on now.
    InProgress,
    /// Done.
    Completed,
}

impl TodoStatus {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

/// A tool invocation made while a todo was in progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoToolCall {
    /// Tool name.
    pub name: String,
    /// Short description of what the call did.
    pub summary: String,
    /// When it ran.
    pub at: DateTime<Utc>,
}

/// One node of the task graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    /// Id, unique within the list.
    pub id: String,
    /// Trimmed task text.
    pub task: String,
    /// Current status.
    pub status: TodoStatus,
    /// Present-continuous display text ("Running tests").
    pub active_form: String,
    /// Ids of sibling items that must complete first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Child items. One level only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<TodoItem>,
    /// Transient log, dropped on completion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<TodoToolCall>,
}

impl TodoItem {
    /// Pending item whose active form is the task text.
    pub fn new(id: impl Into<String>, task: impl Into<String>) -> Self {
        let task = task.into().trim().to_string();
        Self {
            id: id.into(),
            active_form: task.clone(),
            task,
            status: TodoStatus::Pending,
            dependencies: Vec::new(),
            subtasks: Vec::new(),
            tool_calls: Vec::new(),
        }
    }

    /// Builder: set status.
    #[must_use]
    pub fn with_status(mut self, status: TodoStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder: set dependencies.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set subtasks.
    #[must_use]
    pub fn with_subtasks(mut self, subtasks: Vec<TodoItem>) -> Self {
        self.subtasks = subtasks;
        self
    }

    /// Builder: set the active form.
    #[must_use]
    pub fn with_active_form(mut self, active_form: impl Into<String>) -> Self {
        self.active_form = active_form.into();
        self
    }

    /// Whether status is completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TodoStatus::Completed
    }

    /// Whether status is in progress.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == TodoStatus::InProgress
    }

    /// Whether any subtask is not completed.
    #[must_use]
    pub fn has_incomplete_subtasks(&self) -> bool {
        self.subtasks.iter().any(|s| !s.is_completed())
    }

    /// Mark completed and drop the tool-call log.
    pub fn complete(&mut self) {
        self.status = TodoStatus::Completed;
        self.tool_calls.clear();
    }
}
