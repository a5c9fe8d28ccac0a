//! The session's current todo list.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::types::{TodoItem, TodoStatus, TodoToolCall};
use crate::validation::{ValidationError, auto_complete_parents, blocked_ids, validate_all};

/// Todo list shared between the runner and the todo tool.
pub type SharedTodoList = Arc<Mutex<TodoList>>;

/// Holder of one session's todo list.
#[derive(Clone, Debug, Default)]
pub struct TodoList {
    items: Vec<TodoItem>,
}

impl TodoList {
    /// Empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty list behind a shared lock.
    #[must_use]
    pub fn shared() -> SharedTodoList {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Validate and install a proposed list.
    ///
    /// Parents whose subtasks are all done are completed first, so a list
    /// that finishes the last subtask of an in-progress parent is accepted.
    pub fn apply(&mut self, items: Vec<TodoItem>) -> Result<(), ValidationError> {
        let items = auto_complete_parents(items);
        validate_all(&items)?;
        self.replace_all(items);
        Ok(())
    }

    /// Install a list without validating it.
    ///
    /// If the previous in-progress item and a new in-progress item share the
    /// same task text, the tool-call log carries over. A changed task is a
    /// new unit of work and starts with an empty log.
    pub fn replace_all(&mut self, items: Vec<TodoItem>) {
        let mut items = auto_complete_parents(items);
        let carried = self
            .in_progress()
            .filter(|prev| !prev.tool_calls.is_empty())
            .map(|prev| (prev.task.clone(), prev.tool_calls.clone()));

        for_each_item_mut(&mut items, |item| {
            if item.is_completed() {
                item.tool_calls.clear();
            }
        });
        if let Some((task, log)) = carried {
            if let Some(next) = find_in_progress_mut(&mut items).filter(|n| n.task == task) {
                if next.tool_calls.is_empty() {
                    next.tool_calls = log;
                    debug!(task = %next.task, "carried tool-call log forward");
                }
            }
        }
        self.items = items;
    }

    /// Current items.
    #[must_use]
    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    /// Number of top-level items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item being worked on: the in-progress subtask of the in-progress
    /// parent when there is one, otherwise the in-progress item itself.
    #[must_use]
    pub fn in_progress(&self) -> Option<&TodoItem> {
        let top = self.items.iter().find(|i| i.is_in_progress());
        match top {
            Some(parent) => parent.subtasks.iter().find(|s| s.is_in_progress()).or(Some(parent)),
            None => self
                .items
                .iter()
                .flat_map(|i| i.subtasks.iter())
                .find(|s| s.is_in_progress()),
        }
    }

    /// Append to the in-progress item's tool-call log.
    ///
    /// Returns `false` when nothing is in progress.
    pub fn record_tool_call(&mut self, name: &str, summary: &str) -> bool {
        let Some(item) = find_in_progress_mut(&mut self.items) else {
            return false;
        };
        item.tool_calls.push(TodoToolCall {
            name: name.to_string(),
            summary: summary.to_string(),
            at: Utc::now(),
        });
        true
    }

    /// Complete the `ordinal`th top-level item that is not yet completed.
    ///
    /// Out of range is a miss (`None`), not an error.
    pub fn complete_by_ordinal(&mut self, ordinal: usize) -> Option<TodoItem> {
        let item = self
            .items
            .iter_mut()
            .filter(|i| !i.is_completed())
            .nth(ordinal)?;
        item.complete();
        Some(item.clone())
    }

    /// Complete the item (or subtask) with `id` and drop its tool-call log.
    ///
    /// Completing the last open subtask completes its parent too.
    pub fn complete_by_id(&mut self, id: &str) -> Option<TodoItem> {
        let item = find_item_mut(&mut self.items, id)?;
        item.complete();
        let done = item.clone();
        self.items = auto_complete_parents(std::mem::take(&mut self.items));
        Some(done)
    }

    /// Top-level items blocked by unfinished dependencies.
    #[must_use]
    pub fn blocked_ids(&self) -> std::collections::HashSet<String> {
        blocked_ids(&self.items)
    }

    /// First pending top-level item whose dependencies are all completed.
    #[must_use]
    pub fn next_actionable(&self) -> Option<&TodoItem> {
        let blocked = self.blocked_ids();
        self.items
            .iter()
            .find(|i| i.status == TodoStatus::Pending && !blocked.contains(&i.id))
    }

    /// One-line count by status, e.g. `4 todos: 1 completed, 1 in progress, 2 pending`.
    #[must_use]
    pub fn summary(&self) -> String {
        let count = |status| self.items.iter().filter(|i| i.status == status).count();
        let mut parts = Vec::new();
        for (status, label) in [
            (TodoStatus::Completed, "completed"),
            (TodoStatus::InProgress, "in progress"),
            (TodoStatus::Pending, "pending"),
            (TodoStatus::Proposed, "proposed"),
        ] {
            let n = count(status);
            if n > 0 {
                parts.push(format!("{n} {label}"));
            }
        }
        if parts.is_empty() {
            return "0 todos".to_string();
        }
        let noun = if self.items.len() == 1 { "todo" } else { "todos" };
        format!("{} {noun}: {}", self.items.len(), parts.join(", "))
    }

    /// Checklist rendering returned to the model.
    #[must_use]
    pub fn render(&self) -> String {
        let blocked = self.blocked_ids();
        let mut out = String::new();
        for item in &self.items {
            render_line(&mut out, item, 0, blocked.contains(&item.id));
            let sub_blocked = blocked_ids(&item.subtasks);
            for sub in &item.subtasks {
                render_line(&mut out, sub, 1, sub_blocked.contains(&sub.id));
            }
        }
        out.push_str(&self.summary());
        out
    }
}

fn render_line(out: &mut String, item: &TodoItem, depth: usize, blocked: bool) {
    let mark = match item.status {
        TodoStatus::Completed => "[x]",
        TodoStatus::InProgress => "[~]",
        TodoStatus::Pending => "[ ]",
        TodoStatus::Proposed => "[?]",
    };
    let indent = "  ".repeat(depth);
    let _ = write!(out, "{indent}{mark} {} ({})", item.task, item.id);
    if blocked {
        let _ = write!(out, " blocked by {}", item.dependencies.join(", "));
    }
    out.push('\n');
}

fn for_each_item_mut(items: &mut [TodoItem], mut f: impl FnMut(&mut TodoItem)) {
    for item in items {
        f(item);
        for sub in &mut item.subtasks {
            f(sub);
        }
    }
}

fn find_item_mut<'a>(items: &'a mut [TodoItem], id: &str) -> Option<&'a mut TodoItem> {
    for item in items.iter_mut() {
        if item.id == id {
            return Some(item);
        }
        if let Some(sub) = item.subtasks.iter_mut().find(|s| s.id == id) {
            return Some(sub);
        }
    }
    None
}

/// Mutable twin of [`TodoList::in_progress`].
fn find_in_progress_mut(items: &mut [TodoItem]) -> Option<&mut TodoItem> {
    if let Some(pos) = items.iter().position(TodoItem::is_in_progress) {
        return match items[pos].subtasks.iter().position(TodoItem::is_in_progress) {
            Some(sub) => Some(&mut items[pos].subtasks[sub]),
            None => Some(&mut items[pos]),
        };
    }
    let (pos, sub) = items.iter().enumerate().find_map(|(i, item)| {
        item.subtasks
            .iter()
            .position(TodoItem::is_in_progress)
            .map(|j| (i, j))
    })?;
    Some(&mut items[pos].subtasks[sub])
}
