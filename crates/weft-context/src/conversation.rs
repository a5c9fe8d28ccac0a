//! Ordered message history with a tool-result index.
//!
//! [`ConversationStore`] owns one agent's messages and a side table mapping
//! each tool-call id to the position of its result message. Results of a
//! concurrently executed batch land in completion order, so callers must
//! always re-associate them through the index, never by position.
//!
//! ## Index maintenance
//!
//! `append` extends the index in place. Every other mutation goes through
//! one private rebuild, so array and index can never diverge.
//! When two results carry the same call id, the later one wins.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::Value;
use tracing::debug;
use weft_core::messages::{Message, Role, ToolCall};

use crate::errors::{ContextError, Result};
use crate::reminders;

/// Outcome of [`ConversationStore::remove_tool_results`].
///
/// Partial success: unknown ids never fail the call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolResultRemoval {
    /// Ids that had a result message (now removed).
    pub found_ids: Vec<String>,
    /// Ids with no result message.
    pub not_found_ids: Vec<String>,
    /// Messages removed.
    pub removed_count: usize,
}

/// Outcome of [`ConversationStore::partition_by_turn`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnPartition {
    /// Ids whose result sits at or after the turn boundary.
    pub current_turn: Vec<String>,
    /// Ids whose result sits before the turn boundary.
    pub prior_turns: Vec<String>,
}

/// Message history for one agent instance.
#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
    tool_results: HashMap<String, usize>,
}

impl ConversationStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a system prompt.
    #[must_use]
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut store = Self::new();
        store.append(Message::system(prompt));
        store
    }

    // ── Mutation ────────────────────────────────────────────────────────

    /// Push a message, assigning id and timestamp when missing.
    ///
    /// Role ordering is not validated.
    pub fn append(&mut self, mut message: Message) {
        message.ensure_identity();
        if let Some(call_id) = message.result_call_id() {
            let _ = self
                .tool_results
                .insert(call_id.to_string(), self.messages.len());
        }
        self.messages.push(message);
    }

    /// Replace the whole history (compaction, rewind, session load).
    ///
    /// When the incoming list has no leading system message, the current
    /// system prompt is kept in front of it. Use [`clear`](Self::clear) to
    /// drop the prompt.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        let keep_prompt = match (self.messages.first(), messages.first()) {
            (Some(first), incoming) if first.is_system() => {
                !incoming.is_some_and(Message::is_system)
            }
            _ => false,
        };
        let mut next = Vec::with_capacity(messages.len() + 1);
        if keep_prompt {
            next.push(self.messages.swap_remove(0));
        }
        next.extend(messages);
        for message in &mut next {
            message.ensure_identity();
        }
        self.messages = next;
        self.reindex();
    }

    /// Drop every message, system prompt included.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.tool_results.clear();
    }

    /// Replace the leading system message, or insert one.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        match self.messages.first_mut() {
            Some(first) if first.is_system() => first.content = prompt,
            _ => {
                let mut message = Message::system(prompt);
                message.ensure_identity();
                self.messages.insert(0, message);
                self.reindex();
            }
        }
    }

    /// Remove every message matching `predicate`. Returns how many went.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Message) -> bool,
    {
        let before = self.messages.len();
        self.messages.retain(|m| !predicate(m));
        let removed = before - self.messages.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    /// Remove the result messages for `ids`.
    ///
    /// Every distinct input id lands in exactly one of `found_ids` or
    /// `not_found_ids`, in input order.
    pub fn remove_tool_results<S: AsRef<str>>(&mut self, ids: &[S]) -> ToolResultRemoval {
        let mut report = ToolResultRemoval::default();
        let mut seen = HashSet::new();
        for id in ids {
            let id = id.as_ref();
            if !seen.insert(id) {
                continue;
            }
            if self.tool_results.contains_key(id) {
                report.found_ids.push(id.to_string());
            } else {
                report.not_found_ids.push(id.to_string());
            }
        }
        if report.found_ids.is_empty() {
            return report;
        }
        let found: HashSet<&str> = report.found_ids.iter().map(String::as_str).collect();
        report.removed_count =
            self.remove_where(|m| m.result_call_id().is_some_and(|id| found.contains(id)));
        report
    }

    /// Remove per-turn reminder annotations. Returns messages affected.
    ///
    /// - A system or user message made only of reminder tags is removed,
    ///   unless one of its tags is persistent.
    /// - Inside tool results, each non-persistent tag is cut out and the
    ///   remaining whitespace collapsed.
    ///
    /// The leading system prompt is never touched.
    pub fn strip_ephemeral_reminders(&mut self) -> usize {
        let mut affected = 0;
        let mut doomed = vec![false; self.messages.len()];
        for (i, message) in self.messages.iter_mut().enumerate() {
            match message.role {
                Role::System if i == 0 => {}
                Role::System | Role::User => {
                    if reminders::is_reminder_only(&message.content)
                        && !reminders::has_persistent_reminder(&message.content)
                    {
                        doomed[i] = true;
                        affected += 1;
                    }
                }
                Role::Tool => {
                    if let Some(stripped) = reminders::strip_ephemeral(&message.content) {
                        message.content = stripped;
                        affected += 1;
                    }
                }
                Role::Assistant => {}
            }
        }
        if doomed.contains(&true) {
            let mut flags = doomed.into_iter();
            self.messages.retain(|_| !flags.next().unwrap_or(false));
            self.reindex();
        }
        if affected > 0 {
            debug!(affected, "stripped ephemeral reminders");
        }
        affected
    }

    /// Remove messages whose metadata flags them ephemeral.
    pub fn remove_ephemeral_messages(&mut self) -> usize {
        self.remove_where(Message::is_ephemeral)
    }

    /// Truncate to just before the `ordinal`th user message (0-based).
    ///
    /// Only messages the user sent count; runtime reminders are skipped.
    /// Returns that message's text so it can be edited and resent. The
    /// leading system message, if any, always survives.
    pub fn rewind_to(&mut self, ordinal: usize) -> Result<String> {
        let position = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_user_turn())
            .nth(ordinal)
            .map(|(i, _)| i)
            .ok_or_else(|| ContextError::RewindOutOfRange {
                ordinal,
                user_messages: self.user_message_count(),
            })?;
        let mut tail = self.messages.split_off(position);
        self.reindex();
        let text = std::mem::take(&mut tail[0].content);
        debug!(ordinal, position, dropped = tail.len(), "rewound conversation");
        Ok(text)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Index of the most recent user message, or 0. Reminders do not open a
    /// turn.
    #[must_use]
    pub fn turn_boundary_index(&self) -> usize {
        self.messages.iter().rposition(Message::is_user_turn).unwrap_or(0)
    }

    /// Split tool-call ids by whether their result is in the current turn.
    ///
    /// Ids without a result are left out of both lists.
    #[must_use]
    pub fn partition_by_turn<S: AsRef<str>>(&self, ids: &[S]) -> TurnPartition {
        let boundary = self.turn_boundary_index();
        let mut partition = TurnPartition::default();
        for id in ids {
            let id = id.as_ref();
            match self.tool_results.get(id) {
                Some(&pos) if pos >= boundary => partition.current_turn.push(id.to_string()),
                Some(_) => partition.prior_turns.push(id.to_string()),
                None => {}
            }
        }
        partition
    }

    /// Whether an earlier read of `path` is confirmed successful.
    ///
    /// Looks for a read-shaped tool call naming `path`, follows the index to
    /// its result and requires `{"success": true}`. A result that does not
    /// parse counts as unconfirmed.
    #[must_use]
    pub fn has_successful_read(&self, path: &str) -> bool {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.is_assistant())
            .flat_map(|m| m.tool_calls.iter())
            .filter(|call| is_read_call(call) && call_references_path(call, path))
            .any(|call| self.result_reports_success(&call.id))
    }

    fn result_reports_success(&self, call_id: &str) -> bool {
        let Some(result) = self.tool_result(call_id) else {
            return false;
        };
        match serde_json::from_str::<Value>(&result.content) {
            Ok(value) => value.get("success").and_then(Value::as_bool) == Some(true),
            Err(error) => {
                debug!(call_id, %error, "tool result is not structured JSON, read unconfirmed");
                false
            }
        }
    }

    /// Result message for a tool-call id.
    #[must_use]
    pub fn tool_result(&self, call_id: &str) -> Option<&Message> {
        self.tool_results
            .get(call_id)
            .and_then(|&pos| self.messages.get(pos))
    }

    /// Text of the most recent assistant message with non-empty content.
    #[must_use]
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_assistant() && !m.content.is_empty())
            .map(|m| m.content.as_str())
    }

    /// Number of user messages, reminders excluded.
    #[must_use]
    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user_turn()).count()
    }

    /// Leading system prompt text.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.is_system())
            .map(|m| m.content.as_str())
    }

    /// Borrow the message sequence.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Cloned copy of the message sequence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether the index matches a fresh rebuild from the messages.
    #[must_use]
    pub fn index_is_consistent(&self) -> bool {
        self.tool_results == build_index(&self.messages)
    }

    fn reindex(&mut self) {
        self.tool_results = build_index(&self.messages);
    }
}

fn build_index(messages: &[Message]) -> HashMap<String, usize> {
    messages
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.result_call_id().map(|id| (id.to_string(), i)))
        .collect()
}

fn is_read_call(call: &ToolCall) -> bool {
    matches!(
        call.name.to_ascii_lowercase().as_str(),
        "read" | "read_file" | "readfile"
    )
}

fn call_references_path(call: &ToolCall, path: &str) -> bool {
    let target = Path::new(path);
    let single = ["file_path", "filePath", "path"]
        .iter()
        .filter_map(|key| call.str_arg(key));
    let many = ["file_paths", "filePaths", "paths"]
        .iter()
        .filter_map(|key| call.arguments.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str);
    single.chain(many).any(|p| Path::new(p) == target)
}
