//! Conversation store errors.

use thiserror::Error;

/// Errors returned by [`ConversationStore`](crate::ConversationStore).
///
/// Lookup misses are not errors; they come back as `None` or as the
/// `not_found_ids` half of a partial-success report.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    /// The requested user message does not exist.
    #[error(
        "cannot rewind to user message {ordinal}: the conversation has {user_messages} user message(s)"
    )]
    RewindOutOfRange {
        /// Requested 0-based ordinal among user messages.
        ordinal: usize,
        /// How many user messages exist.
        user_messages: usize,
    },
}

/// Result type for conversation store operations.
pub type Result<T> = std::result::Result<T, ContextError>;
