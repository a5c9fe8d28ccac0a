//! # weft-context
//!
//! Conversation state for one agent instance.
//!
//! - [`ConversationStore`]: the ordered message history plus a tool-call-id
//!   index that is kept in step with every mutation
//! - [`reminders`]: `<system-reminder>` tag parsing used to strip per-turn
//!   annotations

#![deny(unsafe_code)]

pub mod conversation;
pub mod errors;
pub mod reminders;

pub use conversation::{ConversationStore, ToolResultRemoval, TurnPartition};
pub use errors::{ContextError, Result};
