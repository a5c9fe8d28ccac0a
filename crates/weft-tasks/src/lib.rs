//! # weft-tasks
//!
//! The session todo list the agent plans multi-step work with.
//!
//! - [`types`]: [`TodoItem`] and its status machine
//! - [`graph`]: explicit dependency graph with DFS cycle detection
//! - [`validation`]: advisory validators returning actionable errors
//! - [`list`]: [`TodoList`], the session's current list
//! - [`tool`]: [`TodoWriteTool`], the model-facing entry point

#![deny(unsafe_code)]

pub mod graph;
pub mod list;
pub mod tool;
pub mod types;
pub mod validation;

pub use graph::DependencyGraph;
pub use list::{SharedTodoList, TodoList};
pub use tool::TodoWriteTool;
pub use types::{TodoItem, TodoStatus, TodoToolCall};
pub use validation::{ValidationError, auto_complete_parents, blocked_ids, validate_all, validate_unique_ids};
