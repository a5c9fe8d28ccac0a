//! # weft-core
//!
//! Foundation vocabulary for the weft orchestration core:
//!
//! - [`ids`]: branded, time-ordered identifiers
//! - [`messages`]: the flat conversation record and its tool-call payloads
//! - [`events`]: fire-and-forget observer events
//! - [`provider`] and [`tools`]: the model-client and tool-executor seams
//! - [`errors`]: provider and tool error types
//! - [`logging`]: `tracing` subscriber setup
//! - [`mock`]: a scripted model client for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod mock;
pub mod provider;
pub mod tools;

pub use errors::{ProviderError, ToolError};
pub use events::{AgentEvent, EventEmitter, EventType};
pub use ids::{AgentId, EventId, MessageId};
pub use messages::{Message, MessageMetadata, Role, ToolCall};
pub use provider::{ModelClient, ModelReply, SendOptions};
pub use tools::{Tool, ToolContext, ToolExecutor, ToolOutcome};
