//! One agent: its own conversation and its own interruption state.
//!
//! The pair is never shared between two running loops. Exclusive access
//! during a run comes from the `tokio::sync::Mutex` in [`SharedAgent`]; the
//! coordinator is also reachable from outside the lock through its cloned
//! handle so cancels and interjections can land while the loop is busy.

use std::sync::Arc;

use weft_context::ConversationStore;
use weft_core::ids::AgentId;

use crate::interrupt::InterruptionCoordinator;

/// Agent behind an async lock held for the duration of a run.
pub type SharedAgent = Arc<tokio::sync::Mutex<AgentInstance>>;

/// Conversation plus interruption state under one id.
#[derive(Debug)]
pub struct AgentInstance {
    id: AgentId,
    conversation: ConversationStore,
    interrupt: InterruptionCoordinator,
}

impl AgentInstance {
    /// Fresh agent, optionally seeded with a system prompt.
    pub fn new(system_prompt: Option<&str>) -> Self {
        let conversation = system_prompt
            .map_or_else(ConversationStore::new, ConversationStore::with_system_prompt);
        Self {
            id: AgentId::new(),
            conversation,
            interrupt: InterruptionCoordinator::new(),
        }
    }

    /// Wrap in a [`SharedAgent`].
    #[must_use]
    pub fn shared(self) -> SharedAgent {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Agent id.
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Conversation history.
    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    /// Mutable conversation history.
    pub fn conversation_mut(&mut self) -> &mut ConversationStore {
        &mut self.conversation
    }

    /// Handle to this agent's coordinator.
    pub fn interrupt(&self) -> &InterruptionCoordinator {
        &self.interrupt
    }
}
