//! Delegation registry: which live sub-agent is working for which tool call.
//!
//! The registry exists for one purpose: when the user sends a message while a
//! delegated sub-agent is running, route it to that sub-agent's conversation
//! instead of the top-level one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use tracing::debug;
use weft_core::events::{AgentEvent, EventEmitter, EventType};
use weft_core::ids::AgentId;

use crate::interrupt::InterruptionCoordinator;

/// Lifecycle of one delegation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelegationState {
    /// The sub-agent loop is running.
    Executing,
    /// The loop finished; the result is being handed back.
    Completing,
}

/// One tracked delegation.
#[derive(Clone, Debug)]
pub struct DelegationRecord {
    /// Tool call that started the delegation.
    pub tool_call_id: String,
    /// Name of the delegating tool.
    pub delegating_tool_name: String,
    /// Sub-agent doing the work.
    pub agent_id: AgentId,
    /// Pool key, if the sub-agent is pooled.
    pub pool_key: Option<String>,
    /// The sub-agent's coordinator.
    pub interrupt: InterruptionCoordinator,
    /// Current state.
    pub state: DelegationState,
    /// Registration time.
    pub started_at: DateTime<Utc>,
    seq: u64,
}

/// Where an interjection went.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterjectionRoute {
    /// Delivered to a running sub-agent.
    Routed {
        /// Receiving sub-agent.
        agent_id: AgentId,
        /// Its delegating tool call.
        tool_call_id: String,
    },
    /// No delegation is executing.
    NotRouted,
}

/// Registry keyed by tool-call id.
pub struct DelegationRegistry {
    records: DashMap<String, DelegationRecord>,
    next_seq: AtomicU64,
    emitter: Option<Arc<EventEmitter>>,
}

impl DelegationRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_seq: AtomicU64::new(0),
            emitter: None,
        }
    }

    /// Announce routed interjections on `emitter`.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Track a delegation that is starting to execute.
    pub fn register(
        &self,
        tool_call_id: &str,
        delegating_tool_name: &str,
        agent_id: AgentId,
        pool_key: Option<String>,
        interrupt: InterruptionCoordinator,
    ) {
        let record = DelegationRecord {
            tool_call_id: tool_call_id.to_string(),
            delegating_tool_name: delegating_tool_name.to_string(),
            agent_id,
            pool_key,
            interrupt,
            state: DelegationState::Executing,
            started_at: Utc::now(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        debug!(tool_call_id, agent_id = %record.agent_id, "delegation registered");
        let _ = self.records.insert(tool_call_id.to_string(), record);
    }

    /// Mark the delegation as handing back its result. Returns `false` if unknown.
    pub fn transition_to_completing(&self, tool_call_id: &str) -> bool {
        match self.records.get_mut(tool_call_id) {
            Some(mut record) => {
                record.state = DelegationState::Completing;
                true
            }
            None => false,
        }
    }

    /// Stop tracking. Returns the record if it existed.
    pub fn unregister(&self, tool_call_id: &str) -> Option<DelegationRecord> {
        self.records.remove(tool_call_id).map(|(_, record)| record)
    }

    /// Snapshot of one record.
    pub fn get(&self, tool_call_id: &str) -> Option<DelegationRecord> {
        self.records.get(tool_call_id).map(|r| r.clone())
    }

    /// Number of executing delegations.
    pub fn executing_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.state == DelegationState::Executing)
            .count()
    }

    /// Number of tracked delegations in any state.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Deliver `text` to the most recently started executing delegation.
    ///
    /// The text is queued while the record is held, so once
    /// [`transition_to_completing`](Self::transition_to_completing) returns
    /// nothing more reaches that sub-agent.
    pub fn route_interjection(&self, text: &str) -> InterjectionRoute {
        loop {
            let Some(key) = self.latest_executing() else {
                return InterjectionRoute::NotRouted;
            };
            let Some(record) = self.records.get(&key) else {
                continue;
            };
            if record.state != DelegationState::Executing {
                continue;
            }
            record.interrupt.interject(text);
            let agent_id = record.agent_id.clone();
            let tool_call_id = record.tool_call_id.clone();
            drop(record);

            debug!(%agent_id, %tool_call_id, "interjection routed to sub-agent");
            if let Some(emitter) = &self.emitter {
                let _ = emitter.emit(AgentEvent::new(
                    EventType::InterjectionRouted,
                    json!({ "agentId": agent_id.as_str(), "toolCallId": tool_call_id }),
                ));
            }
            return InterjectionRoute::Routed {
                agent_id,
                tool_call_id,
            };
        }
    }

    fn latest_executing(&self) -> Option<String> {
        self.records
            .iter()
            .filter(|r| r.state == DelegationState::Executing)
            .max_by_key(|r| r.seq)
            .map(|r| r.key().clone())
    }
}

impl Default for DelegationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
