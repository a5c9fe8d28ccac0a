//! Observer events and the fire-and-forget emitter.
//!
//! Events are `{id, type, timestamp, data}` records. The core never awaits
//! delivery: [`EventEmitter::emit`] pushes onto a broadcast channel and returns
//! immediately, whether or not anyone is listening.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::ids::EventId;

const DEFAULT_CAPACITY: usize = 1024;

/// Kind of an observer event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A tool call started executing.
    ToolCallStart,
    /// A tool call finished (successfully or not).
    ToolCallEnd,
    /// An agent loop started.
    AgentStart,
    /// An agent loop finished.
    AgentEnd,
    /// The todo list changed.
    TodoUpdate,
    /// The user interrupted the running agent.
    UserInterruptInitiated,
    /// A mid-flight user message was delivered to a live sub-agent.
    InterjectionRouted,
    /// The agent pool evicted an idle entry.
    AgentPoolEvicted,
    /// Degraded-but-continuing condition worth surfacing.
    Warning,
}

/// One emitted event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Event id.
    pub id: EventId,
    /// Event kind.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Kind-specific payload (camelCase keys).
    pub data: Value,
}

impl AgentEvent {
    /// Build an event stamped now.
    #[must_use]
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    /// `TOOL_CALL_START`.
    #[must_use]
    pub fn tool_call_start(agent_id: &str, tool_call_id: &str, tool_name: &str) -> Self {
        Self::new(
            EventType::ToolCallStart,
            json!({ "agentId": agent_id, "toolCallId": tool_call_id, "toolName": tool_name }),
        )
    }

    /// `TOOL_CALL_END`.
    #[must_use]
    pub fn tool_call_end(
        agent_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        success: bool,
        duration_ms: u64,
    ) -> Self {
        Self::new(
            EventType::ToolCallEnd,
            json!({
                "agentId": agent_id,
                "toolCallId": tool_call_id,
                "toolName": tool_name,
                "success": success,
                "durationMs": duration_ms,
            }),
        )
    }

    /// `AGENT_START`.
    #[must_use]
    pub fn agent_start(agent_id: &str, is_specialized_agent: bool) -> Self {
        Self::new(
            EventType::AgentStart,
            json!({ "agentId": agent_id, "isSpecializedAgent": is_specialized_agent }),
        )
    }

    /// `AGENT_END`.
    #[must_use]
    pub fn agent_end(agent_id: &str, is_specialized_agent: bool, stop_reason: &str) -> Self {
        Self::new(
            EventType::AgentEnd,
            json!({
                "agentId": agent_id,
                "isSpecializedAgent": is_specialized_agent,
                "stopReason": stop_reason,
            }),
        )
    }

    /// `WARNING`.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(EventType::Warning, json!({ "message": message.into() }))
    }
}

/// Broadcast-backed event bus.
pub struct EventEmitter {
    tx: broadcast::Sender<AgentEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    /// Create an emitter with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an emitter with a custom channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit to all current subscribers. Never blocks.
    ///
    /// Returns how many receivers got the event (0 when nobody listens).
    pub fn emit(&self, event: AgentEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// Total events emitted over the emitter's lifetime.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let emitter = EventEmitter::new();
        assert_eq!(emitter.emit(AgentEvent::warning("nobody home")), 0);
        assert_eq!(emitter.emit_count(), 1);
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();
        let _ = emitter.emit(AgentEvent::agent_start("agent_1", false));
        let _ = emitter.emit(AgentEvent::agent_end("agent_1", false, "end_turn"));

        assert_eq!(rx.recv().await.unwrap().event_type, EventType::AgentStart);
        let end = rx.recv().await.unwrap();
        assert_eq!(end.event_type, EventType::AgentEnd);
        assert_eq!(end.data["stopReason"], "end_turn");
    }

    #[test]
    fn wire_shape() {
        let event = AgentEvent::tool_call_end("agent_1", "tc1", "read", true, 12);
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "TOOL_CALL_END");
        assert_eq!(v["data"]["success"], true);
        assert_eq!(v["data"]["toolName"], "read");
        assert!(v["id"].as_str().unwrap().starts_with("evt_"));
    }

    #[test]
    fn specialized_agent_flag() {
        let event = AgentEvent::agent_start("agent_2", true);
        assert_eq!(event.data["isSpecializedAgent"], true);
        assert_eq!(
            serde_json::to_value(EventType::UserInterruptInitiated).unwrap(),
            "USER_INTERRUPT_INITIATED"
        );
    }
}
