//! Capacity-bounded pool of reusable sub-agents.
//!
//! An entry is keyed by a pool key (normally the tool-call id that created
//! it) and keeps its conversation across uses, which is what lets a
//! delegating tool hold a multi-turn conversation with the same sub-agent.
//!
//! The whole table sits behind one `parking_lot::Mutex`: `acquire`, `release`
//! and eviction are serialized there. Pooled agents themselves run
//! independently once handed out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info};
use weft_core::events::{AgentEvent, EventEmitter, EventType};
use weft_core::ids::AgentId;

use crate::agent::{AgentInstance, SharedAgent};
use crate::errors::PoolError;
use crate::interrupt::InterruptionCoordinator;

/// An acquired agent. Hand it back with [`AgentPool::release`].
#[derive(Clone, Debug)]
pub struct PooledAgent {
    /// Id of the pooled agent.
    pub agent_id: AgentId,
    /// Key the entry is stored under.
    pub pool_key: String,
    /// The agent itself.
    pub agent: SharedAgent,
    /// Coordinator handle, usable without taking the agent lock.
    pub interrupt: InterruptionCoordinator,
}

/// Read-only view of one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolEntryInfo {
    /// Id of the pooled agent.
    pub agent_id: AgentId,
    /// Key the entry is stored under.
    pub pool_key: String,
    /// Whether a caller currently holds it.
    pub acquired: bool,
    /// Last release time.
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    key: String,
    agent: SharedAgent,
    interrupt: InterruptionCoordinator,
    acquired: bool,
    last_used_at: DateTime<Utc>,
    // Monotonic use stamp; wall-clock time can tie or go backwards.
    tick: u64,
}

impl Entry {
    fn handle(&self, agent_id: &AgentId) -> PooledAgent {
        PooledAgent {
            agent_id: agent_id.clone(),
            pool_key: self.key.clone(),
            agent: Arc::clone(&self.agent),
            interrupt: self.interrupt.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct PoolTable {
    entries: HashMap<AgentId, Entry>,
    by_key: HashMap<String, AgentId>,
    clock: u64,
}

impl PoolTable {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn lru_available(&self) -> Option<AgentId> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.acquired)
            .min_by_key(|(_, e)| e.tick)
            .map(|(id, _)| id.clone())
    }

    fn remove(&mut self, id: &AgentId) -> Option<Entry> {
        let entry = self.entries.remove(id)?;
        let _ = self.by_key.remove(&entry.key);
        Some(entry)
    }
}

/// Pool of at most `capacity` agents.
pub struct AgentPool {
    capacity: usize,
    table: Mutex<PoolTable>,
    emitter: Option<Arc<EventEmitter>>,
}

impl AgentPool {
    /// Empty pool holding at most `capacity` agents.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            table: Mutex::new(PoolTable::default()),
            emitter: None,
        }
    }

    /// Announce evictions on `emitter`.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Acquire the agent stored under `key`, building one if there is none.
    ///
    /// A full pool evicts its least recently used available entry first.
    /// Fails with [`PoolError::KeyBusy`] when the entry under `key` is already
    /// held, and with [`PoolError::Exhausted`] when every entry is held.
    pub fn acquire<F>(&self, key: &str, build: F) -> Result<PooledAgent, PoolError>
    where
        F: FnOnce() -> AgentInstance,
    {
        let mut table = self.table.lock();

        if let Some(id) = table.by_key.get(key).cloned() {
            let tick = table.tick();
            let Some(entry) = table.entries.get_mut(&id) else {
                let _ = table.by_key.remove(key);
                return self.insert_new(&mut table, key, build);
            };
            if entry.acquired {
                return Err(PoolError::KeyBusy { key: key.to_string() });
            }
            entry.acquired = true;
            entry.tick = tick;
            debug!(pool_key = key, agent_id = %id, "reusing pooled agent");
            return Ok(entry.handle(&id));
        }

        if table.entries.len() >= self.capacity {
            let victim = table
                .lru_available()
                .ok_or(PoolError::Exhausted { capacity: self.capacity })?;
            if let Some(evicted) = table.remove(&victim) {
                info!(pool_key = %evicted.key, agent_id = %victim, "evicted pooled agent");
                if let Some(emitter) = &self.emitter {
                    let _ = emitter.emit(AgentEvent::new(
                        EventType::AgentPoolEvicted,
                        json!({ "agentId": victim.as_str(), "poolKey": evicted.key }),
                    ));
                }
            }
        }

        self.insert_new(&mut table, key, build)
    }

    fn insert_new<F>(&self, table: &mut PoolTable, key: &str, build: F) -> Result<PooledAgent, PoolError>
    where
        F: FnOnce() -> AgentInstance,
    {
        if table.entries.len() >= self.capacity {
            return Err(PoolError::Exhausted { capacity: self.capacity });
        }
        let instance = build();
        let id = instance.id().clone();
        let interrupt = instance.interrupt().clone();
        let tick = table.tick();
        let entry = Entry {
            key: key.to_string(),
            agent: instance.shared(),
            interrupt,
            acquired: true,
            last_used_at: Utc::now(),
            tick,
        };
        let handle = entry.handle(&id);
        let _ = table.by_key.insert(key.to_string(), id.clone());
        let _ = table.entries.insert(id.clone(), entry);
        debug!(pool_key = key, agent_id = %id, size = table.entries.len(), "pooled new agent");
        Ok(handle)
    }

    /// Mark the entry available again and stamp its last use.
    ///
    /// State is kept. Returns `false` if the agent is not pooled (evicted, or
    /// never was).
    pub fn release(&self, agent_id: &AgentId) -> bool {
        let mut table = self.table.lock();
        let tick = table.tick();
        match table.entries.get_mut(agent_id) {
            Some(entry) => {
                entry.acquired = false;
                entry.last_used_at = Utc::now();
                entry.tick = tick;
                true
            }
            None => false,
        }
    }

    /// Pool key of a pooled agent.
    #[must_use]
    pub fn key_for(&self, agent_id: &AgentId) -> Option<String> {
        self.table.lock().entries.get(agent_id).map(|e| e.key.clone())
    }

    /// Whether `agent_id` is currently held.
    #[must_use]
    pub fn is_acquired(&self, agent_id: &AgentId) -> bool {
        self.table
            .lock()
            .entries
            .get(agent_id)
            .is_some_and(|e| e.acquired)
    }

    /// Number of pooled agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Whether the pool holds no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of pooled agents.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All entries, least recently used first.
    #[must_use]
    pub fn entries(&self) -> Vec<PoolEntryInfo> {
        let table = self.table.lock();
        let mut entries: Vec<_> = table.entries.iter().collect();
        entries.sort_by_key(|(_, e)| e.tick);
        entries
            .into_iter()
            .map(|(id, e)| PoolEntryInfo {
                agent_id: id.clone(),
                pool_key: e.key.clone(),
                acquired: e.acquired,
                last_used_at: e.last_used_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use weft_core::messages::Message;

    fn build() -> AgentInstance {
        AgentInstance::new(Some("sub-agent"))
    }

    #[test]
    fn capacity_one_evicts_only_released_entries() {
        let pool = AgentPool::new(1);
        let k1 = pool.acquire("k1", build).unwrap();

        assert_matches!(
            pool.acquire("k2", build),
            Err(PoolError::Exhausted { capacity: 1 })
        );

        assert!(pool.release(&k1.agent_id));
        let k2 = pool.acquire("k2", build).unwrap();
        assert_ne!(k2.agent_id, k1.agent_id);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.key_for(&k1.agent_id), None);
        assert!(!pool.release(&k1.agent_id));
    }

    #[test]
    fn reacquire_preserves_conversation() {
        let pool = AgentPool::new(2);
        let first = pool.acquire("tc1", build).unwrap();
        first
            .agent
            .try_lock()
            .unwrap()
            .conversation_mut()
            .append(Message::user("review auth.rs"));
        assert!(pool.release(&first.agent_id));

        let again = pool.acquire("tc1", build).unwrap();
        assert_eq!(again.agent_id, first.agent_id);
        let agent = again.agent.try_lock().unwrap();
        assert_eq!(agent.conversation().user_message_count(), 1);
    }

    #[test]
    fn held_key_is_busy() {
        let pool = AgentPool::new(2);
        let _held = pool.acquire("tc1", build).unwrap();
        assert_matches!(pool.acquire("tc1", build), Err(PoolError::KeyBusy { key }) if key == "tc1");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn evicts_least_recently_released() {
        let emitter = Arc::new(EventEmitter::new());
        let mut rx = emitter.subscribe();
        let pool = AgentPool::new(2).with_emitter(emitter);

        let a = pool.acquire("a", build).unwrap();
        let b = pool.acquire("b", build).unwrap();
        assert!(pool.release(&b.agent_id));
        assert!(pool.release(&a.agent_id));

        let _c = pool.acquire("c", build).unwrap();
        assert_eq!(pool.key_for(&a.agent_id).as_deref(), Some("a"));
        assert_eq!(pool.key_for(&b.agent_id), None);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::AgentPoolEvicted);
        assert_eq!(event.data["poolKey"], "b");
    }

    #[test]
    fn entries_view() {
        let pool = AgentPool::new(3);
        let a = pool.acquire("a", build).unwrap();
        let _b = pool.acquire("b", build).unwrap();
        assert!(pool.release(&a.agent_id));
        assert!(!pool.is_acquired(&a.agent_id));

        let entries = pool.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pool_key, "b");
        assert!(entries[0].acquired);
        assert_eq!(entries[1].pool_key, "a");
        assert!(!entries[1].acquired);
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn zero_capacity_never_acquires() {
        let pool = AgentPool::new(0);
        assert_matches!(pool.acquire("k", build), Err(PoolError::Exhausted { .. }));
        assert!(pool.is_empty());
    }
}
