//! # weft-runtime
//!
//! Everything that runs agents:
//!
//! - [`interrupt`]: per-agent cancel/interjection coordinator and batch tokens
//! - [`agent`]: an agent instance (conversation + coordinator)
//! - [`pool`]: capacity-bounded LRU pool of reusable sub-agents
//! - [`delegation`]: which sub-agent is working for which tool call
//! - [`router`]: name-based tool dispatch with an external fallback
//! - [`runner`]: the model/tool orchestration loop
//! - [`delegate_tool`]: the `agent` tool that runs pooled sub-agents
//! - [`orchestrator`]: session wiring around a top-level agent

#![deny(unsafe_code)]

pub mod agent;
pub mod delegate_tool;
pub mod delegation;
pub mod errors;
pub mod interrupt;
pub mod orchestrator;
pub mod pool;
pub mod router;
pub mod runner;
pub mod types;

pub use agent::{AgentInstance, SharedAgent};
pub use delegate_tool::DelegateTool;
pub use delegation::{DelegationRecord, DelegationRegistry, DelegationState, InterjectionRoute};
pub use errors::{PoolError, Result, RuntimeError};
pub use interrupt::{InterruptContext, InterruptKind, InterruptionCoordinator, PendingInterrupt};
pub use orchestrator::{MessageDelivery, Orchestrator, OrchestratorBuilder};
pub use pool::{AgentPool, PoolEntryInfo, PooledAgent};
pub use router::ToolRouter;
pub use runner::{AgentRunner, RunnerConfig};
pub use types::{RunContext, RunOutcome, StopReason};
