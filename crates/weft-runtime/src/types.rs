//! Run-level types shared by the runner, the delegation tool and callers.

use serde::{Deserialize, Serialize};
use weft_core::ids::AgentId;

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a reply with no tool calls.
    EndTurn,
    /// A cancel was consumed.
    Interrupted,
    /// The turn limit was reached.
    MaxTurns,
}

impl StopReason {
    /// Wire string used in `AGENT_END` payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::Interrupted => "interrupted",
            Self::MaxTurns => "max_turns",
        }
    }
}

/// Where a run sits in the delegation tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunContext {
    /// 0 for the top-level agent.
    pub depth: u32,
    /// Delegated sub-agent run.
    pub specialized: bool,
}

impl RunContext {
    /// Top-level run.
    #[must_use]
    pub fn top_level() -> Self {
        Self::default()
    }

    /// Delegated run at `depth`.
    #[must_use]
    pub fn delegated(depth: u32) -> Self {
        Self {
            depth,
            specialized: true,
        }
    }
}

/// Result of one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    /// Agent that ran.
    pub agent_id: AgentId,
    /// Why the run ended.
    pub stop_reason: StopReason,
    /// Last assistant text, if any.
    pub text: Option<String>,
    /// Model calls made.
    pub turns: u32,
}
