//! `agent`: hand a task to a sub-agent and return its answer.
//!
//! The sub-agent comes from the [`AgentPool`], keyed by the delegating tool
//! call id. Its `agentId` is returned with the result; passing it back in a
//! later call re-acquires the same pooled agent with its history intact.
//! When the pool is full of busy agents the task still runs, on a throwaway
//! agent, and a `WARNING` event says so.
//!
//! User messages routed to the sub-agent after its last checkpoint come back
//! in the result as `undeliveredUserMessages`.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use weft_core::errors::ToolError;
use weft_core::events::{AgentEvent, EventEmitter};
use weft_core::ids::AgentId;
use weft_core::tools::{Tool, ToolContext, ToolOutcome};
use weft_settings::DelegationSettings;

use crate::agent::{AgentInstance, SharedAgent};
use crate::delegation::DelegationRegistry;
use crate::errors::PoolError;
use crate::interrupt::InterruptionCoordinator;
use crate::pool::AgentPool;
use crate::runner::AgentRunner;
use crate::types::{RunContext, StopReason};

const DEFAULT_SUB_AGENT_PROMPT: &str = "You are a focused sub-agent. Complete the delegated \
task using the tools available to you, then reply with a concise summary of the result.";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DelegateArgs {
    task: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
}

/// Sub-agent acquired for one delegation.
struct Lease {
    agent_id: AgentId,
    pool_key: Option<String>,
    agent: SharedAgent,
    interrupt: InterruptionCoordinator,
}

/// Releases the pool entry and the registry record, even if the nested run
/// is dropped mid-flight.
struct LeaseGuard<'a> {
    pool: &'a AgentPool,
    registry: &'a DelegationRegistry,
    tool_call_id: &'a str,
    agent_id: AgentId,
    pooled: bool,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        let _ = self.registry.unregister(self.tool_call_id);
        if self.pooled {
            let _ = self.pool.release(&self.agent_id);
        }
    }
}

/// Delegation tool backed by the agent pool.
pub struct DelegateTool {
    name: String,
    max_depth: u32,
    default_system_prompt: String,
    pool: Arc<AgentPool>,
    registry: Arc<DelegationRegistry>,
    emitter: Arc<EventEmitter>,
    runner: OnceLock<Weak<AgentRunner>>,
}

impl DelegateTool {
    /// Tool named and depth-limited by `settings`.
    pub fn new(
        settings: &DelegationSettings,
        pool: Arc<AgentPool>,
        registry: Arc<DelegationRegistry>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        Self {
            name: settings.tool_name.clone(),
            max_depth: settings.max_depth,
            default_system_prompt: DEFAULT_SUB_AGENT_PROMPT.to_string(),
            pool,
            registry,
            emitter,
            runner: OnceLock::new(),
        }
    }

    /// System prompt for sub-agents whose caller does not supply one.
    #[must_use]
    pub fn with_default_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_system_prompt = prompt.into();
        self
    }

    /// Attach the runner nested runs go through. The first binding wins.
    ///
    /// Held weakly: the runner owns this tool through its router.
    pub fn bind_runner(&self, runner: &Arc<AgentRunner>) {
        let _ = self.runner.set(Arc::downgrade(runner));
    }

    fn lease(&self, args: &DelegateArgs, ctx: &ToolContext) -> Result<Lease, ToolOutcome> {
        let key = match &args.agent_id {
            Some(raw) => {
                let id = AgentId::from_raw(raw.trim());
                self.pool.key_for(&id).ok_or_else(|| {
                    ToolOutcome::failure(format!(
                        "Unknown agentId {raw}: that sub-agent is no longer available. \
                         Start a new delegation without agentId."
                    ))
                })?
            }
            None => ctx.tool_call_id.clone(),
        };

        let prompt = args
            .system_prompt
            .as_deref()
            .unwrap_or(&self.default_system_prompt);
        let build = || AgentInstance::new(Some(prompt));

        match self.pool.acquire(&key, build) {
            Ok(pooled) => Ok(Lease {
                agent_id: pooled.agent_id,
                pool_key: Some(pooled.pool_key),
                agent: pooled.agent,
                interrupt: pooled.interrupt,
            }),
            Err(PoolError::KeyBusy { .. }) => Err(ToolOutcome::failure(format!(
                "Sub-agent {} is busy with another delegation. Wait for it to finish or start \
                 a new delegation without agentId.",
                args.agent_id.as_deref().unwrap_or(&key)
            ))),
            Err(e @ PoolError::Exhausted { .. }) => {
                warn!(error = %e, "falling back to an unpooled sub-agent");
                let _ = self.emitter.emit(AgentEvent::warning(format!(
                    "{e}; running this task on a temporary sub-agent that will not be kept"
                )));
                let instance = build();
                Ok(Lease {
                    agent_id: instance.id().clone(),
                    pool_key: None,
                    interrupt: instance.interrupt().clone(),
                    agent: instance.shared(),
                })
            }
        }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Delegate a task to a sub-agent. Pass agentId from an earlier result to continue that conversation"
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let args: DelegateArgs = serde_json::from_value(args.clone())
            .map_err(|e| ToolError::InvalidArguments(format!("expected {{\"task\": ...}}: {e}")))?;
        if args.task.trim().is_empty() {
            return Ok(ToolOutcome::failure("task must not be empty"));
        }

        let depth = ctx.depth + 1;
        if depth > self.max_depth {
            return Ok(ToolOutcome::failure(format!(
                "Maximum delegation depth ({}) reached. Complete this task yourself.",
                self.max_depth
            )));
        }

        let runner = self
            .runner
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ToolError::ExecutionFailed("no agent runner bound".into()))?;

        let lease = match self.lease(&args, ctx) {
            Ok(lease) => lease,
            Err(outcome) => return Ok(outcome),
        };

        lease.interrupt.set_parent(ctx.cancellation.clone());
        self.registry.register(
            &ctx.tool_call_id,
            &self.name,
            lease.agent_id.clone(),
            lease.pool_key.clone(),
            lease.interrupt.clone(),
        );
        let _guard = LeaseGuard {
            pool: &self.pool,
            registry: &self.registry,
            tool_call_id: &ctx.tool_call_id,
            agent_id: lease.agent_id.clone(),
            pooled: lease.pool_key.is_some(),
        };

        debug!(agent_id = %lease.agent_id, depth, pooled = lease.pool_key.is_some(), "delegating");
        let result = {
            let mut agent = lease.agent.lock().await;
            runner
                .run(&mut agent, args.task.trim(), &RunContext::delegated(depth))
                .await
        };
        let _ = self.registry.transition_to_completing(&ctx.tool_call_id);
        let undelivered = lease.interrupt.take_interjections();

        let outcome = match result {
            Ok(run) => {
                let stop = run.stop_reason;
                let outcome = match stop {
                    StopReason::EndTurn => ToolOutcome::ok(
                        run.text.unwrap_or_else(|| "(sub-agent returned no text)".into()),
                    ),
                    StopReason::Interrupted => {
                        ToolOutcome::failure("Sub-agent was interrupted before it finished.")
                    }
                    StopReason::MaxTurns => {
                        let failure = ToolOutcome::failure(format!(
                            "Sub-agent stopped after {} turns without finishing.",
                            run.turns
                        ));
                        match run.text {
                            Some(text) => failure.with_extra("partial", json!(text)),
                            None => failure,
                        }
                    }
                };
                outcome.with_extra("stopReason", json!(stop.as_str()))
            }
            Err(e) => ToolOutcome::failure(format!("Sub-agent failed: {e}")),
        };
        let outcome = outcome.with_extra("agentId", json!(lease.agent_id.as_str()));
        if undelivered.is_empty() {
            return Ok(outcome);
        }
        debug!(agent_id = %lease.agent_id, count = undelivered.len(), "returning messages the sub-agent never saw");
        Ok(outcome.with_extra("undeliveredUserMessages", json!(undelivered)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::ToolRouter;
    use crate::runner::RunnerConfig;
    use tokio_util::sync::CancellationToken;
    use weft_core::events::EventType;
    use weft_core::messages::ToolCall;
    use weft_core::mock::{MockModelClient, MockResponse};
    use weft_core::tools::ToolExecutor;

    struct Harness {
        tool: Arc<DelegateTool>,
        pool: Arc<AgentPool>,
        registry: Arc<DelegationRegistry>,
        emitter: Arc<EventEmitter>,
        model: Arc<MockModelClient>,
        parent: CancellationToken,
        _runner: Arc<AgentRunner>,
    }

    /// Sends a user message to the running delegation, then cancels it
    /// before the sub-agent reaches another checkpoint.
    struct LateMessage {
        registry: Arc<DelegationRegistry>,
        parent: CancellationToken,
    }

    #[async_trait]
    impl ToolExecutor for LateMessage {
        async fn execute(&self, _call: &ToolCall, ctx: &ToolContext) -> Result<ToolOutcome, ToolError> {
            let _ = self.registry.route_interjection("use the v2 API");
            self.parent.cancel();
            ctx.cancellation.cancelled().await;
            Ok(ToolOutcome::failure("cancelled"))
        }
    }

    fn harness(capacity: usize, max_depth: u32, script: Vec<MockResponse>) -> Harness {
        let emitter = Arc::new(EventEmitter::new());
        let pool = Arc::new(AgentPool::new(capacity).with_emitter(emitter.clone()));
        let registry = Arc::new(DelegationRegistry::new().with_emitter(emitter.clone()));
        let settings = DelegationSettings {
            max_depth,
            ..DelegationSettings::default()
        };
        let tool = Arc::new(DelegateTool::new(&settings, pool.clone(), registry.clone(), emitter.clone()));
        let model = Arc::new(MockModelClient::new(script));
        let parent = CancellationToken::new();
        let router = ToolRouter::new()
            .with_tool(tool.clone())
            .with_fallback(Arc::new(LateMessage {
                registry: registry.clone(),
                parent: parent.clone(),
            }));
        let runner = Arc::new(AgentRunner::new(
            model.clone(),
            Arc::new(router),
            emitter.clone(),
            RunnerConfig::default(),
        ));
        tool.bind_runner(&runner);
        Harness {
            tool,
            pool,
            registry,
            emitter,
            model,
            parent,
            _runner: runner,
        }
    }

    fn ctx(id: &str) -> ToolContext {
        ToolContext::new(id, AgentId::new(), CancellationToken::new())
    }

    #[tokio::test]
    async fn returns_text_and_agent_id_and_releases() {
        let h = harness(2, 2, vec![MockResponse::text("auth.rs looks fine")]);
        let outcome = h
            .tool
            .execute(&json!({"task": "review auth.rs"}), &ctx("tc1"))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.content.as_deref(), Some("auth.rs looks fine"));
        let agent_id = AgentId::from_raw(outcome.extra["agentId"].as_str().unwrap());
        assert_eq!(h.pool.key_for(&agent_id).as_deref(), Some("tc1"));
        assert!(!h.pool.is_acquired(&agent_id));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn follow_up_reuses_the_conversation() {
        let h = harness(
            2,
            2,
            vec![MockResponse::text("first answer"), MockResponse::text("second answer")],
        );
        let first = h
            .tool
            .execute(&json!({"task": "summarise the parser"}), &ctx("tc1"))
            .await
            .unwrap();
        let agent_id = first.extra["agentId"].clone();

        let second = h
            .tool
            .execute(&json!({"task": "now the lexer", "agentId": agent_id}), &ctx("tc2"))
            .await
            .unwrap();
        assert_eq!(second.extra["agentId"], agent_id);
        assert_eq!(h.pool.len(), 1);

        let sent = h.model.request(1).unwrap();
        assert!(sent.iter().any(|m| m.content == "summarise the parser"));
        assert!(sent.iter().any(|m| m.content == "first answer"));
    }

    #[tokio::test]
    async fn unknown_agent_id_is_a_failed_outcome() {
        let h = harness(2, 2, vec![]);
        let outcome = h
            .tool
            .execute(&json!({"task": "x", "agentId": "agent_gone"}), &ctx("tc1"))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("agent_gone"));
        assert_eq!(h.model.call_count(), 0);
    }

    #[tokio::test]
    async fn depth_limit() {
        let h = harness(2, 1, vec![]);
        let outcome = h
            .tool
            .execute(&json!({"task": "x"}), &ctx("tc1").at_depth(1))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Maximum delegation depth (1)"));
    }

    #[tokio::test]
    async fn exhausted_pool_falls_back_with_warning() {
        let h = harness(1, 2, vec![MockResponse::text("done anyway")]);
        let mut rx = h.emitter.subscribe();
        let _held = h.pool.acquire("busy", || AgentInstance::new(None)).unwrap();

        let outcome = h
            .tool
            .execute(&json!({"task": "x"}), &ctx("tc1"))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(h.pool.len(), 1);
        let agent_id = AgentId::from_raw(outcome.extra["agentId"].as_str().unwrap());
        assert_eq!(h.pool.key_for(&agent_id), None);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.event_type, EventType::Warning);
    }

    #[tokio::test]
    async fn nested_tool_calls_run_in_the_sub_agent() {
        let h = harness(
            2,
            2,
            vec![
                MockResponse::tools(vec![ToolCall::new("inner1", "agent", json!({"task": "deeper"}))]),
                MockResponse::text("deepest"),
                MockResponse::text("middle"),
            ],
        );
        let outcome = h
            .tool
            .execute(&json!({"task": "top"}), &ctx("tc1"))
            .await
            .unwrap();
        assert_eq!(outcome.content.as_deref(), Some("middle"));
        assert_eq!(h.pool.len(), 2);
    }

    #[tokio::test]
    async fn messages_the_sub_agent_never_saw_go_back_to_the_caller() {
        let h = harness(
            2,
            2,
            vec![MockResponse::tools(vec![ToolCall::new("inner", "late", json!({}))])],
        );
        let ctx = ToolContext::new("tc1", AgentId::new(), h.parent.clone());
        let outcome = h
            .tool
            .execute(&json!({"task": "migrate the client"}), &ctx)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.extra["stopReason"], "interrupted");
        assert_eq!(outcome.extra["undeliveredUserMessages"], json!(["use the v2 API"]));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn bad_arguments() {
        let h = harness(1, 1, vec![]);
        assert!(matches!(
            h.tool.execute(&json!({"prompt": "x"}), &ctx("tc1")).await,
            Err(ToolError::InvalidArguments(_))
        ));
        let blank = h.tool.execute(&json!({"task": "  "}), &ctx("tc1")).await.unwrap();
        assert!(!blank.success);
    }
}
