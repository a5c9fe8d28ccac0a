//! The orchestration loop.
//!
//! One [`AgentRunner`] drives any number of agents, one run at a time per
//! agent. A run is a sequence of steps:
//!
//! ```text
//! checkpoint ─► model call ─► append assistant ─► tool batch ─► checkpoint ─► …
//! ```
//!
//! Every checkpoint consumes the agent's pending interruption: a cancel ends
//! the run with [`StopReason::Interrupted`]; an interjection splices the queued
//! user texts into the conversation and the loop carries on.
//!
//! The model call and the tool batch both race the step's cancellation token,
//! so a cancel stops them without waiting for the next checkpoint. Tool calls
//! in a batch run concurrently on the current task; their results land in the
//! conversation in completion order, each keyed by its tool-call id.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use weft_context::reminders;
use weft_core::events::{AgentEvent, EventEmitter};
use weft_core::messages::{Message, ToolCall};
use weft_core::provider::{ModelClient, ModelReply, SendOptions};
use weft_core::tools::{ToolContext, ToolExecutor, ToolOutcome};
use weft_settings::RuntimeSettings;
use weft_tasks::SharedTodoList;
use weft_tasks::tool::TODO_WRITE_TOOL_NAME;

use crate::agent::AgentInstance;
use crate::errors::{Result, RuntimeError};
use crate::interrupt::{InterruptContext, InterruptKind, PendingInterrupt};
use crate::types::{RunContext, RunOutcome, StopReason};

const INTERRUPTED_NOTICE: &str = "Your previous response was interrupted by the user before it \
finished. Tool calls that were still running were cancelled and did not complete.";

const INTERRUPTED_TOOL_RESULT: &str = "Interrupted: the tool call was cancelled before it finished.";

const SUMMARY_ARG_KEYS: &[&str] = &["file_path", "filePath", "path", "command", "pattern", "task", "url"];
const MAX_SUMMARY_CHARS: usize = 80;

/// Loop limits and model-call options.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Model calls allowed per run.
    pub max_turns: u32,
    /// Budget for one model call.
    pub model_timeout: Duration,
    /// Budget for one tool call.
    pub tool_timeout: Duration,
    /// Retry a timed-out model call instead of failing the run.
    pub continue_after_timeout: bool,
    /// Timed-out model calls that may be retried per run.
    pub max_timeout_retries: u32,
    /// Options passed to every model call.
    pub send_options: SendOptions,
}

impl From<&RuntimeSettings> for RunnerConfig {
    fn from(settings: &RuntimeSettings) -> Self {
        Self {
            max_turns: settings.max_turns,
            model_timeout: settings.model_timeout(),
            tool_timeout: settings.tool_timeout(),
            continue_after_timeout: settings.continue_after_timeout,
            max_timeout_retries: settings.max_timeout_retries,
            send_options: SendOptions::default(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&RuntimeSettings::default())
    }
}

/// Drives agents through the model/tool loop.
pub struct AgentRunner {
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolExecutor>,
    emitter: Arc<EventEmitter>,
    todos: Option<SharedTodoList>,
    config: RunnerConfig,
}

impl AgentRunner {
    /// Runner over `model` and `tools`, announcing on `emitter`.
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolExecutor>,
        emitter: Arc<EventEmitter>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            model,
            tools,
            emitter,
            todos: None,
            config,
        }
    }

    /// Report top-level tool calls to, and show progress from, this todo list.
    #[must_use]
    pub fn with_todos(mut self, todos: SharedTodoList) -> Self {
        self.todos = Some(todos);
        self
    }

    /// Loop limits in effect.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `agent` on `prompt` until it ends its turn, is cancelled, or hits
    /// a limit. Emits `AGENT_START` and `AGENT_END` around the run.
    ///
    /// # Errors
    ///
    /// Provider failures and model timeouts that may not be retried.
    /// Cancellation is not an error.
    #[instrument(skip_all, fields(agent_id = %agent.id(), depth = ctx.depth))]
    pub async fn run(
        &self,
        agent: &mut AgentInstance,
        prompt: &str,
        ctx: &RunContext,
    ) -> Result<RunOutcome> {
        let agent_id = agent.id().clone();
        let _ = self
            .emitter
            .emit(AgentEvent::agent_start(agent_id.as_str(), ctx.specialized));

        let result = self.run_loop(agent, prompt, ctx).await;

        let stop = match &result {
            Ok(outcome) => outcome.stop_reason.as_str(),
            Err(e) => {
                warn!(error = %e, category = e.category(), "run failed");
                "error"
            }
        };
        let _ = self
            .emitter
            .emit(AgentEvent::agent_end(agent_id.as_str(), ctx.specialized, stop));
        result
    }

    async fn run_loop(
        &self,
        agent: &mut AgentInstance,
        prompt: &str,
        ctx: &RunContext,
    ) -> Result<RunOutcome> {
        let interrupt = agent.interrupt().clone();
        self.prepare_turn(agent, prompt, ctx);

        let mut turns = 0u32;
        let mut timeout_retries = 0u32;
        let mut last_text: Option<String> = None;

        loop {
            if Self::checkpoint(agent) {
                return Ok(Self::outcome(agent, StopReason::Interrupted, last_text, turns));
            }
            if turns >= self.config.max_turns {
                warn!(max_turns = self.config.max_turns, "turn limit reached");
                return Ok(Self::outcome(agent, StopReason::MaxTurns, last_text, turns));
            }

            let token = interrupt.start_tool_execution();
            let reply = tokio::select! {
                biased;
                () = token.cancelled() => None,
                res = tokio::time::timeout(
                    self.config.model_timeout,
                    self.model.send(agent.conversation().messages(), &self.config.send_options),
                ) => Some(res),
            };

            let reply: ModelReply = match reply {
                None => {
                    info!("model call cancelled");
                    let _ = Self::checkpoint(agent);
                    interrupt.mark_request_as_interrupted();
                    interrupt.reset();
                    return Ok(Self::outcome(agent, StopReason::Interrupted, last_text, turns));
                }
                Some(Err(_elapsed)) => {
                    let retry = self.config.continue_after_timeout
                        && timeout_retries < self.config.max_timeout_retries;
                    warn!(
                        timeout = ?self.config.model_timeout,
                        retry,
                        "model call timed out"
                    );
                    interrupt.interrupt_with(InterruptKind::Cancel, InterruptContext::timeout(retry));
                    if retry {
                        timeout_retries += 1;
                        interrupt.reset();
                        continue;
                    }
                    interrupt.mark_request_as_interrupted();
                    interrupt.reset();
                    return Err(RuntimeError::Timeout(self.config.model_timeout));
                }
                Some(Ok(Err(e))) => {
                    interrupt.end_tool_execution();
                    return Err(e.into());
                }
                Some(Ok(Ok(reply))) => reply,
            };

            turns += 1;
            if !reply.content.trim().is_empty() {
                last_text = Some(reply.content.clone());
            }
            let calls = reply.tool_calls.clone();
            agent.conversation_mut().append(reply.into_message());

            if calls.is_empty() {
                interrupt.end_tool_execution();
                if interrupt.is_active()
                    || interrupt.has_interjections()
                    || interrupt.parent_cancelled()
                {
                    continue;
                }
                debug!(turns, "turn ended");
                return Ok(Self::outcome(agent, StopReason::EndTurn, last_text, turns));
            }

            self.execute_batch(agent, &calls, &token, ctx).await;
            interrupt.end_tool_execution();
        }
    }

    fn prepare_turn(&self, agent: &mut AgentInstance, prompt: &str, ctx: &RunContext) {
        let interrupt = agent.interrupt().clone();
        let conversation = agent.conversation_mut();
        let _ = conversation.strip_ephemeral_reminders();

        if interrupt.was_interrupted() {
            conversation.append(Message::user(reminders::wrap(INTERRUPTED_NOTICE)).reminder());
            interrupt.clear_was_interrupted();
        }

        if ctx.depth == 0 {
            if let Some(todos) = &self.todos {
                let todos = todos.lock();
                if !todos.is_empty() {
                    conversation.append(
                        Message::user(reminders::wrap(&format!(
                            "Current todo list:\n{}",
                            todos.render()
                        )))
                        .reminder(),
                    );
                }
            }
        }

        conversation.append(Message::user(prompt));
    }

    /// Consume the pending interruption. Returns `true` when the run must stop.
    fn checkpoint(agent: &mut AgentInstance) -> bool {
        match agent.interrupt().consume_pending() {
            PendingInterrupt::None => false,
            PendingInterrupt::Cancel(context) => {
                info!(reason = ?context.reason, "run cancelled");
                true
            }
            PendingInterrupt::Interjection(texts) => {
                debug!(count = texts.len(), "splicing interjections");
                for text in texts {
                    agent.conversation_mut().append(Message::user(text));
                }
                false
            }
        }
    }

    fn outcome(
        agent: &AgentInstance,
        stop_reason: StopReason,
        text: Option<String>,
        turns: u32,
    ) -> RunOutcome {
        RunOutcome {
            agent_id: agent.id().clone(),
            stop_reason,
            text,
            turns,
        }
    }

    async fn execute_batch(
        &self,
        agent: &mut AgentInstance,
        calls: &[ToolCall],
        token: &CancellationToken,
        ctx: &RunContext,
    ) {
        let agent_id = agent.id().clone();
        let mut pending: FuturesUnordered<_> = calls
            .iter()
            .map(|call| {
                let tool_ctx = ToolContext::new(&call.id, agent_id.clone(), token.clone())
                    .at_depth(ctx.depth);
                self.execute_one(call, tool_ctx)
            })
            .collect();

        let mut finished: HashSet<&str> = HashSet::with_capacity(calls.len());
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                next = pending.next() => match next {
                    Some((call, outcome)) => {
                        let _ = finished.insert(call.id.as_str());
                        self.record_result(agent, ctx, call, &outcome);
                    }
                    None => break,
                },
            }
        }
        drop(pending);

        for call in calls.iter().filter(|c| !finished.contains(c.id.as_str())) {
            debug!(tool = %call.name, tool_call_id = %call.id, "tool call interrupted");
            let _ = self.emitter.emit(AgentEvent::tool_call_end(
                agent_id.as_str(),
                &call.id,
                &call.name,
                false,
                0,
            ));
            let outcome = ToolOutcome::failure(INTERRUPTED_TOOL_RESULT);
            agent
                .conversation_mut()
                .append(Message::tool_result(&call.id, &call.name, outcome.to_content()));
        }
    }

    async fn execute_one<'a>(&self, call: &'a ToolCall, ctx: ToolContext) -> (&'a ToolCall, ToolOutcome) {
        let agent_id = ctx.agent_id.clone();
        let _ = self
            .emitter
            .emit(AgentEvent::tool_call_start(agent_id.as_str(), &call.id, &call.name));

        let start = Instant::now();
        let timeout = self.config.tool_timeout;
        let result = tokio::time::timeout(
            timeout,
            AssertUnwindSafe(self.tools.execute(call, &ctx)).catch_unwind(),
        )
        .await;

        let outcome = match result {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => {
                warn!(tool = %call.name, error = %e, "tool failed");
                ToolOutcome::failure(e.to_string())
            }
            Ok(Err(panic)) => {
                error!(tool = %call.name, panic = %panic_message(panic.as_ref()), "tool panicked during execution");
                ToolOutcome::failure("Internal error: tool crashed")
            }
            Err(_) => {
                warn!(tool = %call.name, ?timeout, "tool timed out");
                ToolOutcome::failure(format!("Tool timed out after {}ms", timeout.as_millis()))
            }
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let _ = self.emitter.emit(AgentEvent::tool_call_end(
            agent_id.as_str(),
            &call.id,
            &call.name,
            outcome.success,
            duration_ms,
        ));
        (call, outcome)
    }

    fn record_result(&self, agent: &mut AgentInstance, ctx: &RunContext, call: &ToolCall, outcome: &ToolOutcome) {
        agent
            .conversation_mut()
            .append(Message::tool_result(&call.id, &call.name, outcome.to_content()));

        if ctx.depth > 0 || call.name == TODO_WRITE_TOOL_NAME {
            return;
        }
        if let Some(todos) = &self.todos {
            let _ = todos.lock().record_tool_call(&call.name, &call_summary(call));
        }
    }
}

/// Short human-readable description of a tool call for the todo log.
fn call_summary(call: &ToolCall) -> String {
    let detail = SUMMARY_ARG_KEYS.iter().find_map(|key| call.str_arg(key));
    let summary = match detail {
        Some(detail) => format!("{} {}", call.name, detail),
        None => call.name.clone(),
    };
    if summary.chars().count() <= MAX_SUMMARY_CHARS {
        return summary;
    }
    let mut cut: String = summary.chars().take(MAX_SUMMARY_CHARS - 1).collect();
    cut.push('…');
    cut
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
