//! Wiring for one session.
//!
//! [`Orchestrator`] owns the top-level agent and everything shared with the
//! agents it delegates to: event emitter, todo list, agent pool, delegation
//! registry and runner. Nothing here is global; every collaborator is passed
//! in through [`OrchestratorBuilder`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info};
use weft_core::events::{AgentEvent, EventEmitter, EventType};
use weft_core::ids::AgentId;
use weft_core::messages::Message;
use weft_core::provider::ModelClient;
use weft_core::tools::ToolExecutor;
use weft_settings::WeftSettings;
use weft_tasks::{SharedTodoList, TodoList, TodoWriteTool};

use crate::agent::{AgentInstance, SharedAgent};
use crate::delegate_tool::DelegateTool;
use crate::delegation::{DelegationRegistry, InterjectionRoute};
use crate::errors::{Result, RuntimeError};
use crate::interrupt::{InterruptContext, InterruptKind, InterruptionCoordinator};
use crate::pool::AgentPool;
use crate::router::ToolRouter;
use crate::runner::{AgentRunner, RunnerConfig};
use crate::types::{RunContext, RunOutcome};

/// Where a user message sent with [`Orchestrator::send_user_message`] went.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageDelivery {
    /// Routed to a running delegated sub-agent.
    SubAgent {
        /// Receiving sub-agent.
        agent_id: AgentId,
        /// Its delegating tool call.
        tool_call_id: String,
    },
    /// Queued for the top-level agent's next checkpoint.
    TopLevel,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    model: Arc<dyn ModelClient>,
    settings: WeftSettings,
    executor: Option<Arc<dyn ToolExecutor>>,
    system_prompt: Option<String>,
    sub_agent_prompt: Option<String>,
    emitter: Option<Arc<EventEmitter>>,
}

impl OrchestratorBuilder {
    /// Settings to run with. Defaults otherwise.
    #[must_use]
    pub fn settings(mut self, settings: WeftSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Executor for every tool the core does not provide itself.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// System prompt of the top-level agent.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Default system prompt of delegated sub-agents.
    #[must_use]
    pub fn sub_agent_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.sub_agent_prompt = Some(prompt.into());
        self
    }

    /// Share an existing emitter instead of creating one.
    #[must_use]
    pub fn emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Validate settings and wire everything together.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Settings`] when the settings do not validate.
    pub fn build(self) -> Result<Orchestrator> {
        self.settings.validate()?;
        let settings = self.settings;

        let emitter = self.emitter.unwrap_or_default();
        let todos = TodoList::shared();
        let pool = Arc::new(AgentPool::new(settings.pool.capacity).with_emitter(Arc::clone(&emitter)));
        let registry = Arc::new(DelegationRegistry::new().with_emitter(Arc::clone(&emitter)));

        let mut delegate = DelegateTool::new(
            &settings.delegation,
            Arc::clone(&pool),
            Arc::clone(&registry),
            Arc::clone(&emitter),
        );
        if let Some(prompt) = self.sub_agent_prompt {
            delegate = delegate.with_default_system_prompt(prompt);
        }
        let delegate = Arc::new(delegate);

        let mut router = ToolRouter::new()
            .with_tool(Arc::new(TodoWriteTool::new(todos.clone(), Arc::clone(&emitter))))
            .with_tool(delegate.clone());
        if let Some(executor) = self.executor {
            router = router.with_fallback(executor);
        }

        let runner = Arc::new(
            AgentRunner::new(
                self.model,
                Arc::new(router),
                Arc::clone(&emitter),
                RunnerConfig::from(&settings.runtime),
            )
            .with_todos(todos.clone()),
        );
        delegate.bind_runner(&runner);

        let agent = AgentInstance::new(self.system_prompt.as_deref());
        let agent_id = agent.id().clone();
        let interrupt = agent.interrupt().clone();
        info!(%agent_id, pool_capacity = settings.pool.capacity, "orchestrator ready");

        Ok(Orchestrator {
            settings,
            emitter,
            todos,
            pool,
            registry,
            runner,
            agent: agent.shared(),
            agent_id,
            interrupt,
            running: AtomicBool::new(false),
        })
    }
}

struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One session: a top-level agent plus its delegation machinery.
pub struct Orchestrator {
    settings: WeftSettings,
    emitter: Arc<EventEmitter>,
    todos: SharedTodoList,
    pool: Arc<AgentPool>,
    registry: Arc<DelegationRegistry>,
    runner: Arc<AgentRunner>,
    agent: SharedAgent,
    agent_id: AgentId,
    interrupt: InterruptionCoordinator,
    running: AtomicBool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Start building a session around `model`.
    pub fn builder(model: Arc<dyn ModelClient>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            model,
            settings: WeftSettings::default(),
            executor: None,
            system_prompt: None,
            sub_agent_prompt: None,
            emitter: None,
        }
    }

    /// Run the top-level agent on a user prompt.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::AgentBusy`] if a run is already in progress, plus
    /// anything [`AgentRunner::run`] returns.
    pub async fn prompt(&self, text: &str) -> Result<RunOutcome> {
        let mut agent = self
            .agent
            .try_lock()
            .map_err(|_| RuntimeError::AgentBusy(self.agent_id.clone()))?;
        self.running.store(true, Ordering::Release);
        let _running = RunningFlag(&self.running);
        self.runner
            .run(&mut agent, text, &RunContext::top_level())
            .await
    }

    /// Cancel the current run, including any sub-agents it delegated to.
    ///
    /// Returns `false` when nothing is running.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            debug!("cancel ignored: no run in progress");
            return false;
        }
        let _ = self.emitter.emit(AgentEvent::new(
            EventType::UserInterruptInitiated,
            json!({ "agentId": self.agent_id.as_str() }),
        ));
        self.interrupt
            .interrupt_with(InterruptKind::Cancel, InterruptContext::reason("user"));
        info!(agent_id = %self.agent_id, "user cancelled run");
        true
    }

    /// Deliver a user message without cancelling anything.
    ///
    /// A running delegated sub-agent gets it first. Otherwise it is queued on
    /// the top-level agent and spliced in at its next checkpoint, which for an
    /// idle agent is right after the next prompt.
    pub fn send_user_message(&self, text: &str) -> MessageDelivery {
        match self.registry.route_interjection(text) {
            InterjectionRoute::Routed {
                agent_id,
                tool_call_id,
            } => MessageDelivery::SubAgent {
                agent_id,
                tool_call_id,
            },
            InterjectionRoute::NotRouted => {
                self.interrupt.interject(text);
                MessageDelivery::TopLevel
            }
        }
    }

    /// Truncate the top-level conversation before its `ordinal`th user
    /// message and return that message's text.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::AgentBusy`] while a run is in progress, or
    /// [`RuntimeError::Context`] when `ordinal` is out of range.
    pub fn rewind_to(&self, ordinal: usize) -> Result<String> {
        let mut agent = self
            .agent
            .try_lock()
            .map_err(|_| RuntimeError::AgentBusy(self.agent_id.clone()))?;
        Ok(agent.conversation_mut().rewind_to(ordinal)?)
    }

    /// Copy of the top-level conversation. Waits for a running turn to finish.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.agent.lock().await.conversation().snapshot()
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Top-level agent id.
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.emitter.subscribe()
    }

    /// The session's event emitter.
    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    /// The session todo list.
    pub fn todos(&self) -> &SharedTodoList {
        &self.todos
    }

    /// The sub-agent pool.
    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    /// The delegation registry.
    pub fn registry(&self) -> &DelegationRegistry {
        &self.registry
    }

    /// Settings in effect.
    pub fn settings(&self) -> &WeftSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use weft_core::mock::{MockModelClient, MockResponse};
    use weft_tasks::{TodoItem, TodoStatus};

    fn orchestrator(script: Vec<MockResponse>) -> Orchestrator {
        Orchestrator::builder(Arc::new(MockModelClient::new(script)))
            .system_prompt("You are weft.")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn prompt_runs_top_level_agent() {
        let o = orchestrator(vec![MockResponse::text("hello")]);
        let outcome = o.prompt("hi").await.unwrap();
        assert_eq!(outcome.agent_id, *o.agent_id());
        assert!(!o.is_running());
        assert_eq!(o.snapshot().await.len(), 3);
    }

    #[tokio::test]
    async fn cancel_when_idle_is_a_noop() {
        let o = orchestrator(vec![MockResponse::text("hello")]);
        assert!(!o.cancel());
        assert_eq!(o.emitter().emit_count(), 0);
        assert_eq!(o.prompt("hi").await.unwrap().text.as_deref(), Some("hello"));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut settings = WeftSettings::default();
        settings.pool.capacity = 0;
        let built = Orchestrator::builder(Arc::new(MockModelClient::new(vec![])))
            .settings(settings)
            .build();
        assert_matches!(built, Err(RuntimeError::Settings(_)));
    }

    #[test]
    fn message_without_delegation_goes_to_top_level() {
        let o = orchestrator(vec![]);
        assert_eq!(o.send_user_message("also this"), MessageDelivery::TopLevel);
        assert_eq!(o.interrupt.kind(), Some(InterruptKind::Interjection));
    }

    #[tokio::test]
    async fn rewind_returns_prompt_text() {
        let o = orchestrator(vec![MockResponse::text("one"), MockResponse::text("two")]);
        let _ = o.prompt("first").await.unwrap();
        let _ = o.prompt("second").await.unwrap();
        assert_eq!(o.rewind_to(1).unwrap(), "second");
        assert_matches!(o.rewind_to(5), Err(RuntimeError::Context(_)));
    }

    #[tokio::test]
    async fn rewind_counts_only_prompts_the_user_sent() {
        let o = orchestrator(vec![MockResponse::text("one"), MockResponse::text("two")]);
        o.todos()
            .lock()
            .apply(vec![TodoItem::new("a", "Do A").with_status(TodoStatus::InProgress)])
            .unwrap();
        let _ = o.prompt("first").await.unwrap();
        let _ = o.prompt("second").await.unwrap();
        assert!(o.snapshot().await.iter().any(Message::is_reminder));

        assert_eq!(o.rewind_to(1).unwrap(), "second");
        assert_eq!(o.rewind_to(0).unwrap(), "first");
        assert_matches!(o.rewind_to(1), Err(RuntimeError::Context(_)));
    }
}
