//! Interruption and cancellation coordinator.
//!
//! One coordinator per agent instance. States:
//!
//! ```text
//! Idle ──interrupt(Cancel)────────► Interrupted(Cancel)       ──reset()──► Idle
//! Idle ──interrupt(Interjection)──► Interrupted(Interjection) ──reset()──► Idle
//! ```
//!
//! `was_interrupted` is orthogonal: it survives `reset()` and is only cleared
//! by [`InterruptionCoordinator::clear_was_interrupted`].
//!
//! ## Batch tokens
//!
//! A [`CancellationToken`] covers one batch of work (a model call plus the
//! tool calls it requests). The token is minted lazily on first touch by
//! either `start_tool_execution` or a cancel, so a cancel that lands before
//! the batch starts is still observed by it: the signalled token stays
//! pending until `reset()` consumes the cancel. After `reset()` the next
//! batch always starts uncancelled.
//!
//! An interjection never signals the token. In-flight work keeps running and
//! the loop splices the queued user text in at its next checkpoint.
//!
//! The coordinator is a cheap `Clone` handle. A delegation can hold a clone to
//! route interjections to a sub-agent while that sub-agent's loop is running.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Kind of interruption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptKind {
    /// Abort in-flight work now.
    Cancel,
    /// A new user instruction arrived; keep working and incorporate it.
    Interjection,
}

/// What a loop checkpoint found, already consumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingInterrupt {
    /// Nothing to act on.
    None,
    /// A cancel (or a cancelled parent). `was_interrupted` is now set.
    Cancel(InterruptContext),
    /// Queued user texts to splice into the conversation, oldest first.
    Interjection(Vec<String>),
}

/// Details attached to an interruption.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterruptContext {
    /// Free-form reason for logs.
    pub reason: Option<String>,
    /// The interruption is a timeout.
    pub is_timeout: bool,
    /// A timed-out step may be retried.
    pub can_continue_after_timeout: bool,
}

impl InterruptContext {
    /// Context carrying a reason.
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Timeout context.
    #[must_use]
    pub fn timeout(can_continue: bool) -> Self {
        Self {
            reason: Some("timeout".into()),
            is_timeout: true,
            can_continue_after_timeout: can_continue,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    active: bool,
    kind: Option<InterruptKind>,
    context: InterruptContext,
    was_interrupted: bool,
    token: Option<CancellationToken>,
    parent: Option<CancellationToken>,
    interjections: VecDeque<String>,
}

impl State {
    fn mint(&self) -> CancellationToken {
        self.parent
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token)
    }

    fn token(&mut self) -> CancellationToken {
        if self.token.is_none() {
            self.token = Some(self.mint());
        }
        self.token.clone().unwrap_or_default()
    }
}

/// Shared handle to one agent's interruption state.
#[derive(Clone, Debug, Default)]
pub struct InterruptionCoordinator {
    state: Arc<Mutex<State>>,
}

impl InterruptionCoordinator {
    /// Idle coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinator whose batch tokens are children of `parent`.
    #[must_use]
    pub fn with_parent(parent: CancellationToken) -> Self {
        let coordinator = Self::new();
        coordinator.set_parent(parent);
        coordinator
    }

    /// Make future batch tokens children of `parent`.
    ///
    /// The pending token is dropped so the next batch picks up the new
    /// parent, unless it carries a cancel that has not been consumed yet.
    pub fn set_parent(&self, parent: CancellationToken) {
        let mut state = self.state.lock();
        let cancel_pending = state.active && state.kind == Some(InterruptKind::Cancel);
        if !cancel_pending {
            state.token = None;
        }
        state.parent = Some(parent);
    }

    /// Whether the parent token (if any) has been cancelled.
    #[must_use]
    pub fn parent_cancelled(&self) -> bool {
        self.state
            .lock()
            .parent
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Interrupt with an empty context.
    pub fn interrupt(&self, kind: InterruptKind) {
        self.interrupt_with(kind, InterruptContext::default());
    }

    /// Interrupt with details.
    ///
    /// A cancel signals the batch token at once, minting it first if no batch
    /// has started.
    pub fn interrupt_with(&self, kind: InterruptKind, context: InterruptContext) {
        let mut state = self.state.lock();
        state.active = true;
        state.kind = Some(kind);
        if kind == InterruptKind::Cancel {
            state.token().cancel();
        }
        debug!(?kind, reason = ?context.reason, is_timeout = context.is_timeout, "interrupted");
        state.context = context;
    }

    /// Queue user text and raise an interjection.
    ///
    /// Does not downgrade an active cancel.
    pub fn interject(&self, text: impl Into<String>) {
        let mut state = self.state.lock();
        state.interjections.push_back(text.into());
        if state.kind != Some(InterruptKind::Cancel) {
            state.active = true;
            state.kind = Some(InterruptKind::Interjection);
            state.context = InterruptContext::reason("interjection");
        }
    }

    /// Drain queued interjection texts, oldest first.
    pub fn take_interjections(&self) -> Vec<String> {
        self.state.lock().interjections.drain(..).collect()
    }

    /// Whether interjection texts are waiting to be spliced in.
    #[must_use]
    pub fn has_interjections(&self) -> bool {
        !self.state.lock().interjections.is_empty()
    }

    /// Token for the upcoming batch, minted if none is pending.
    pub fn start_tool_execution(&self) -> CancellationToken {
        self.state.lock().token()
    }

    /// Retire the finished batch's token.
    ///
    /// A signalled token under an active cancel stays pending until `reset()`.
    pub fn end_tool_execution(&self) {
        let mut state = self.state.lock();
        let cancel_pending = state.active && state.kind == Some(InterruptKind::Cancel);
        if !cancel_pending {
            state.token = None;
        }
    }

    /// Clear active, kind and context. `was_interrupted` is untouched.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.active = false;
        state.kind = None;
        state.context = InterruptContext::default();
        if state.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            state.token = None;
        }
    }

    /// Alias of [`reset`](Self::reset) for teardown call sites.
    pub fn cleanup(&self) {
        self.reset();
    }

    /// Consume the active interruption in one step.
    ///
    /// A cancelled parent counts as a cancel. A cancel marks the request as
    /// interrupted. Queued interjection texts are delivered even if a
    /// `reset()` cleared the interjection that raised them. Either kind is
    /// reset before returning, under the same lock, so nothing raised
    /// concurrently is dropped.
    pub fn consume_pending(&self) -> PendingInterrupt {
        let mut state = self.state.lock();
        let parent_cancelled = state
            .parent
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled);
        let kind = if state.active { state.kind } else { None };

        let pending = match kind {
            Some(InterruptKind::Cancel) => PendingInterrupt::Cancel(state.context.clone()),
            _ if parent_cancelled => PendingInterrupt::Cancel(InterruptContext::reason("parent cancelled")),
            _ if !state.interjections.is_empty() => {
                PendingInterrupt::Interjection(state.interjections.drain(..).collect())
            }
            Some(InterruptKind::Interjection) => PendingInterrupt::Interjection(Vec::new()),
            None => return PendingInterrupt::None,
        };

        if matches!(pending, PendingInterrupt::Cancel(_)) {
            state.was_interrupted = true;
        }
        state.active = false;
        state.kind = None;
        state.context = InterruptContext::default();
        if state.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            state.token = None;
        }
        pending
    }

    /// Whether an interruption is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Active interruption kind.
    #[must_use]
    pub fn kind(&self) -> Option<InterruptKind> {
        let state = self.state.lock();
        if state.active { state.kind } else { None }
    }

    /// Whether an active cancel is pending.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind() == Some(InterruptKind::Cancel)
    }

    /// Context of the active interruption.
    #[must_use]
    pub fn context(&self) -> InterruptContext {
        self.state.lock().context.clone()
    }

    /// Remember that the last request was cut off.
    pub fn mark_request_as_interrupted(&self) {
        self.state.lock().was_interrupted = true;
    }

    /// Whether the last request was cut off.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.state.lock().was_interrupted
    }

    /// Consume the `was_interrupted` flag.
    pub fn clear_was_interrupted(&self) {
        self.state.lock().was_interrupted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_idle() {
        let c = InterruptionCoordinator::new();
        assert!(!c.is_active());
        assert_eq!(c.kind(), None);
        assert!(!c.was_interrupted());
        assert!(!c.start_tool_execution().is_cancelled());
    }

    #[test]
    fn cancel_before_start_is_not_lost() {
        let c = InterruptionCoordinator::new();
        c.interrupt(InterruptKind::Cancel);
        assert!(c.start_tool_execution().is_cancelled());
    }

    #[test]
    fn cancel_signals_the_running_batch() {
        let c = InterruptionCoordinator::new();
        let token = c.start_tool_execution();
        let same = c.start_tool_execution();
        c.interrupt(InterruptKind::Cancel);
        assert!(token.is_cancelled());
        assert!(same.is_cancelled());
    }

    #[test]
    fn reset_gives_a_fresh_batch() {
        let c = InterruptionCoordinator::new();
        c.interrupt(InterruptKind::Cancel);
        c.end_tool_execution();
        assert!(c.start_tool_execution().is_cancelled());
        c.reset();
        assert!(!c.is_active());
        assert!(!c.start_tool_execution().is_cancelled());
    }

    #[test]
    fn interjection_never_signals() {
        let c = InterruptionCoordinator::new();
        let token = c.start_tool_execution();
        c.interject("also update the docs");
        assert_eq!(c.kind(), Some(InterruptKind::Interjection));
        assert!(!token.is_cancelled());
        assert_eq!(c.take_interjections(), vec!["also update the docs"]);
        assert!(c.take_interjections().is_empty());
    }

    #[test]
    fn interjection_does_not_downgrade_cancel() {
        let c = InterruptionCoordinator::new();
        c.interrupt(InterruptKind::Cancel);
        c.interject("wait");
        assert!(c.is_cancelled());
    }

    #[test]
    fn was_interrupted_survives_reset() {
        let c = InterruptionCoordinator::new();
        c.interrupt(InterruptKind::Cancel);
        c.mark_request_as_interrupted();
        c.reset();
        c.cleanup();
        assert!(c.was_interrupted());
        c.clear_was_interrupted();
        assert!(!c.was_interrupted());
    }

    #[test]
    fn timeout_context() {
        let c = InterruptionCoordinator::new();
        c.interrupt_with(InterruptKind::Cancel, InterruptContext::timeout(true));
        let ctx = c.context();
        assert!(ctx.is_timeout);
        assert!(ctx.can_continue_after_timeout);
        c.reset();
        assert_eq!(c.context(), InterruptContext::default());
    }

    #[test]
    fn end_tool_execution_retires_token() {
        let c = InterruptionCoordinator::new();
        let first = c.start_tool_execution();
        c.end_tool_execution();
        let second = c.start_tool_execution();
        c.interrupt(InterruptKind::Cancel);
        assert!(!first.is_cancelled());
        assert!(second.is_cancelled());
    }

    #[test]
    fn parent_cancellation_reaches_batch_tokens() {
        let parent = CancellationToken::new();
        let c = InterruptionCoordinator::with_parent(parent.clone());
        let token = c.start_tool_execution();
        assert!(!c.parent_cancelled());
        parent.cancel();
        assert!(token.is_cancelled());
        assert!(c.parent_cancelled());
    }

    #[test]
    fn new_parent_replaces_a_token_signalled_by_the_old_one() {
        let old = CancellationToken::new();
        let c = InterruptionCoordinator::with_parent(old.clone());
        let _ = c.start_tool_execution();
        old.cancel();

        c.set_parent(CancellationToken::new());
        assert!(!c.start_tool_execution().is_cancelled());
        assert_eq!(c.consume_pending(), PendingInterrupt::None);
    }

    #[test]
    fn set_parent_keeps_an_unconsumed_cancel() {
        let c = InterruptionCoordinator::new();
        c.interrupt(InterruptKind::Cancel);
        c.set_parent(CancellationToken::new());
        assert!(c.start_tool_execution().is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let c = InterruptionCoordinator::new();
        let handle = c.clone();
        handle.interrupt(InterruptKind::Cancel);
        assert!(c.is_cancelled());
    }

    #[test]
    fn consume_cancel_marks_and_resets() {
        let c = InterruptionCoordinator::new();
        c.interrupt_with(InterruptKind::Cancel, InterruptContext::reason("user"));
        assert_eq!(
            c.consume_pending(),
            PendingInterrupt::Cancel(InterruptContext::reason("user"))
        );
        assert!(c.was_interrupted());
        assert!(!c.is_active());
        assert!(!c.start_tool_execution().is_cancelled());
        assert_eq!(c.consume_pending(), PendingInterrupt::None);
    }

    #[test]
    fn consume_interjection_drains_queue() {
        let c = InterruptionCoordinator::new();
        c.interject("one");
        c.interject("two");
        assert_eq!(
            c.consume_pending(),
            PendingInterrupt::Interjection(vec!["one".into(), "two".into()])
        );
        assert!(!c.was_interrupted());
        assert!(c.take_interjections().is_empty());
    }

    #[test]
    fn queued_interjection_outlives_a_timeout_reset() {
        let c = InterruptionCoordinator::new();
        c.interject("also check b.rs");
        c.interrupt_with(InterruptKind::Cancel, InterruptContext::timeout(true));
        c.reset();
        assert!(!c.is_active());
        assert!(c.has_interjections());
        assert_eq!(
            c.consume_pending(),
            PendingInterrupt::Interjection(vec!["also check b.rs".into()])
        );
        assert!(!c.has_interjections());
        assert_eq!(c.consume_pending(), PendingInterrupt::None);
    }

    #[test]
    fn consume_sees_cancelled_parent() {
        let parent = CancellationToken::new();
        let c = InterruptionCoordinator::with_parent(parent.clone());
        c.interject("ignored once the parent is gone");
        parent.cancel();
        assert!(matches!(c.consume_pending(), PendingInterrupt::Cancel(ctx) if ctx.reason.as_deref() == Some("parent cancelled")));
        assert!(c.was_interrupted());
    }

    #[derive(Clone, Copy, Debug)]
    enum Step {
        Start,
        End,
        Cancel,
        Interject,
    }

    proptest! {
        /// Whatever happened before, a start issued after a cancel (with no
        /// reset in between) always hands out a signalled token.
        #[test]
        fn no_ordering_loses_a_cancel(
            prefix in prop::collection::vec(
                prop_oneof![Just(Step::Start), Just(Step::End), Just(Step::Cancel), Just(Step::Interject)],
                0..12,
            ),
            between in prop::collection::vec(prop_oneof![Just(Step::End), Just(Step::Interject)], 0..4),
        ) {
            let c = InterruptionCoordinator::new();
            let run = |step: Step| match step {
                Step::Start => { let _ = c.start_tool_execution(); }
                Step::End => c.end_tool_execution(),
                Step::Cancel => c.interrupt(InterruptKind::Cancel),
                Step::Interject => c.interject("x"),
            };
            prefix.iter().copied().for_each(run);
            c.interrupt(InterruptKind::Cancel);
            between.iter().copied().for_each(run);
            prop_assert!(c.start_tool_execution().is_cancelled());
        }
    }
}
