//! Lifecycle hooks for the reasoning loop.
//!
//! One optional, typed slot per lifecycle point. Hooks run inline on the
//! loop's task; returning `Err` aborts the run with [`Error::Hook`].

use longhaul_core::{Error, Result};
use std::fmt;

use crate::context::CompactionResult;

use super::state::{Action, Observation, TerminationReason, WorkflowState, WorkflowStep};
use super::workflow::ReactResult;

/// Error returned by a hook to abort the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type HookResult = std::result::Result<(), HookError>;

type Slot<F> = Option<Box<F>>;

type PromptHook = dyn Fn(&str) -> HookResult + Send + Sync;
type ResultHook = dyn Fn(&ReactResult) -> HookResult + Send + Sync;
type ErrorHook = dyn Fn(&WorkflowState, &TerminationReason) -> HookResult + Send + Sync;
type NumberedHook = dyn Fn(&WorkflowState, u32) -> HookResult + Send + Sync;
type StepHook = dyn Fn(&WorkflowState, &WorkflowStep) -> HookResult + Send + Sync;
type ThoughtHook = dyn Fn(&WorkflowState, &str) -> HookResult + Send + Sync;
type ActionHook = dyn Fn(&WorkflowState, &Action) -> HookResult + Send + Sync;
type ObservationHook = dyn Fn(&WorkflowState, &Observation) -> HookResult + Send + Sync;
type CompactionHook = dyn Fn(&CompactionResult) -> HookResult + Send + Sync;

/// Callbacks fired by [`ReasoningLoop`](super::ReasoningLoop).
///
/// ```rust,ignore
/// let hooks = ReactHooks::new()
///     .on_thought(|_, thought| { println!("{thought}"); Ok(()) })
///     .on_compaction(|result| { println!("saved {}", result.tokens_saved()); Ok(()) });
/// ```
#[derive(Default)]
pub struct ReactHooks {
    workflow_start: Slot<PromptHook>,
    workflow_complete: Slot<ResultHook>,
    workflow_error: Slot<ErrorHook>,
    step_start: Slot<NumberedHook>,
    step_complete: Slot<StepHook>,
    step_error: Slot<StepHook>,
    iteration_start: Slot<NumberedHook>,
    iteration_complete: Slot<NumberedHook>,
    thought: Slot<ThoughtHook>,
    action: Slot<ActionHook>,
    observation: Slot<ObservationHook>,
    compaction: Slot<CompactionHook>,
}

impl ReactHooks {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ──

    /// Receives the user prompt before the first iteration.
    pub fn on_workflow_start(mut self, f: impl Fn(&str) -> HookResult + Send + Sync + 'static) -> Self {
        self.workflow_start = Some(Box::new(f));
        self
    }

    /// Fires after a successful run, before `run()` returns.
    pub fn on_workflow_complete(
        mut self,
        f: impl Fn(&ReactResult) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.workflow_complete = Some(Box::new(f));
        self
    }

    /// Fires when a run ends in any non-success terminal state.
    pub fn on_workflow_error(
        mut self,
        f: impl Fn(&WorkflowState, &TerminationReason) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.workflow_error = Some(Box::new(f));
        self
    }

    pub fn on_step_start(mut self, f: impl Fn(&WorkflowState, u32) -> HookResult + Send + Sync + 'static) -> Self {
        self.step_start = Some(Box::new(f));
        self
    }

    pub fn on_step_complete(
        mut self,
        f: impl Fn(&WorkflowState, &WorkflowStep) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.step_complete = Some(Box::new(f));
        self
    }

    pub fn on_step_error(
        mut self,
        f: impl Fn(&WorkflowState, &WorkflowStep) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.step_error = Some(Box::new(f));
        self
    }

    pub fn on_iteration_start(
        mut self,
        f: impl Fn(&WorkflowState, u32) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.iteration_start = Some(Box::new(f));
        self
    }

    pub fn on_iteration_complete(
        mut self,
        f: impl Fn(&WorkflowState, u32) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.iteration_complete = Some(Box::new(f));
        self
    }

    pub fn on_thought(mut self, f: impl Fn(&WorkflowState, &str) -> HookResult + Send + Sync + 'static) -> Self {
        self.thought = Some(Box::new(f));
        self
    }

    pub fn on_action(mut self, f: impl Fn(&WorkflowState, &Action) -> HookResult + Send + Sync + 'static) -> Self {
        self.action = Some(Box::new(f));
        self
    }

    pub fn on_observation(
        mut self,
        f: impl Fn(&WorkflowState, &Observation) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.observation = Some(Box::new(f));
        self
    }

    pub fn on_compaction(mut self, f: impl Fn(&CompactionResult) -> HookResult + Send + Sync + 'static) -> Self {
        self.compaction = Some(Box::new(f));
        self
    }

    // ── Dispatch ──

    pub(crate) fn workflow_start(&self, prompt: &str) -> Result<()> {
        fire("on_workflow_start", &self.workflow_start, |h| h(prompt))
    }

    pub(crate) fn workflow_complete(&self, result: &ReactResult) -> Result<()> {
        fire("on_workflow_complete", &self.workflow_complete, |h| h(result))
    }

    pub(crate) fn workflow_error(&self, state: &WorkflowState, reason: &TerminationReason) -> Result<()> {
        fire("on_workflow_error", &self.workflow_error, |h| h(state, reason))
    }

    pub(crate) fn step_start(&self, state: &WorkflowState, step: u32) -> Result<()> {
        fire("on_step_start", &self.step_start, |h| h(state, step))
    }

    pub(crate) fn step_complete(&self, state: &WorkflowState, step: &WorkflowStep) -> Result<()> {
        fire("on_step_complete", &self.step_complete, |h| h(state, step))
    }

    pub(crate) fn step_error(&self, state: &WorkflowState, step: &WorkflowStep) -> Result<()> {
        fire("on_step_error", &self.step_error, |h| h(state, step))
    }

    pub(crate) fn iteration_start(&self, state: &WorkflowState, iteration: u32) -> Result<()> {
        fire("on_iteration_start", &self.iteration_start, |h| h(state, iteration))
    }

    pub(crate) fn iteration_complete(&self, state: &WorkflowState, iteration: u32) -> Result<()> {
        fire("on_iteration_complete", &self.iteration_complete, |h| h(state, iteration))
    }

    pub(crate) fn thought(&self, state: &WorkflowState, thought: &str) -> Result<()> {
        fire("on_thought", &self.thought, |h| h(state, thought))
    }

    pub(crate) fn action(&self, state: &WorkflowState, action: &Action) -> Result<()> {
        fire("on_action", &self.action, |h| h(state, action))
    }

    pub(crate) fn observation(&self, state: &WorkflowState, observation: &Observation) -> Result<()> {
        fire("on_observation", &self.observation, |h| h(state, observation))
    }

    pub(crate) fn compaction(&self, result: &CompactionResult) -> Result<()> {
        fire("on_compaction", &self.compaction, |h| h(result))
    }

    fn registered(&self) -> Vec<&'static str> {
        [
            ("on_workflow_start", self.workflow_start.is_some()),
            ("on_workflow_complete", self.workflow_complete.is_some()),
            ("on_workflow_error", self.workflow_error.is_some()),
            ("on_step_start", self.step_start.is_some()),
            ("on_step_complete", self.step_complete.is_some()),
            ("on_step_error", self.step_error.is_some()),
            ("on_iteration_start", self.iteration_start.is_some()),
            ("on_iteration_complete", self.iteration_complete.is_some()),
            ("on_thought", self.thought.is_some()),
            ("on_action", self.action.is_some()),
            ("on_observation", self.observation.is_some()),
            ("on_compaction", self.compaction.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

impl fmt::Debug for ReactHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactHooks")
            .field("registered", &self.registered())
            .finish()
    }
}

fn fire<H: ?Sized>(name: &'static str, slot: &Slot<H>, call: impl FnOnce(&H) -> HookResult) -> Result<()> {
    match slot {
        Some(hook) => call(hook.as_ref()).map_err(|e| Error::Hook {
            hook: name.to_string(),
            message: e.0,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn empty_hooks_are_noops() {
        let hooks = ReactHooks::new();
        let state = WorkflowState::new();
        assert!(hooks.thought(&state, "hmm").is_ok());
        assert!(hooks.iteration_start(&state, 1).is_ok());
        assert_eq!(format!("{hooks:?}"), "ReactHooks { registered: [] }");
    }

    #[test]
    fn registered_hook_is_called() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let hooks = ReactHooks::new().on_thought(move |_, thought| {
            assert_eq!(thought, "hmm");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        hooks.thought(&WorkflowState::new(), "hmm").unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(format!("{hooks:?}").contains("on_thought"));
    }

    #[test]
    fn hook_error_maps_to_error_hook() {
        let hooks = ReactHooks::new().on_action(|_, _| Err(HookError::new("denied")));
        let action = Action {
            tool_name: "search".into(),
            arguments: serde_json::json!({}),
        };

        let err = hooks.action(&WorkflowState::new(), &action).unwrap_err();
        match err {
            Error::Hook { hook, message } => {
                assert_eq!(hook, "on_action");
                assert_eq!(message, "denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
