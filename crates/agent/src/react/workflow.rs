//! The ReAct reasoning loop.
//!
//! Each iteration asks the model for a Thought and/or Action, executes the
//! requested tools, and feeds the Observations back through the context
//! manager. The only success path is a call to the final-answer tool.
//!
//! ```text
//! Running ──▶ TerminatedSuccess         (final-answer tool called)
//!    │    ──▶ TerminatedMaxIterations   (iteration cap hit)
//!    │    ──▶ TerminatedTimeout         (run or model-call budget exceeded)
//!    └──  ──▶ TerminatedError           (fatal model/tool/compaction failure, cancellation)
//! ```

use chrono::Utc;
use longhaul_core::error::{ProviderError, ToolError};
use longhaul_core::message::{Message, MessageToolCall};
use longhaul_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition};
use longhaul_core::tool::{ToolCall, ToolRegistry, ToolResult};
use longhaul_core::{Error, ReactConfig, Result, RetryConfig};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{ContextManager, TokenCounter};
use crate::usage::UsageTracker;

use super::hooks::ReactHooks;
use super::prompts;
use super::scratchpad::{ScratchpadEntry, render_entries};
use super::state::{Action, Observation, TerminationReason, WorkflowState, WorkflowStep};

/// Result of a reasoning run.
#[derive(Debug, Clone, Serialize)]
pub struct ReactResult {
    /// True only when the final-answer tool was called
    pub success: bool,
    /// The final answer, or the best partial output
    pub output: Option<String>,
    /// Trace entries; thoughts omitted unless `expose_reasoning`
    pub scratchpad: Vec<ScratchpadEntry>,
    pub iterations: u32,
    pub steps: usize,
    pub termination: TerminationReason,
    pub duration: Duration,
    pub error: Option<String>,
    pub state: WorkflowState,
}

/// Why an awaited call did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    CallTimeout,
    WorkflowTimeout,
    Cancelled,
}

impl Interrupt {
    /// Termination reason when the interrupted call was a model call.
    fn into_reason(self) -> TerminationReason {
        match self {
            Self::CallTimeout => TerminationReason::StepTimeout,
            Self::WorkflowTimeout => TerminationReason::WorkflowTimeout,
            Self::Cancelled => TerminationReason::Cancelled,
        }
    }
}

enum ModelFailure {
    Interrupted(Interrupt),
    Provider(ProviderError),
}

/// Rejects a second concurrent `run()` and releases on drop.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::WorkflowReentrancy)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A ReAct engine bound to one model, one tool set and one context.
pub struct ReasoningLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    context: Arc<Mutex<ContextManager>>,
    config: ReactConfig,
    retry: RetryConfig,
    hooks: ReactHooks,
    cancel: CancellationToken,
    counter: TokenCounter,
    usage: UsageTracker,
    running: AtomicBool,
    last_state: StdMutex<Option<WorkflowState>>,
}

impl ReasoningLoop {
    /// Create a loop. Fails with a configuration error on invalid settings
    /// or when a registered tool shadows the final-answer tool.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        context: ContextManager,
        config: ReactConfig,
    ) -> Result<Self> {
        config.validate()?;
        if tools.get(&config.final_answer_tool_name).is_some() {
            return Err(Error::config(format!(
                "registered tool '{}' collides with the final-answer tool",
                config.final_answer_tool_name
            )));
        }

        let counter = context.counter().clone();
        Ok(Self {
            provider,
            tools,
            context: Arc::new(Mutex::new(context)),
            config,
            retry: RetryConfig::default(),
            hooks: ReactHooks::default(),
            cancel: CancellationToken::new(),
            counter,
            usage: UsageTracker::new(),
            running: AtomicBool::new(false),
            last_state: StdMutex::new(None),
        })
    }

    pub fn with_hooks(mut self, hooks: ReactHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Result<Self> {
        retry.validate()?;
        self.retry = retry;
        Ok(self)
    }

    /// Cancelling `token` interrupts the in-flight call and ends the run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ReactConfig {
        &self.config
    }

    /// The shared context manager. Persists across runs.
    pub fn context(&self) -> Arc<Mutex<ContextManager>> {
        self.context.clone()
    }

    /// Lifetime token usage across every run of this loop.
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the loop on `prompt` until it terminates.
    ///
    /// Termination by iteration cap, timeout or failure still returns `Ok`
    /// with `success == false`. `Err` is reserved for a concurrent run on the
    /// same instance and for hook failures.
    pub async fn run(&self, prompt: &str) -> Result<ReactResult> {
        let _guard = RunGuard::acquire(&self.running)?;
        let started = Instant::now();
        let deadline = self.config.timeout().map(|budget| started + budget);

        info!(
            model = %self.config.model,
            max_iter = self.config.max_iterations,
            tools = self.tools.len(),
            "ReAct loop starting"
        );

        let mut state = WorkflowState::new();
        let outcome = self.drive(prompt, &mut state, deadline).await;
        self.store_state(&state);
        let reason = outcome?;

        let result = self.build_result(state, reason, started.elapsed());
        info!(
            success = result.success,
            iterations = result.iterations,
            termination = %result.termination,
            duration_ms = result.duration.as_millis() as u64,
            "ReAct loop finished"
        );

        if result.success {
            self.emit(|h| h.workflow_complete(&result))?;
        } else {
            self.emit(|h| h.workflow_error(&result.state, &result.termination))?;
        }
        Ok(result)
    }

    /// Blocking wrapper around [`run`](Self::run) on a fresh current-thread
    /// runtime. Must not be called from inside an async context.
    pub fn run_blocking(&self, prompt: &str) -> Result<ReactResult> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Internal(format!("failed to start runtime: {e}")))?;
        runtime.block_on(self.run(prompt))
    }

    // ── Last-run inspection ──

    /// State of the most recent run, including one aborted by a hook.
    pub fn last_state(&self) -> Option<WorkflowState> {
        self.last_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_scratchpad(&self) -> Vec<ScratchpadEntry> {
        self.last_state()
            .map(|state| self.visible_entries(&state))
            .unwrap_or_default()
    }

    /// The last run's trace, one prefixed line per entry.
    pub fn get_reasoning_trace(&self) -> String {
        let entries = self.get_scratchpad();
        render_entries(&entries, &self.config)
    }

    pub fn get_actions_taken(&self) -> Vec<Action> {
        self.last_state().map(|state| state.actions).unwrap_or_default()
    }

    // ── Loop driver ──

    async fn drive(
        &self,
        prompt: &str,
        state: &mut WorkflowState,
        deadline: Option<Instant>,
    ) -> Result<TerminationReason> {
        self.emit(|h| h.workflow_start(prompt))?;

        {
            let mut ctx = self.context.lock().await;
            if ctx.system_prompt().is_none() {
                ctx.set_system_prompt(prompts::system_prompt(&self.config.final_answer_tool_name));
            }
            ctx.add_message(Message::user(prompt));
        }

        let mut tools = self.tools.definitions();
        tools.push(prompts::final_answer_tool(&self.config.final_answer_tool_name));

        let reason = loop {
            if let Some(reason) = &state.termination {
                break reason.clone();
            }
            if state.iteration >= self.config.max_iterations {
                info!(limit = self.config.max_iterations, "Maximum iterations reached");
                state.terminate(TerminationReason::MaxIterations {
                    limit: self.config.max_iterations,
                });
                continue;
            }
            if self.cancel.is_cancelled() {
                state.terminate(TerminationReason::Cancelled);
                continue;
            }
            if deadline.is_some_and(|at| Instant::now() >= at) {
                state.terminate(TerminationReason::WorkflowTimeout);
                continue;
            }

            state.iteration += 1;
            let n = state.iteration;
            debug!(iteration = n, consecutive_thoughts = state.consecutive_thoughts, "ReAct iteration");
            self.emit(|h| h.iteration_start(state, n))?;
            self.emit(|h| h.step_start(state, n))?;

            let mut step = WorkflowStep::iteration(n);
            self.iterate(state, &tools, deadline, &mut step).await?;
            step.completed_at = Some(Utc::now());
            state.steps.push(step.clone());

            if step.error.is_some() {
                self.emit(|h| h.step_error(state, &step))?;
            } else {
                self.emit(|h| h.step_complete(state, &step))?;
            }
            self.emit(|h| h.iteration_complete(state, n))?;
        };

        Ok(reason)
    }

    /// One Thought/Action/Observation cycle. Terminal outcomes are written
    /// to `state`; only hook failures surface as `Err`.
    async fn iterate(
        &self,
        state: &mut WorkflowState,
        tools: &[ToolDefinition],
        deadline: Option<Instant>,
        step: &mut WorkflowStep,
    ) -> Result<()> {
        let force = state.consecutive_thoughts >= self.config.max_consecutive_thoughts;
        if force {
            info!(
                iteration = state.iteration,
                consecutive_thoughts = state.consecutive_thoughts,
                "Forcing a tool call"
            );
        }
        let request = self.build_request(state, tools, force).await;

        let response = match self.call_model(request, deadline).await {
            Ok(response) => response,
            Err(failure) => {
                let reason = match failure {
                    ModelFailure::Interrupted(interrupt) => interrupt.into_reason(),
                    ModelFailure::Provider(e) => TerminationReason::ModelFailure { message: e.to_string() },
                };
                warn!(iteration = state.iteration, reason = %reason, "Model call failed");
                step.fail(reason.to_string());
                state.terminate(reason);
                return Ok(());
            }
        };

        self.usage.record_response(response.usage.as_ref());
        if let Some(usage) = response.usage {
            state.record_usage(usage.total_tokens);
        }

        let message = response.message;
        let thought = message.content.trim().to_string();

        if message.tool_calls.is_empty() {
            if force {
                debug!(iteration = state.iteration, "Ignoring thought-only reply to a forced request");
                step.output = Some(thought);
                return Ok(());
            }
            state.consecutive_thoughts += 1;
            if !thought.is_empty() {
                self.record_thought(state, &thought)?;
                self.context.lock().await.add_message(Message::assistant(thought.clone()));
            }
            step.output = Some(thought);
            return Ok(());
        }

        if !thought.is_empty() {
            self.record_thought(state, &thought)?;
        }
        state.consecutive_thoughts = 0;

        let final_call = message
            .tool_calls
            .iter()
            .find(|c| c.name == self.config.final_answer_tool_name);
        if let Some(call) = final_call {
            let answer = self.extract_answer(call, &thought);
            self.record_action(
                state,
                Action {
                    tool_name: call.name.clone(),
                    arguments: call.arguments_value(),
                },
            )?;

            {
                let mut ctx = self.context.lock().await;
                ctx.add_message(message.clone());
                for tc in &message.tool_calls {
                    let content = if tc.id == call.id {
                        "Final answer submitted."
                    } else {
                        "Skipped: final answer submitted."
                    };
                    ctx.add_message(Message::tool_result(&tc.id, content));
                }
            }

            info!(iteration = state.iteration, "Final answer submitted");
            state.final_answer = Some(answer.clone());
            state.terminate(TerminationReason::FinalAnswer);
            step.output = Some(answer);
            return Ok(());
        }

        self.context.lock().await.add_message(message.clone());

        let mut calls = message.tool_calls.iter();
        while let Some(tc) = calls.next() {
            let arguments = tc.arguments_value();
            let recorded = self.record_action(
                state,
                Action {
                    tool_name: tc.name.clone(),
                    arguments: arguments.clone(),
                },
            );
            if let Err(e) = recorded {
                self.close_pending(std::iter::once(tc).chain(calls), &format!("Error: {e}"))
                    .await;
                return Err(e);
            }

            let call = ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments,
            };
            let outcome = self.execute_tool(&call, deadline).await;
            self.usage.record_tool_call();

            let observation = match outcome {
                Ok(Ok(result)) => Observation {
                    content: result.output,
                    is_error: !result.success,
                },
                Ok(Err(e)) if self.config.fail_on_tool_error => {
                    warn!(tool = %tc.name, error = %e, "Tool failed, ending run");
                    self.close_pending(std::iter::once(tc).chain(calls), &format!("Error: {e}"))
                        .await;
                    let reason = TerminationReason::ToolFailure {
                        tool: tc.name.clone(),
                        message: e.to_string(),
                    };
                    step.fail(reason.to_string());
                    state.terminate(reason);
                    return Ok(());
                }
                Ok(Err(e)) => Observation {
                    content: format!("Error: {e}"),
                    is_error: true,
                },
                Err(interrupt) => {
                    let reason = interrupt.into_reason();
                    self.close_pending(std::iter::once(tc).chain(calls), &format!("Error: {reason}"))
                        .await;
                    step.fail(reason.to_string());
                    state.terminate(reason);
                    return Ok(());
                }
            };

            self.context
                .lock()
                .await
                .add_message(Message::tool_result(&tc.id, &observation.content));
            if let Err(e) = self.record_observation(state, &observation) {
                self.close_pending(calls, &format!("Error: {e}")).await;
                return Err(e);
            }
            step.output = Some(observation.content);
        }

        self.maybe_compact(state, deadline, step).await
    }

    async fn build_request(
        &self,
        state: &WorkflowState,
        tools: &[ToolDefinition],
        force: bool,
    ) -> ProviderRequest {
        let mut messages = self.context.lock().await.get_messages();
        if state.iteration > 1 {
            let scratchpad = state.scratchpad.render(&self.config);
            messages.push(Message::user(prompts::iteration_prompt(&self.config, &scratchpad, force)));
        }

        ProviderRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools: tools.to_vec(),
            tool_choice: if force { ToolChoice::Required } else { ToolChoice::Auto },
            stop: Vec::new(),
        }
    }

    fn extract_answer(&self, call: &MessageToolCall, thought: &str) -> String {
        match call.arguments_value().get("answer").and_then(|a| a.as_str()) {
            Some(answer) => answer.to_string(),
            None if !thought.is_empty() => thought.to_string(),
            None => call.arguments.clone(),
        }
    }

    // ── Guarded calls ──

    /// Await `fut` under an optional per-call budget, the run deadline and
    /// the cancellation token.
    async fn bounded<F: Future>(
        &self,
        fut: F,
        limit: Option<Duration>,
        deadline: Option<Instant>,
    ) -> std::result::Result<F::Output, Interrupt> {
        let limited = async {
            match limit {
                Some(budget) => tokio::time::timeout(budget, fut)
                    .await
                    .map_err(|_| Interrupt::CallTimeout),
                None => Ok(fut.await),
            }
        };
        let deadlined = async {
            match deadline {
                Some(at) => tokio::time::timeout_at(at, limited)
                    .await
                    .unwrap_or(Err(Interrupt::WorkflowTimeout)),
                None => limited.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            out = deadlined => out,
        }
    }

    /// Call the model, retrying transient errors with exponential backoff.
    async fn call_model(
        &self,
        request: ProviderRequest,
        deadline: Option<Instant>,
    ) -> std::result::Result<ProviderResponse, ModelFailure> {
        let mut attempt = 0;
        loop {
            let call = self.provider.complete(request.clone());
            match self.bounded(call, self.config.step_timeout(), deadline).await {
                Err(interrupt) => return Err(ModelFailure::Interrupted(interrupt)),
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient model error, retrying"
                    );
                    self.bounded(tokio::time::sleep(delay), None, deadline)
                        .await
                        .map_err(ModelFailure::Interrupted)?;
                }
                Ok(Err(e)) => return Err(ModelFailure::Provider(e)),
            }
        }
    }

    /// Execute one tool call with up to `tool_retry_count` immediate retries.
    ///
    /// Unknown tools and bad arguments are not retried. The outer `Err` is a
    /// run-level interruption (deadline or cancellation).
    async fn execute_tool(
        &self,
        call: &ToolCall,
        deadline: Option<Instant>,
    ) -> std::result::Result<std::result::Result<ToolResult, ToolError>, Interrupt> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self
                .bounded(self.tools.execute(call), self.config.tool_timeout(), deadline)
                .await
            {
                Ok(Ok(result)) => return Ok(Ok(result)),
                Ok(Err(e @ (ToolError::NotFound(_) | ToolError::InvalidArguments(_)))) => return Ok(Err(e)),
                Ok(Err(e)) => e,
                Err(Interrupt::CallTimeout) => ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_secs: self.config.tool_timeout_secs.unwrap_or_default(),
                },
                Err(interrupt) => return Err(interrupt),
            };

            if attempt > self.config.tool_retry_count {
                return Ok(Err(error));
            }
            warn!(tool = %call.name, attempt, error = %error, "Tool call failed, retrying");
        }
    }

    /// Answer tool calls that will never run so every call keeps its result.
    async fn close_pending<'a>(&self, calls: impl Iterator<Item = &'a MessageToolCall>, content: &str) {
        let mut ctx = self.context.lock().await;
        for tc in calls {
            ctx.add_message(Message::tool_result(&tc.id, content));
        }
    }

    /// Compact once the context reaches `compact_threshold_ratio` of the trigger.
    async fn maybe_compact(
        &self,
        state: &mut WorkflowState,
        deadline: Option<Instant>,
        step: &mut WorkflowStep,
    ) -> Result<()> {
        if !self.config.auto_compact_in_workflow {
            return Ok(());
        }

        let outcome = {
            let mut ctx = self.context.lock().await;
            let tokens = ctx.token_count();
            let trigger = ctx.config().trigger_threshold_tokens;
            let threshold = (trigger as f64 * self.config.compact_threshold_ratio) as usize;
            if tokens < threshold {
                return Ok(());
            }
            info!(tokens, threshold, iteration = state.iteration, "Compacting context mid-run");
            self.bounded(ctx.compact_now(), None, deadline).await
        };

        let reason = match outcome {
            Ok(Ok(result)) => {
                state.compaction_count += 1;
                return self.emit(|h| h.compaction(&result));
            }
            Ok(Err(Error::ContextOverflow { tokens, trigger, .. })) => {
                state.compaction_count += 1;
                TerminationReason::ContextOverflow { tokens, trigger }
            }
            Ok(Err(e)) => TerminationReason::CompactionFailure { message: e.to_string() },
            Err(interrupt) => interrupt.into_reason(),
        };
        warn!(reason = %reason, "Mid-run compaction failed");
        step.fail(reason.to_string());
        state.terminate(reason);
        Ok(())
    }

    // ── Trace recording ──

    fn record_thought(&self, state: &mut WorkflowState, thought: &str) -> Result<()> {
        state.scratchpad.add_thought(thought, self.counter.count(thought));
        self.emit(|h| h.thought(state, thought))
    }

    fn record_action(&self, state: &mut WorkflowState, action: Action) -> Result<()> {
        let text = prompts::format_action(&action.tool_name, &action.arguments);
        let mut metadata = serde_json::Map::new();
        metadata.insert("tool".into(), serde_json::Value::String(action.tool_name.clone()));
        state.scratchpad.add_action(&text, self.counter.count(&text), metadata);
        debug!(action = %text, "Action");
        state.actions.push(action.clone());
        self.emit(|h| h.action(state, &action))
    }

    fn record_observation(&self, state: &mut WorkflowState, observation: &Observation) -> Result<()> {
        let mut metadata = serde_json::Map::new();
        metadata.insert("is_error".into(), serde_json::Value::Bool(observation.is_error));
        state.scratchpad.add_observation(
            &observation.content,
            self.counter.count(&observation.content),
            metadata,
        );
        self.emit(|h| h.observation(state, observation))
    }

    // ── Helpers ──

    fn emit(&self, fire: impl FnOnce(&ReactHooks) -> Result<()>) -> Result<()> {
        if self.config.enable_hooks {
            fire(&self.hooks)
        } else {
            Ok(())
        }
    }

    fn visible_entries(&self, state: &WorkflowState) -> Vec<ScratchpadEntry> {
        state
            .scratchpad
            .visible(self.config.expose_reasoning)
            .cloned()
            .collect()
    }

    fn store_state(&self, state: &WorkflowState) {
        *self.last_state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
    }

    fn build_result(&self, state: WorkflowState, reason: TerminationReason, duration: Duration) -> ReactResult {
        let success = reason == TerminationReason::FinalAnswer;
        ReactResult {
            success,
            output: state.best_output(),
            scratchpad: self.visible_entries(&state),
            iterations: state.iteration,
            steps: state.steps.len(),
            error: (!success).then(|| reason.to_string()),
            termination: reason,
            duration,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use longhaul_core::message::Role;
    use longhaul_core::{CompactionConfig, StrategyKind, TerminationStrategy};
    use serde_json::json;

    use crate::react::hooks::HookError;
    use crate::react::state::LoopStatus;
    use crate::test_helpers::*;

    use super::*;

    fn context() -> ContextManager {
        ContextManager::new(CompactionConfig::default(), TokenCounter::default()).unwrap()
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(EchoTool));
        Arc::new(tools)
    }

    fn reasoning_loop(provider: SequentialMockProvider, config: ReactConfig) -> (ReasoningLoop, Arc<SequentialMockProvider>) {
        let provider = Arc::new(provider);
        let react = ReasoningLoop::new(provider.clone(), registry(), context(), config).unwrap();
        (react, provider)
    }

    #[test]
    fn reserved_termination_strategies_rejected() {
        let config = ReactConfig {
            termination_strategy: TerminationStrategy::Confidence,
            ..ReactConfig::default()
        };
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let err = ReasoningLoop::new(provider, registry(), context(), config).err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn tool_named_like_final_answer_rejected() {
        let config = ReactConfig {
            final_answer_tool_name: "echo".into(),
            ..ReactConfig::default()
        };
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let err = ReasoningLoop::new(provider, registry(), context(), config).err().unwrap();
        assert!(err.to_string().contains("collides"));
    }

    #[tokio::test]
    async fn final_answer_on_first_iteration() {
        let (react, provider) = reasoning_loop(
            SequentialMockProvider::new(vec![make_final_answer("Paris")]),
            ReactConfig::default(),
        );

        let result = react.run("Capital of France?").await.unwrap();

        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("Paris"));
        assert_eq!(result.iterations, 1);
        assert_eq!(result.state.status, LoopStatus::TerminatedSuccess);
        assert!(result.error.is_none());

        // The final-answer tool is offered alongside the registered tools.
        let request = &provider.requests()[0];
        let names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "final_answer"]);
        assert_eq!(request.tool_choice, ToolChoice::Auto);
    }

    #[tokio::test]
    async fn installs_react_system_prompt_once() {
        let (react, provider) = reasoning_loop(
            SequentialMockProvider::new(vec![make_final_answer("a"), make_final_answer("b")]),
            ReactConfig::default(),
        );

        react.run("first").await.unwrap();
        react.run("second").await.unwrap();

        let request = &provider.requests()[1];
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.contains("final_answer"));
        assert_eq!(request.messages.iter().filter(|m| m.role == Role::System).count(), 1);
    }

    #[tokio::test]
    async fn existing_system_prompt_kept() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_final_answer("ok")]));
        let mut ctx = context();
        ctx.set_system_prompt("Custom rules.");
        let react = ReasoningLoop::new(provider.clone(), registry(), ctx, ReactConfig::default()).unwrap();

        react.run("go").await.unwrap();

        assert_eq!(provider.requests()[0].messages[0].content, "Custom rules.");
    }

    #[tokio::test]
    async fn history_keeps_call_result_pairs() {
        let (react, _) = reasoning_loop(
            SequentialMockProvider::new(vec![
                make_tool_call_response(vec![make_tool_call("echo", json!({"text": "hi"}))], "Let me echo"),
                make_final_answer("hi"),
            ]),
            ReactConfig::default(),
        );

        react.run("say hi").await.unwrap();

        let ctx = react.context();
        let ctx = ctx.lock().await;
        let messages = ctx.history().messages();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant, Role::Tool]
        );
        assert_eq!(messages[2].content, "echo: hi");
        assert_eq!(messages[2].tool_call_id.as_deref(), Some(messages[1].tool_calls[0].id.as_str()));
    }

    #[tokio::test]
    async fn follow_up_requests_carry_scratchpad() {
        let (react, provider) = reasoning_loop(
            SequentialMockProvider::new(vec![
                make_tool_call_response(vec![make_tool_call("echo", json!({"text": "x"}))], "Checking"),
                make_final_answer("x"),
            ]),
            ReactConfig::default(),
        );

        react.run("task").await.unwrap();

        let second = &provider.requests()[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.starts_with("Previous steps:\nThought: Checking\nAction: echo(text='x')\nObservation: echo: x"));
        assert!(last.content.ends_with(prompts::CONTINUE_PROMPT));

        // The instruction is transient.
        let ctx = react.context();
        let ctx = ctx.lock().await;
        assert!(ctx.history().messages().iter().all(|m| !m.content.starts_with("Previous steps")));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_run_is_rejected() {
        let (react, _) = reasoning_loop(
            SequentialMockProvider::new(vec![make_final_answer("done")]).with_delay(Duration::from_secs(1)),
            ReactConfig::default(),
        );

        let (first, second) = tokio::join!(react.run("a"), react.run("b"));

        assert!(first.unwrap().success);
        assert!(matches!(second.unwrap_err(), Error::WorkflowReentrancy));
    }

    #[tokio::test]
    async fn guard_released_after_run() {
        let (react, _) = reasoning_loop(
            SequentialMockProvider::new(vec![make_final_answer("1"), make_final_answer("2")]),
            ReactConfig::default(),
        );
        assert!(react.run("a").await.unwrap().success);
        assert!(react.run("b").await.unwrap().success);
    }

    #[tokio::test]
    async fn disabled_hooks_are_not_called() {
        let config = ReactConfig {
            enable_hooks: false,
            ..ReactConfig::default()
        };
        let (react, _) = reasoning_loop(SequentialMockProvider::new(vec![make_final_answer("ok")]), config);
        let react = react.with_hooks(ReactHooks::new().on_workflow_start(|_| Err(HookError::new("should not fire"))));

        assert!(react.run("go").await.unwrap().success);
    }

    #[tokio::test]
    async fn hidden_reasoning_omits_thoughts() {
        let config = ReactConfig {
            expose_reasoning: false,
            ..ReactConfig::default()
        };
        let (react, _) = reasoning_loop(
            SequentialMockProvider::new(vec![
                make_tool_call_response(vec![make_tool_call("echo", json!({"text": "x"}))], "secret plan"),
                make_final_answer("x"),
            ]),
            config,
        );

        let result = react.run("task").await.unwrap();

        assert!(result.scratchpad.iter().all(|e| !e.content.contains("secret")));
        assert!(!react.get_reasoning_trace().contains("secret"));
        // The full trace is still kept on the state.
        assert!(result.state.scratchpad.render(react.config()).contains("secret plan"));
    }

    #[tokio::test]
    async fn usage_tracked_across_runs() {
        let (react, _) = reasoning_loop(
            SequentialMockProvider::new(vec![
                make_tool_call_response(vec![make_tool_call("echo", json!({"text": "x"}))], ""),
                make_final_answer("x"),
                make_final_answer("y"),
            ]),
            ReactConfig::default(),
        );

        let first = react.run("one").await.unwrap();
        react.context().lock().await.clear();
        react.run("two").await.unwrap();

        assert_eq!(first.state.iteration_token_counts, vec![15, 15]);
        assert_eq!(first.state.total_tokens_used, 30);
        let totals = react.usage().totals();
        assert_eq!(totals.requests, 3);
        assert_eq!(totals.total_tokens, 45);
        assert_eq!(totals.tool_calls, 1);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_observation() {
        let (react, _) = reasoning_loop(
            SequentialMockProvider::new(vec![
                make_tool_call_response(vec![make_tool_call("missing", json!({}))], ""),
                make_final_answer("gave up"),
            ]),
            ReactConfig::default(),
        );

        let result = react.run("task").await.unwrap();

        assert!(result.success);
        let observation = result.state.scratchpad.last(crate::react::EntryKind::Observation).unwrap();
        assert!(observation.contains("Tool not found: missing"));
    }

    #[tokio::test]
    async fn zero_tool_retries_means_one_attempt() {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(FlakyTool::new(1)));
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("flaky", json!({}))], ""),
            make_final_answer("moved on"),
        ]));
        let config = ReactConfig {
            tool_retry_count: 0,
            ..ReactConfig::default()
        };
        let react = ReasoningLoop::new(provider, Arc::new(tools), context(), config).unwrap();

        let result = react.run("task").await.unwrap();

        assert!(result.success);
        let observations: Vec<_> = result.state.scratchpad.of_kind(crate::react::EntryKind::Observation).collect();
        assert_eq!(observations.len(), 1);
        assert!(observations[0].content.contains("attempt 1 failed"));
        assert_eq!(observations[0].metadata["is_error"], json!(true));
    }

    #[tokio::test]
    async fn retries_exhausted_on_transient_model_errors() {
        let (react, provider) = reasoning_loop(
            SequentialMockProvider::with_results(vec![
                Err(ProviderError::Network("reset".into())),
                Err(ProviderError::Network("reset".into())),
            ]),
            ReactConfig::default(),
        );
        let react = react
            .with_retry(RetryConfig {
                max_retries: 1,
                base_delay_ms: 1,
                max_delay_ms: 1,
            })
            .unwrap();

        let result = react.run("task").await.unwrap();

        assert_eq!(provider.call_count(), 2);
        assert!(matches!(result.termination, TerminationReason::ModelFailure { .. }));
        assert_eq!(result.steps, 1);
        assert!(result.state.steps[0].error.is_some());
    }

    #[tokio::test]
    async fn single_iteration_cap_keeps_best_partial() {
        let config = ReactConfig {
            max_iterations: 1,
            ..ReactConfig::default()
        };
        let (react, provider) = reasoning_loop(
            SequentialMockProvider::new(vec![]).then_repeat(make_text_response("pondering")),
            config,
        );

        let result = react.run("task").await.unwrap();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(result.state.status, LoopStatus::TerminatedMaxIterations);
        assert_eq!(result.output.as_deref(), Some("pondering"));
        assert_eq!(result.state.consecutive_thoughts, 1);
    }

    #[test]
    fn run_blocking_outside_runtime() {
        let (react, _) = reasoning_loop(
            SequentialMockProvider::new(vec![make_final_answer("sync")]),
            ReactConfig::default(),
        );
        let result = react.run_blocking("go").unwrap();
        assert_eq!(result.output.as_deref(), Some("sync"));
    }

    #[tokio::test]
    async fn mid_run_compaction_uses_configured_strategy() {
        let compaction = CompactionConfig::new(StrategyKind::SlidingWindow, 1_000, 500).with_preserve_recent_turns(1);
        let ctx = ContextManager::new(compaction, TokenCounter::default()).unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("echo", json!({"text": "x"}))], ""),
            make_final_answer("done"),
        ]));
        let react = ReasoningLoop::new(provider, registry(), ctx, ReactConfig::default()).unwrap();
        {
            let ctx = react.context();
            let mut ctx = ctx.lock().await;
            ctx.add_messages([
                Message::user(format!("old question {}", "q".repeat(1600))),
                Message::assistant(format!("old answer {}", "a".repeat(1600))),
            ]);
        }

        let result = react.run("task").await.unwrap();

        assert!(result.success);
        assert_eq!(result.state.compaction_count, 1);
        let ctx = react.context();
        let ctx = ctx.lock().await;
        assert_eq!(ctx.compaction_history().len(), 1);
        assert!(ctx.history().messages().iter().all(|m| !m.content.starts_with("old question")));
    }
}
