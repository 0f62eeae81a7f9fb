//! Workflow state for one reasoning run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::scratchpad::{EntryKind, Scratchpad};

/// Lifecycle of a run. Every status except `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Running,
    TerminatedSuccess,
    TerminatedMaxIterations,
    TerminatedTimeout,
    TerminatedError,
}

impl LoopStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    /// The model called the final-answer tool.
    FinalAnswer,
    MaxIterations { limit: u32 },
    /// The whole-run budget ran out.
    WorkflowTimeout,
    /// One model call exceeded its budget.
    StepTimeout,
    ToolFailure { tool: String, message: String },
    ModelFailure { message: String },
    CompactionFailure { message: String },
    ContextOverflow { tokens: usize, trigger: usize },
    Cancelled,
}

impl TerminationReason {
    /// The terminal status this reason maps to.
    pub fn status(&self) -> LoopStatus {
        match self {
            Self::FinalAnswer => LoopStatus::TerminatedSuccess,
            Self::MaxIterations { .. } => LoopStatus::TerminatedMaxIterations,
            Self::WorkflowTimeout | Self::StepTimeout => LoopStatus::TerminatedTimeout,
            Self::ToolFailure { .. }
            | Self::ModelFailure { .. }
            | Self::CompactionFailure { .. }
            | Self::ContextOverflow { .. }
            | Self::Cancelled => LoopStatus::TerminatedError,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FinalAnswer => write!(f, "final answer submitted"),
            Self::MaxIterations { limit } => write!(f, "reached maximum iterations ({limit})"),
            Self::WorkflowTimeout => write!(f, "workflow timed out"),
            Self::StepTimeout => write!(f, "model call timed out"),
            Self::ToolFailure { tool, message } => write!(f, "tool '{tool}' failed: {message}"),
            Self::ModelFailure { message } => write!(f, "model call failed: {message}"),
            Self::CompactionFailure { message } => write!(f, "compaction failed: {message}"),
            Self::ContextOverflow { tokens, trigger } => {
                write!(f, "context overflow: {tokens} tokens after compaction (trigger {trigger})")
            }
            Self::Cancelled => write!(f, "run cancelled"),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// The outcome of an action as fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub content: String,
    pub is_error: bool,
}

/// Record of one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_number: u32,
    pub step_type: String,
    pub description: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    pub(crate) fn iteration(step_number: u32) -> Self {
        Self {
            step_number,
            step_type: "react_iteration".into(),
            description: format!("ReAct iteration {step_number}"),
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }
}

/// Everything one `run()` produces. Replaced at the start of each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub iteration: u32,
    pub status: LoopStatus,
    pub termination: Option<TerminationReason>,
    pub final_answer: Option<String>,
    /// Provider-reported tokens per model call
    pub iteration_token_counts: Vec<u32>,
    pub total_tokens_used: u64,
    pub compaction_count: u32,
    pub consecutive_thoughts: u32,
    pub scratchpad: Scratchpad,
    pub actions: Vec<Action>,
    pub steps: Vec<WorkflowStep>,
    pub started_at: DateTime<Utc>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            iteration: 0,
            status: LoopStatus::Running,
            termination: None,
            final_answer: None,
            iteration_token_counts: Vec::new(),
            total_tokens_used: 0,
            compaction_count: 0,
            consecutive_thoughts: 0,
            scratchpad: Scratchpad::new(),
            actions: Vec::new(),
            steps: Vec::new(),
            started_at: Utc::now(),
        }
    }
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Move to the terminal status for `reason`.
    ///
    /// Terminal states are absorbing: once terminated, later calls are
    /// ignored and the first reason stands.
    pub(crate) fn terminate(&mut self, reason: TerminationReason) -> bool {
        if self.is_terminated() {
            return false;
        }
        self.status = reason.status();
        self.termination = Some(reason);
        true
    }

    pub(crate) fn record_usage(&mut self, total_tokens: u32) {
        self.iteration_token_counts.push(total_tokens);
        self.total_tokens_used += u64::from(total_tokens);
    }

    /// The final answer, else the last observation, else the last thought.
    pub fn best_output(&self) -> Option<String> {
        self.final_answer
            .clone()
            .or_else(|| self.scratchpad.last(EntryKind::Observation).map(str::to_string))
            .or_else(|| self.scratchpad.last(EntryKind::Thought).map(str::to_string))
    }
}
