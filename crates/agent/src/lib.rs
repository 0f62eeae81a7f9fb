//! Long-running, tool-using agents under a bounded context budget.
//!
//! Two pieces work together:
//!
//! 1. **Context management** — a [`ContextManager`] owns the conversation
//!    and compacts it with one of five strategies once it reaches the
//!    trigger threshold
//! 2. **Reasoning** — a [`ReasoningLoop`] drives Thought → Action →
//!    Observation cycles against a [`Provider`](longhaul_core::Provider)
//!    and a [`ToolRegistry`](longhaul_core::ToolRegistry), compacting
//!    mid-run and reporting through [`ReactHooks`]
//!
//! The loop reads and writes through the context manager on every turn;
//! strategies and the token counter never call back upward.

pub mod context;
pub mod react;
pub mod usage;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{
    CompactionResult, ContextManager, ContextState, Encoding, HeuristicScorer, HeuristicSummarizer,
    ImportanceScorer, MessageHistory, ProviderScorer, ProviderSummarizer, Summarizer, TokenCounter,
};
pub use react::{
    Action, HookError, LoopStatus, Observation, ReactHooks, ReactResult, ReasoningLoop, ScratchpadEntry,
    TerminationReason, WorkflowState, WorkflowStep,
};
pub use usage::{UsageTotals, UsageTracker};
