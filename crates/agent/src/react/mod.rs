//! ReAct (Reasoning + Acting) engine.
//!
//! The loop alternates Thought → Action → Observation until the model calls
//! the final-answer tool or a budget runs out. Context grows through the
//! shared [`ContextManager`](crate::context::ContextManager) and is compacted
//! mid-run when it nears the trigger threshold.

pub mod hooks;
pub mod prompts;
pub mod scratchpad;
pub mod state;
pub mod workflow;

pub use hooks::{HookError, HookResult, ReactHooks};
pub use scratchpad::{EntryKind, Scratchpad, ScratchpadEntry};
pub use state::{Action, LoopStatus, Observation, TerminationReason, WorkflowState, WorkflowStep};
pub use workflow::{ReactResult, ReasoningLoop};
