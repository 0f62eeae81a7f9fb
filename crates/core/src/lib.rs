//! # Longhaul Core
//!
//! Domain types, boundary traits, and error definitions for the Longhaul
//! long-running agent runtime. Nothing here performs I/O: the model and
//! tools sit behind traits, settings are plain serde structs.
//!
//! ## Boundaries
//!
//! - [`Provider`] is the only way the runtime talks to a language model.
//! - [`Tool`] / [`ToolRegistry`] is the only way it acts in the world.
//!
//! The agent crate drives both; tests replace them with scripted mocks.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod context;
pub mod agent;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use context::{CompactionConfig, StrategyKind, TokenizerConfig};
pub use agent::{ReactConfig, RetryConfig, TerminationStrategy};
