//! Bounded-context management.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`TokenCounter`] | Deterministic token estimates per encoding |
//! | [`MessageHistory`] | Ordered messages plus a system-prompt slot, grouped into turns |
//! | [`compaction`] | Five strategies that shrink a history to a token target |
//! | [`ContextManager`] | Owns the history, decides when to compact |
//!
//! Strategies and the counter never call back into the manager.

pub mod compaction;
pub mod history;
pub mod manager;
pub mod token;

pub use compaction::{
    CompactionResult, HeuristicScorer, HeuristicSummarizer, ImportanceScorer, ProviderScorer,
    ProviderSummarizer, Summarizer,
};
pub use history::MessageHistory;
pub use manager::{ContextManager, ContextState};
pub use token::{Encoding, TokenCounter};
