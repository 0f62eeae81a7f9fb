//! Compaction strategies.
//!
//! Five interchangeable algorithms reduce a message sequence to fit a token
//! budget. They all share one contract:
//!
//! - the system prompt slot is never touched (it is not in the sequence)
//! - a non-empty input never produces an empty output
//! - nothing happens when the input is already at or below target
//! - an assistant tool-call message and its results go or stay together
//! - token totals are recomputed from what was kept
//!
//! Strategies never call back into the context manager.

mod hybrid;
mod importance;
mod selective;
mod sliding_window;
mod summarize;

pub use importance::{HeuristicScorer, ImportanceScorer, ProviderScorer};
pub use summarize::{HeuristicSummarizer, ProviderSummarizer, Summarizer};

use chrono::{DateTime, Utc};
use longhaul_core::message::Message;
use longhaul_core::{CompactionConfig, Error, Result, StrategyKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::token::TokenCounter;

/// Outcome record of one compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionResult {
    /// Strategy name; hybrid runs list their stages, e.g. `hybrid(selective_pruning+sliding_window)`
    pub strategy: String,
    pub removed_count: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub timestamp: DateTime<Utc>,
    /// SummarizeOlder fell back to dropping turns
    #[serde(default)]
    pub degraded: bool,
    /// Stages a hybrid run executed, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StrategyKind>,
    #[serde(default)]
    pub summarization_calls: u32,
    #[serde(default)]
    pub scoring_calls: u32,
}

impl CompactionResult {
    /// A zero-removal record.
    pub fn noop(strategy: StrategyKind, tokens: usize) -> Self {
        Self {
            strategy: strategy.as_str().to_string(),
            removed_count: 0,
            tokens_before: tokens,
            tokens_after: tokens,
            timestamp: Utc::now(),
            degraded: false,
            stages: Vec::new(),
            summarization_calls: 0,
            scoring_calls: 0,
        }
    }

    pub fn tokens_saved(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }
}

/// Everything a strategy may read.
pub struct CompactionContext<'a> {
    pub config: &'a CompactionConfig,
    pub counter: &'a TokenCounter,
    /// The preserved system prompt, counted but never modified
    pub system_prompt: Option<&'a Message>,
    pub summarizer: &'a dyn Summarizer,
    pub scorer: &'a dyn ImportanceScorer,
}

impl CompactionContext<'_> {
    /// Tokens of `messages` plus the system prompt slot.
    pub fn tokens(&self, messages: &[Message]) -> usize {
        self.system_tokens() + self.counter.count_messages(messages)
    }

    fn system_tokens(&self) -> usize {
        self.system_prompt.map_or(0, |m| self.counter.count_message(m))
    }

    fn target(&self) -> usize {
        self.config.target_tokens
    }
}

/// Intermediate output of one strategy pass.
struct Pass {
    messages: Vec<Message>,
    degraded: bool,
    stages: Vec<StrategyKind>,
    summarization_calls: u32,
    scoring_calls: u32,
}

impl Pass {
    fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            degraded: false,
            stages: Vec::new(),
            summarization_calls: 0,
            scoring_calls: 0,
        }
    }
}

/// Run `strategy` over `messages`.
///
/// Returns the retained sequence and the result record. The input is left
/// untouched; the caller decides whether to install the output.
pub async fn compact(
    strategy: StrategyKind,
    messages: &[Message],
    ctx: &CompactionContext<'_>,
) -> Result<(Vec<Message>, CompactionResult)> {
    let tokens_before = ctx.tokens(messages);
    if tokens_before <= ctx.target() {
        return Ok((messages.to_vec(), CompactionResult::noop(strategy, tokens_before)));
    }

    let input = messages.to_vec();
    let pass = match strategy {
        StrategyKind::SlidingWindow => sliding_window::run(input, ctx),
        StrategyKind::SummarizeOlder => summarize::run(input, ctx).await,
        StrategyKind::SelectivePruning => selective::run(input, ctx),
        StrategyKind::ImportanceScoring => importance::run(input, ctx).await?,
        StrategyKind::Hybrid => hybrid::run(input, ctx).await?,
    };

    if pass.messages.is_empty() && !messages.is_empty() {
        return Err(Error::compaction(strategy.as_str(), "strategy produced an empty history"));
    }

    let kept: HashSet<&str> = pass.messages.iter().map(|m| m.id.as_str()).collect();
    let removed_count = messages.iter().filter(|m| !kept.contains(m.id.as_str())).count();

    let name = match strategy {
        StrategyKind::Hybrid if !pass.stages.is_empty() => {
            let stages: Vec<&str> = pass.stages.iter().map(|s| s.as_str()).collect();
            format!("hybrid({})", stages.join("+"))
        }
        other => other.as_str().to_string(),
    };

    let result = CompactionResult {
        strategy: name,
        removed_count,
        tokens_before,
        tokens_after: ctx.tokens(&pass.messages),
        timestamp: Utc::now(),
        degraded: pass.degraded,
        stages: pass.stages,
        summarization_calls: pass.summarization_calls,
        scoring_calls: pass.scoring_calls,
    };

    Ok((pass.messages, result))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn history(turns: usize) -> Vec<Message> {
        (0..turns).flat_map(|n| tool_turn(n, 200)).collect()
    }

    async fn run(kind: StrategyKind, messages: &[Message], config: &CompactionConfig, system: Option<&Message>) -> (Vec<Message>, CompactionResult) {
        let counter = TokenCounter::default();
        let ctx = CompactionContext {
            config,
            counter: &counter,
            system_prompt: system,
            summarizer: &HeuristicSummarizer,
            scorer: &HeuristicScorer,
        };
        compact(kind, messages, &ctx).await.unwrap()
    }

    #[tokio::test]
    async fn every_strategy_keeps_pairs_and_content() {
        let messages = history(12);
        let system = Message::system("You are a careful agent.");
        let config = CompactionConfig::new(StrategyKind::SlidingWindow, 2_000, 1_000).with_preserve_recent_turns(3);

        for kind in StrategyKind::ALL {
            let (kept, result) = run(kind, &messages, &config, Some(&system)).await;
            assert!(!kept.is_empty(), "{kind} emptied the history");
            assert_pairs_intact(&kept);
            assert!(result.tokens_after <= result.tokens_before, "{kind} grew the history");
            assert!(result.removed_count > 0, "{kind} removed nothing");
        }
    }

    #[tokio::test]
    async fn below_target_is_noop_for_every_strategy() {
        let messages = history(2);
        let config = CompactionConfig::new(StrategyKind::SlidingWindow, 100_000, 80_000);

        for kind in StrategyKind::ALL {
            let (kept, result) = run(kind, &messages, &config, None).await;
            assert_eq!(result.removed_count, 0);
            assert_eq!(result.tokens_before, result.tokens_after);
            assert_eq!(kept.len(), messages.len());
            assert_eq!(result.summarization_calls + result.scoring_calls, 0);
        }
    }

    #[tokio::test]
    async fn compaction_is_idempotent_once_under_target() {
        let messages = history(12);
        let config = CompactionConfig::new(StrategyKind::SlidingWindow, 2_000, 1_000).with_preserve_recent_turns(2);

        for kind in StrategyKind::ALL {
            let (first, r1) = run(kind, &messages, &config, None).await;
            if r1.tokens_after > config.target_tokens {
                continue;
            }
            let (second, r2) = run(kind, &first, &config, None).await;
            assert_eq!(r2.removed_count, 0, "{kind} was not idempotent");
            let ids: Vec<&str> = second.iter().map(|m| m.id.as_str()).collect();
            let expected: Vec<&str> = first.iter().map(|m| m.id.as_str()).collect();
            assert_eq!(ids, expected);
        }
    }

    #[tokio::test]
    async fn tokens_include_system_prompt() {
        let messages = history(1);
        let system = Message::system("s".repeat(400));
        let counter = TokenCounter::default();
        let config = CompactionConfig::default();
        let (_, result) = run(StrategyKind::SlidingWindow, &messages, &config, Some(&system)).await;
        assert_eq!(
            result.tokens_before,
            counter.count_messages(&messages) + counter.count_message(&system)
        );
    }
}
