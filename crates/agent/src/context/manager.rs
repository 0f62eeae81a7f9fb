//! Context manager — owns the history, decides when to compact.

use longhaul_core::message::{Message, Role};
use longhaul_core::provider::Provider;
use longhaul_core::{CompactionConfig, Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::compaction::{
    self, CompactionContext, CompactionResult, HeuristicScorer, HeuristicSummarizer, ImportanceScorer,
    ProviderScorer, ProviderSummarizer, Summarizer,
};
use super::history::MessageHistory;
use super::token::TokenCounter;

/// Point-in-time view of the managed context.
#[derive(Debug, Clone, Serialize)]
pub struct ContextState {
    pub token_count: usize,
    pub message_count: usize,
    pub system_prompt: Option<String>,
    pub compaction_history: Vec<CompactionResult>,
}

/// Owns the message history and system prompt.
///
/// *When* to compact is decided here; *how* is delegated to the configured
/// strategy. All mutation goes through `&mut self`, so callers sharing a
/// manager across tasks wrap it in a `tokio::sync::Mutex`.
pub struct ContextManager {
    config: CompactionConfig,
    counter: TokenCounter,
    history: MessageHistory,
    compaction_history: Vec<CompactionResult>,
    summarizer: Arc<dyn Summarizer>,
    scorer: Arc<dyn ImportanceScorer>,
}

impl ContextManager {
    /// Create a manager. Fails with a configuration error on invalid thresholds.
    pub fn new(config: CompactionConfig, counter: TokenCounter) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            counter,
            history: MessageHistory::new(),
            compaction_history: Vec::new(),
            summarizer: Arc::new(HeuristicSummarizer),
            scorer: Arc::new(HeuristicScorer),
        })
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ImportanceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Summarize and score through `provider`, using the configured
    /// summarization model ("same" resolves to `agent_model`).
    pub fn with_provider_collaborators(self, provider: Arc<dyn Provider>, agent_model: &str) -> Self {
        let model = self.config.summarization_model_for(agent_model).to_string();
        self.with_summarizer(Arc::new(ProviderSummarizer::new(provider.clone(), model.clone())))
            .with_scorer(Arc::new(ProviderScorer::new(provider, model)))
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Append one message.
    ///
    /// A system-role message replaces the system prompt slot when
    /// `preserve_system_prompt` is set; otherwise it joins the sequence.
    pub fn add_message(&mut self, message: Message) {
        if message.role == Role::System && self.config.preserve_system_prompt {
            self.history.set_system_prompt(message.content);
        } else {
            self.history.push(message);
        }
    }

    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.add_message(message);
        }
    }

    /// System prompt first, then the history.
    pub fn get_messages(&self) -> Vec<Message> {
        self.history.to_vec()
    }

    /// The history without the system prompt.
    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    /// Tokens of the system prompt plus every message.
    pub fn token_count(&self) -> usize {
        let system = self
            .history
            .system_prompt()
            .map_or(0, |m| self.counter.count_message(m));
        system + self.counter.count_messages(self.history.messages())
    }

    pub fn should_compact(&self) -> bool {
        self.token_count() >= self.config.trigger_threshold_tokens
    }

    /// Compact if the trigger threshold has been reached.
    ///
    /// Below the trigger the history is left alone and a zero-removal
    /// result is recorded.
    pub async fn compact(&mut self) -> Result<CompactionResult> {
        if !self.should_compact() {
            let tokens = self.token_count();
            debug!(tokens, trigger = self.config.trigger_threshold_tokens, "Below trigger, not compacting");
            let result = CompactionResult::noop(self.config.strategy, tokens);
            self.compaction_history.push(result.clone());
            return Ok(result);
        }
        self.compact_now().await
    }

    /// Run the configured strategy once regardless of the trigger.
    ///
    /// On success the history is replaced and the result recorded. A result
    /// still at or above the trigger is a [`Error::ContextOverflow`]; the
    /// reduced history is kept either way.
    pub async fn compact_now(&mut self) -> Result<CompactionResult> {
        let strategy = self.config.strategy;
        let (kept, result) = {
            let ctx = CompactionContext {
                config: &self.config,
                counter: &self.counter,
                system_prompt: self.history.system_prompt(),
                summarizer: self.summarizer.as_ref(),
                scorer: self.scorer.as_ref(),
            };
            compaction::compact(strategy, self.history.messages(), &ctx).await?
        };

        self.history.replace(kept);
        self.compaction_history.push(result.clone());

        info!(
            strategy = %result.strategy,
            removed = result.removed_count,
            tokens_before = result.tokens_before,
            tokens_after = result.tokens_after,
            degraded = result.degraded,
            "Context compacted"
        );

        let trigger = self.config.trigger_threshold_tokens;
        if result.tokens_after >= trigger {
            warn!(tokens = result.tokens_after, trigger, "Context still over trigger after compaction");
            return Err(Error::ContextOverflow {
                tokens: result.tokens_after,
                trigger,
                strategy: result.strategy,
            });
        }

        Ok(result)
    }

    pub fn get_context_state(&self) -> ContextState {
        ContextState {
            token_count: self.token_count(),
            message_count: self.history.len(),
            system_prompt: self.system_prompt().map(str::to_string),
            compaction_history: self.compaction_history.clone(),
        }
    }

    /// Drop all messages and compaction records. The system prompt is kept.
    pub fn clear(&mut self) {
        self.history.clear();
        self.compaction_history.clear();
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.history.system_prompt().map(|m| m.content.as_str())
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.history.set_system_prompt(prompt);
    }

    pub fn compaction_history(&self) -> &[CompactionResult] {
        &self.compaction_history
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use longhaul_core::StrategyKind;

    use super::*;

    fn manager(strategy: StrategyKind, trigger: usize, target: usize) -> ContextManager {
        let config = CompactionConfig::new(strategy, trigger, target).with_preserve_recent_turns(2);
        ContextManager::new(config, TokenCounter::default()).unwrap()
    }

    fn fill(manager: &mut ContextManager, turns: usize) {
        for n in 0..turns {
            manager.add_messages([
                Message::user(format!("question {n} {}", "q".repeat(200))),
                Message::assistant(format!("answer {n} {}", "a".repeat(200))),
            ]);
        }
    }

    #[test]
    fn invalid_config_rejected() {
        let config = CompactionConfig::new(StrategyKind::SlidingWindow, 100, 200);
        let err = ContextManager::new(config, TokenCounter::default()).err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn system_messages_go_to_the_slot() {
        let mut mgr = manager(StrategyKind::SlidingWindow, 1000, 500);
        mgr.add_messages([Message::system("rules"), Message::user("hi")]);
        assert_eq!(mgr.system_prompt(), Some("rules"));
        assert_eq!(mgr.history().len(), 1);

        let messages = mgr.get_messages();
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "hi");
    }

    #[test]
    fn system_messages_join_sequence_when_not_preserved() {
        let config = CompactionConfig::new(StrategyKind::SlidingWindow, 1000, 500).with_preserve_system_prompt(false);
        let mut mgr = ContextManager::new(config, TokenCounter::default()).unwrap();
        mgr.add_messages([Message::system("rules"), Message::user("hi")]);
        assert!(mgr.system_prompt().is_none());
        assert_eq!(mgr.history().len(), 2);
    }

    #[tokio::test]
    async fn compact_below_trigger_is_noop() {
        let mut mgr = manager(StrategyKind::SlidingWindow, 100_000, 80_000);
        fill(&mut mgr, 3);
        let before = mgr.token_count();

        assert!(!mgr.should_compact());
        let result = mgr.compact().await.unwrap();
        assert_eq!(result.removed_count, 0);
        assert_eq!(mgr.token_count(), before);
        assert_eq!(mgr.compaction_history().len(), 1);
        assert_eq!(mgr.compaction_history()[0].removed_count, 0);

        mgr.compact().await.unwrap();
        assert_eq!(mgr.compaction_history().len(), 2);
        assert_eq!(mgr.token_count(), before);
    }

    #[tokio::test]
    async fn compact_reduces_and_keeps_system_prompt() {
        let mut mgr = manager(StrategyKind::SlidingWindow, 1_000, 600);
        mgr.set_system_prompt("You are terse.");
        fill(&mut mgr, 10);
        assert!(mgr.should_compact());

        let result = mgr.compact().await.unwrap();

        assert!(result.removed_count > 0);
        assert!(mgr.token_count() <= 600);
        assert_eq!(result.tokens_after, mgr.token_count());
        assert_eq!(mgr.system_prompt(), Some("You are terse."));
        assert_eq!(mgr.compaction_history().len(), 1);
        assert_eq!(mgr.get_context_state().compaction_history.len(), 1);
    }

    #[tokio::test]
    async fn overflow_when_preserved_turns_exceed_trigger() {
        let mut mgr = manager(StrategyKind::SlidingWindow, 200, 100);
        fill(&mut mgr, 6);

        let err = mgr.compact().await.unwrap_err();
        assert!(matches!(err, Error::ContextOverflow { trigger: 200, .. }));
        // The reduced history is installed and recorded anyway.
        assert_eq!(mgr.history().turns().len(), 2);
        assert_eq!(mgr.compaction_history().len(), 1);
    }

    #[tokio::test]
    async fn strategy_error_leaves_history_untouched() {
        struct Broken;

        #[async_trait]
        impl ImportanceScorer for Broken {
            async fn score(&self, _m: &Message, _p: usize, _t: usize) -> Result<f64> {
                Err(Error::Internal("down".into()))
            }
        }

        let mut mgr = manager(StrategyKind::ImportanceScoring, 1_000, 600).with_scorer(Arc::new(Broken));
        fill(&mut mgr, 10);
        let before = mgr.history().len();

        let err = mgr.compact().await.unwrap_err();
        assert!(matches!(err, Error::Compaction { .. }));
        assert_eq!(mgr.history().len(), before);
        assert!(mgr.compaction_history().is_empty());
    }

    #[tokio::test]
    async fn every_strategy_keeps_a_lone_message_and_the_system_prompt() {
        for kind in StrategyKind::ALL {
            let mut mgr = manager(kind, 200, 100);
            mgr.set_system_prompt("You are terse.");
            mgr.add_message(Message::user("x".repeat(2_000)));
            assert!(mgr.should_compact());

            match mgr.compact().await {
                Ok(_) | Err(Error::ContextOverflow { .. }) => {}
                Err(other) => panic!("{kind}: unexpected error {other:?}"),
            }
            assert_eq!(mgr.history().len(), 1, "{kind} dropped the only message");
            assert_eq!(mgr.system_prompt(), Some("You are terse."), "{kind} lost the system prompt");
            assert_eq!(mgr.get_messages()[0].role, Role::System);
            assert_eq!(mgr.compaction_history().len(), 1);
        }
    }

    #[tokio::test]
    async fn unpreserved_system_message_is_ordinary_history() {
        for kind in StrategyKind::ALL {
            let config = CompactionConfig::new(kind, 1_000, 600)
                .with_preserve_recent_turns(2)
                .with_preserve_system_prompt(false);
            let mut mgr = ContextManager::new(config, TokenCounter::default()).unwrap();
            mgr.add_message(Message::system("rules"));
            fill(&mut mgr, 10);
            assert!(mgr.should_compact());

            match mgr.compact().await {
                Ok(_) | Err(Error::ContextOverflow { .. }) => {}
                Err(other) => panic!("{kind}: unexpected error {other:?}"),
            }
            assert!(mgr.system_prompt().is_none());
            assert!(!mgr.history().is_empty(), "{kind} emptied the history");
            assert_eq!(mgr.compaction_history().len(), 1);
            if kind == StrategyKind::SlidingWindow {
                assert!(mgr.history().messages().iter().all(|m| m.content != "rules"));
            }
        }
    }

    #[tokio::test]
    async fn clear_keeps_system_prompt() {
        let mut mgr = manager(StrategyKind::SlidingWindow, 1_000, 600);
        mgr.set_system_prompt("stay");
        fill(&mut mgr, 2);
        mgr.clear();

        let state = mgr.get_context_state();
        assert_eq!(state.message_count, 0);
        assert_eq!(state.system_prompt.as_deref(), Some("stay"));
        assert_eq!(state.token_count, mgr.token_count());
        assert!(state.token_count > 0);
    }
}
