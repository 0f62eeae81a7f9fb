//! Summarize older turns into one synthetic message.

use async_trait::async_trait;
use longhaul_core::message::{Message, Role};
use longhaul_core::provider::{Provider, ProviderRequest};
use longhaul_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::history::{preserved_start, turn_spans};

use super::{CompactionContext, Pass};

/// Produces a summary of a run of messages.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

/// Summarizes through the model boundary.
pub struct ProviderSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let mut request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::user(format!("Summarize this conversation concisely:\n\n{transcript}"))],
        );
        request.temperature = 0.2;

        let response = self.provider.complete(request).await?;
        let summary = response.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(Error::compaction("summarize_older", "model returned an empty summary"));
        }
        Ok(summary)
    }
}

/// Deterministic summary used when no model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSummarizer;

#[async_trait]
impl Summarizer for HeuristicSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let mut parts = vec![format!("Conversation with {} messages.", messages.len())];

        let topics: Vec<String> = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .take(3)
            .map(|m| m.content.chars().take(50).collect())
            .collect();
        if !topics.is_empty() {
            parts.push(format!("Topics discussed: {}...", topics.join(", ")));
        }

        let mut tools: Vec<&str> = Vec::new();
        for call in messages.iter().flat_map(|m| m.tool_calls.iter()) {
            if !tools.contains(&call.name.as_str()) {
                tools.push(&call.name);
            }
        }
        if !tools.is_empty() {
            tools.truncate(5);
            parts.push(format!("Tools used: {}", tools.join(", ")));
        }

        Ok(parts.join(" "))
    }
}

/// Replace every turn before the preserved window with a summary.
///
/// If the summarizer fails, drop older turns oldest-first instead and mark
/// the pass degraded.
pub(super) async fn run(messages: Vec<Message>, ctx: &CompactionContext<'_>) -> Pass {
    let mut older = messages;
    let split = preserved_start(&older, ctx.config.preserve_recent_turns);
    if split == 0 {
        debug!("Nothing older than the preserved turns, skipping summarization");
        return Pass::new(older);
    }
    let recent = older.split_off(split);

    match ctx.summarizer.summarize(&older).await {
        Ok(summary) => {
            let mut kept = Vec::with_capacity(recent.len() + 1);
            kept.push(Message::system(format!("[Previous conversation summary: {summary}]")));
            kept.extend(recent);
            Pass {
                summarization_calls: 1,
                ..Pass::new(kept)
            }
        }
        Err(e) => {
            warn!(
                error = %e,
                older = older.len(),
                "Summarization failed, dropping older turns instead"
            );
            let kept = drop_older_turns(older, recent, ctx);
            Pass {
                degraded: true,
                summarization_calls: 1,
                ..Pass::new(kept)
            }
        }
    }
}

fn drop_older_turns(older: Vec<Message>, recent: Vec<Message>, ctx: &CompactionContext<'_>) -> Vec<Message> {
    let mut older = older;
    let spans = turn_spans(&older);
    // Keep one older turn only when there is nothing recent to fall back on.
    let keep = usize::from(recent.is_empty());

    let mut tokens = ctx.tokens(&older) + ctx.counter.count_messages(&recent);
    let mut first = 0;
    while tokens > ctx.target() && spans.len() - first > keep {
        tokens -= ctx.counter.count_messages(&older[spans[first].clone()]);
        first += 1;
    }

    let cut = spans.get(first).map_or(older.len(), |span| span.start);
    older.drain(..cut);
    older.extend(recent);
    older
}
