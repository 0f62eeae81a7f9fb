//! Score messages by importance and drop the least important first.

use async_trait::async_trait;
use longhaul_core::message::{Message, Role};
use longhaul_core::provider::{Provider, ProviderRequest};
use longhaul_core::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;

use crate::context::history::preserved_start;

use super::{CompactionContext, Pass};

const STRATEGY: &str = "importance_scoring";

/// Rates one message in [0, 1]; higher means more important.
///
/// `position` is the message's index among the `total` messages being
/// scored, oldest first.
#[async_trait]
pub trait ImportanceScorer: Send + Sync {
    async fn score(&self, message: &Message, position: usize, total: usize) -> Result<f64>;
}

/// Scores through the model boundary with a 0–10 rating.
pub struct ProviderScorer {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderScorer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ImportanceScorer for ProviderScorer {
    async fn score(&self, message: &Message, _position: usize, _total: usize) -> Result<f64> {
        let excerpt: String = message.content.chars().take(200).collect();
        let prompt = format!(
            "Rate the importance of this {} message on a scale of 0-10:\n\"{excerpt}\"\nReply with just the number.",
            message.role
        );
        let mut request = ProviderRequest::new(self.model.clone(), vec![Message::user(prompt)]);
        request.temperature = 0.0;

        let response = self.provider.complete(request).await?;
        let reply = response.message.content.trim();
        let rating: f64 = reply.parse().map_err(|_| {
            Error::compaction(STRATEGY, format!("scorer replied with a non-numeric rating: '{reply}'"))
        })?;
        Ok(rating / 10.0)
    }
}

/// Recency, role and length heuristic used when no model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

#[async_trait]
impl ImportanceScorer for HeuristicScorer {
    async fn score(&self, message: &Message, position: usize, total: usize) -> Result<f64> {
        let recency = if total == 0 {
            0.0
        } else {
            position as f64 / total as f64
        };
        let role = match message.role {
            Role::System => 1.0,
            Role::User => 0.7,
            Role::Assistant if message.has_tool_calls() => 0.5,
            Role::Assistant => 0.6,
            Role::Tool => 0.3,
        };
        let length = (message.content.chars().count() as f64 / 500.0).min(0.2);
        Ok(recency * 0.5 + role * 0.4 + length)
    }
}

/// Indices that must be removed or kept together, plus their score.
struct Unit {
    members: Vec<usize>,
    score: f64,
}

/// Split `region` into removal units. A tool-call message and its results
/// form one unit; a call whose result sits in the preserved tail is not
/// removable at all.
fn removal_units(region: &[Message], tail: &[Message]) -> Vec<Vec<usize>> {
    let mut claimed = vec![false; region.len()];
    let mut units = Vec::new();

    for (i, message) in region.iter().enumerate() {
        if claimed[i] {
            continue;
        }
        claimed[i] = true;
        if !message.has_tool_calls() {
            units.push(vec![i]);
            continue;
        }

        let ids: HashSet<&str> = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
        let is_result = |m: &Message| m.tool_call_id.as_deref().is_some_and(|id| ids.contains(id));

        let mut members = vec![i];
        for (j, m) in region.iter().enumerate().skip(i + 1) {
            if m.role == Role::Tool && is_result(m) {
                claimed[j] = true;
                members.push(j);
            }
        }
        if !tail.iter().any(|m| m.role == Role::Tool && is_result(m)) {
            units.push(members);
        }
    }
    units
}

/// Score every message outside the preserved turns and drop units
/// lowest-score first (ties oldest first) until the target is met.
pub(super) async fn run(messages: Vec<Message>, ctx: &CompactionContext<'_>) -> Result<Pass> {
    let protected = preserved_start(&messages, ctx.config.preserve_recent_turns);
    if protected == 0 {
        return Ok(Pass::new(messages));
    }

    let region = &messages[..protected];
    let mut scores = Vec::with_capacity(region.len());
    for (i, message) in region.iter().enumerate() {
        let score = ctx
            .scorer
            .score(message, i, region.len())
            .await
            .map_err(|e| match e {
                Error::Compaction { .. } => e,
                other => Error::compaction(STRATEGY, other.to_string()),
            })?;
        if score.is_nan() {
            return Err(Error::compaction(STRATEGY, format!("scorer returned NaN for message {i}")));
        }
        scores.push(score.clamp(0.0, 1.0));
    }

    let mut units: Vec<Unit> = removal_units(region, &messages[protected..])
        .into_iter()
        .map(|members| {
            let score = members.iter().map(|&i| scores[i]).fold(0.0, f64::max);
            Unit { members, score }
        })
        .collect();
    // Stable sort keeps oldest-first order among equal scores.
    units.sort_by(|a, b| a.score.total_cmp(&b.score));

    let mut tokens = ctx.tokens(&messages);
    let mut remaining = messages.len();
    let mut dropped = vec![false; messages.len()];
    for unit in units {
        if tokens <= ctx.target() {
            break;
        }
        if unit.members.len() >= remaining {
            continue;
        }
        for &i in &unit.members {
            tokens -= ctx.counter.count_message(&messages[i]);
            dropped[i] = true;
        }
        remaining -= unit.members.len();
    }

    let kept = messages
        .into_iter()
        .enumerate()
        .filter_map(|(i, m)| (!dropped[i]).then_some(m))
        .collect();

    Ok(Pass {
        scoring_calls: u32::try_from(protected).unwrap_or(u32::MAX),
        ..Pass::new(kept)
    })
}
