//! Pruning, then sliding window, then summarization.

use longhaul_core::message::Message;
use longhaul_core::{Result, StrategyKind};
use tracing::debug;

use super::{CompactionContext, Pass, selective, sliding_window, summarize};

const STAGES: [StrategyKind; 3] = [
    StrategyKind::SelectivePruning,
    StrategyKind::SlidingWindow,
    StrategyKind::SummarizeOlder,
];

/// Run each stage on the previous stage's output, stopping as soon as the
/// target is met.
pub(super) async fn run(messages: Vec<Message>, ctx: &CompactionContext<'_>) -> Result<Pass> {
    let mut pass = Pass::new(messages);

    for stage in STAGES {
        let tokens = ctx.tokens(&pass.messages);
        if tokens <= ctx.target() {
            break;
        }
        debug!(stage = %stage, tokens, target = ctx.target(), "Running hybrid stage");

        let next = match stage {
            StrategyKind::SelectivePruning => selective::run(pass.messages, ctx),
            StrategyKind::SlidingWindow => sliding_window::run(pass.messages, ctx),
            _ => summarize::run(pass.messages, ctx).await,
        };

        pass = Pass {
            messages: next.messages,
            degraded: pass.degraded || next.degraded,
            stages: pass.stages,
            summarization_calls: pass.summarization_calls + next.summarization_calls,
            scoring_calls: pass.scoring_calls + next.scoring_calls,
        };
        pass.stages.push(stage);
    }

    Ok(pass)
}
