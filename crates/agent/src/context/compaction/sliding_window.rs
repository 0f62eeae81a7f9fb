//! Drop whole turns from the oldest end.

use longhaul_core::message::Message;

use crate::context::history::turn_spans;

use super::{CompactionContext, Pass};

/// Drop turns oldest-first until the target is met or only the preserved
/// turns remain. At least one turn is always kept.
pub(super) fn run(messages: Vec<Message>, ctx: &CompactionContext<'_>) -> Pass {
    let mut messages = messages;
    let spans = turn_spans(&messages);
    let keep = ctx.config.preserve_recent_turns.max(1);

    let mut tokens = ctx.tokens(&messages);
    let mut first = 0;
    while tokens > ctx.target() && spans.len() - first > keep {
        tokens -= ctx.counter.count_messages(&messages[spans[first].clone()]);
        first += 1;
    }

    if first > 0 {
        messages.drain(..spans[first].start);
    }
    Pass::new(messages)
}
