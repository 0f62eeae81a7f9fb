//! Prune resolved tool-call groups outside the preserved turns.

use longhaul_core::message::{Message, Role};

use crate::context::history::preserved_start;

use super::{CompactionContext, Pass};

/// An assistant tool-call message plus the indices of its results.
#[derive(Debug, PartialEq)]
struct ToolGroup {
    call: usize,
    results: Vec<usize>,
}

/// Groups in `region` whose every call has a result inside `region`.
fn resolved_groups(region: &[Message]) -> Vec<ToolGroup> {
    region
        .iter()
        .enumerate()
        .filter(|(_, m)| m.has_tool_calls())
        .filter_map(|(call, message)| {
            let mut results = Vec::with_capacity(message.tool_calls.len());
            for tc in &message.tool_calls {
                let found = region.iter().enumerate().skip(call + 1).find(|(_, m)| {
                    m.role == Role::Tool && m.tool_call_id.as_deref() == Some(tc.id.as_str())
                });
                results.push(found?.0);
            }
            Some(ToolGroup { call, results })
        })
        .collect()
}

/// Remove resolved groups oldest-first until the target is met.
///
/// The assistant text of a pruned group survives as a plain assistant
/// message; a group without text disappears entirely.
pub(super) fn run(messages: Vec<Message>, ctx: &CompactionContext<'_>) -> Pass {
    let protected = preserved_start(&messages, ctx.config.preserve_recent_turns);
    let groups = resolved_groups(&messages[..protected]);

    let mut tokens = ctx.tokens(&messages);
    let mut remaining = messages.len();
    let mut dropped = vec![false; messages.len()];
    let mut remnants: Vec<(usize, Message)> = Vec::new();

    for group in groups {
        if tokens <= ctx.target() {
            break;
        }
        let call = &messages[group.call];
        let remnant = (!call.content.trim().is_empty()).then(|| {
            let mut m = Message::assistant(call.content.clone());
            m.metadata
                .insert("pruned_tool_calls".into(), serde_json::json!(call.tool_calls.len()));
            m
        });

        let removed = 1 + group.results.len() - usize::from(remnant.is_some());
        if removed >= remaining {
            break;
        }

        let freed: usize = std::iter::once(group.call)
            .chain(group.results.iter().copied())
            .map(|i| ctx.counter.count_message(&messages[i]))
            .sum();
        let added = remnant.as_ref().map_or(0, |m| ctx.counter.count_message(m));
        tokens = tokens + added - freed;
        remaining -= removed;

        dropped[group.call] = true;
        for &i in &group.results {
            dropped[i] = true;
        }
        if let Some(m) = remnant {
            remnants.push((group.call, m));
        }
    }

    if remnants.is_empty() && !dropped.contains(&true) {
        return Pass::new(messages);
    }

    let mut remnants = remnants.into_iter().peekable();
    let mut kept = Vec::with_capacity(remaining);
    for (i, message) in messages.into_iter().enumerate() {
        if remnants.peek().is_some_and(|(at, _)| *at == i) {
            if let Some((_, m)) = remnants.next() {
                kept.push(m);
            }
        } else if !dropped[i] {
            kept.push(message);
        }
    }
    Pass::new(kept)
}
