//! Message history with a distinguished system-prompt slot.

use longhaul_core::message::{Message, Role};
use std::ops::Range;

/// Ordered conversation history.
///
/// The system prompt lives outside the sequence so compaction strategies
/// never see it. Everything else is kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MessageHistory {
    system_prompt: Option<Message>,
    messages: Vec<Message>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_prompt(&self) -> Option<&Message> {
        self.system_prompt.as_ref()
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(Message::system(prompt));
    }

    /// Replace the whole sequence (after a compaction).
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Clear the sequence. The system prompt is kept.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// System prompt first, then the sequence.
    pub fn to_vec(&self) -> Vec<Message> {
        self.system_prompt
            .iter()
            .chain(self.messages.iter())
            .cloned()
            .collect()
    }

    /// Messages grouped by turn.
    pub fn turns(&self) -> Vec<&[Message]> {
        turn_spans(&self.messages)
            .into_iter()
            .map(|span| &self.messages[span])
            .collect()
    }

    /// Messages of the `n` most recent turns.
    pub fn recent_turns(&self, n: usize) -> &[Message] {
        let spans = turn_spans(&self.messages);
        if n == 0 || spans.is_empty() {
            return &[];
        }
        let first = spans.len().saturating_sub(n);
        &self.messages[spans[first].start..]
    }
}

/// Index ranges of turns in `messages`.
///
/// A turn starts at each user message. Messages before the first user
/// message form a leading turn of their own.
pub fn turn_spans(messages: &[Message]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, message) in messages.iter().enumerate() {
        if message.role == Role::User && i > start {
            spans.push(start..i);
            start = i;
        }
    }
    if start < messages.len() {
        spans.push(start..messages.len());
    }
    spans
}

/// Start index of the preserved tail: the last `preserve` turns.
///
/// Returns `messages.len()` when nothing is preserved and 0 when every
/// turn is.
pub fn preserved_start(messages: &[Message], preserve: usize) -> usize {
    let spans = turn_spans(messages);
    if preserve == 0 {
        return messages.len();
    }
    if spans.len() <= preserve {
        return 0;
    }
    spans[spans.len() - preserve].start
}
