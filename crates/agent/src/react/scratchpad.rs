//! Scratchpad — the Thought/Action/Observation trace of one run.
//!
//! Entries are append-only and never edited. The trace is:
//!
//! - **Run-scoped**: a fresh scratchpad per `run()`
//! - **Serializable**: can be exported to JSON for debugging
//! - **Renderable**: produces the "Previous steps" text sent to the model

use chrono::{DateTime, Utc};
use longhaul_core::ReactConfig;
use serde::{Deserialize, Serialize};

/// The kind of reasoning trace entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Thought,
    Action,
    Observation,
}

/// A single entry in the reasoning trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    pub kind: EntryKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub token_count: usize,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Ordered trace of one reasoning run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scratchpad {
    entries: Vec<ScratchpadEntry>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Trace recording ──

    pub fn add_thought(&mut self, thought: &str, token_count: usize) {
        self.push(EntryKind::Thought, thought, token_count, serde_json::Map::new());
    }

    pub fn add_action(
        &mut self,
        action: &str,
        token_count: usize,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) {
        self.push(EntryKind::Action, action, token_count, metadata);
    }

    pub fn add_observation(
        &mut self,
        observation: &str,
        token_count: usize,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) {
        self.push(EntryKind::Observation, observation, token_count, metadata);
    }

    fn push(
        &mut self,
        kind: EntryKind,
        content: &str,
        token_count: usize,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) {
        self.entries.push(ScratchpadEntry {
            kind,
            content: content.to_string(),
            timestamp: Utc::now(),
            token_count,
            metadata,
        });
    }

    // ── Queries ──

    pub fn entries(&self) -> &[ScratchpadEntry] {
        &self.entries
    }

    pub fn of_kind(&self, kind: EntryKind) -> impl Iterator<Item = &ScratchpadEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Content of the most recent entry of `kind`.
    pub fn last(&self, kind: EntryKind) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.kind == kind)
            .map(|e| e.content.as_str())
    }

    pub fn total_tokens(&self) -> usize {
        self.entries.iter().map(|e| e.token_count).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries shown to callers: thoughts are hidden unless `expose_reasoning`.
    pub fn visible(&self, expose_reasoning: bool) -> impl Iterator<Item = &ScratchpadEntry> {
        self.entries
            .iter()
            .filter(move |e| expose_reasoning || e.kind != EntryKind::Thought)
    }

    // ── Rendering ──

    /// One line per entry, each with its configured prefix.
    pub fn render(&self, config: &ReactConfig) -> String {
        render_entries(&self.entries, config)
    }
}

pub(crate) fn render_entries<'a>(
    entries: impl IntoIterator<Item = &'a ScratchpadEntry>,
    config: &ReactConfig,
) -> String {
    entries
        .into_iter()
        .map(|e| {
            let prefix = match e.kind {
                EntryKind::Thought => &config.reasoning_prefix,
                EntryKind::Action => &config.action_prefix,
                EntryKind::Observation => &config.observation_prefix,
            };
            format!("{prefix}{}", e.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
