//! Context-budget configuration types.
//!
//! These are plain data: the settings loader deserializes them, the context
//! manager validates them at construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Which compaction algorithm the context manager runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Drop whole turns from the oldest end.
    #[default]
    SlidingWindow,
    /// Replace older turns with one summary message.
    SummarizeOlder,
    /// Drop resolved tool-call groups.
    SelectivePruning,
    /// Drop the least important messages first.
    ImportanceScoring,
    /// Pruning, then sliding window, then summarization.
    Hybrid,
}

impl StrategyKind {
    /// All variants, in declaration order.
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::SlidingWindow,
        StrategyKind::SummarizeOlder,
        StrategyKind::SelectivePruning,
        StrategyKind::ImportanceScoring,
        StrategyKind::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SlidingWindow => "sliding_window",
            StrategyKind::SummarizeOlder => "summarize_older",
            StrategyKind::SelectivePruning => "selective_pruning",
            StrategyKind::ImportanceScoring => "importance_scoring",
            StrategyKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                Error::config(format!(
                    "unknown compaction strategy '{s}', expected one of: sliding_window, summarize_older, selective_pruning, importance_scoring, hybrid"
                ))
            })
    }
}

/// Compaction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Token count at which compaction becomes eligible
    #[serde(default = "default_trigger")]
    pub trigger_threshold_tokens: usize,

    /// Token count compaction aims to reduce to
    #[serde(default = "default_target")]
    pub target_tokens: usize,

    /// Number of most recent turns no strategy may touch
    #[serde(default = "default_preserve_turns")]
    pub preserve_recent_turns: usize,

    /// Keep the system prompt out of reach of every strategy
    #[serde(default = "default_true")]
    pub preserve_system_prompt: bool,

    /// Model used for summaries and scoring; "same" means the agent's model
    #[serde(default = "default_summarization_model")]
    pub summarization_model: String,
}

fn default_trigger() -> usize {
    100_000
}
fn default_target() -> usize {
    80_000
}
fn default_preserve_turns() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_summarization_model() -> String {
    "same".into()
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            trigger_threshold_tokens: default_trigger(),
            target_tokens: default_target(),
            preserve_recent_turns: default_preserve_turns(),
            preserve_system_prompt: true,
            summarization_model: default_summarization_model(),
        }
    }
}

impl CompactionConfig {
    /// A config with the given strategy and thresholds, other fields default.
    pub fn new(strategy: StrategyKind, trigger_threshold_tokens: usize, target_tokens: usize) -> Self {
        Self {
            strategy,
            trigger_threshold_tokens,
            target_tokens,
            ..Self::default()
        }
    }

    pub fn with_preserve_recent_turns(mut self, turns: usize) -> Self {
        self.preserve_recent_turns = turns;
        self
    }

    pub fn with_preserve_system_prompt(mut self, preserve: bool) -> Self {
        self.preserve_system_prompt = preserve;
        self
    }

    /// Resolve the summarization model against the agent's model.
    pub fn summarization_model_for<'a>(&'a self, agent_model: &'a str) -> &'a str {
        if self.summarization_model == "same" {
            agent_model
        } else {
            &self.summarization_model
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.trigger_threshold_tokens == 0 {
            return Err(Error::config("trigger_threshold_tokens must be greater than 0"));
        }
        if self.target_tokens == 0 {
            return Err(Error::config("target_tokens must be greater than 0"));
        }
        if self.target_tokens >= self.trigger_threshold_tokens {
            return Err(Error::config(format!(
                "target_tokens ({}) must be less than trigger_threshold_tokens ({})",
                self.target_tokens, self.trigger_threshold_tokens
            )));
        }
        if self.summarization_model.trim().is_empty() {
            return Err(Error::config("summarization_model must not be empty"));
        }
        Ok(())
    }
}

/// Token counting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Default encoding name
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Encoding used when `encoding` is unknown
    #[serde(default = "default_encoding")]
    pub fallback_encoding: String,

    /// Model-name substring → encoding name
    #[serde(default = "default_model_mapping")]
    pub model_mapping: BTreeMap<String, String>,

    /// Fraction added on top of raw counts for budget checks
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
}

fn default_encoding() -> String {
    "cl100k_base".into()
}
fn default_safety_margin() -> f64 {
    0.05
}
fn default_model_mapping() -> BTreeMap<String, String> {
    [
        ("gpt-4o", "o200k_base"),
        ("gpt-4", "cl100k_base"),
        ("gpt-3.5", "cl100k_base"),
        ("llama", "cl100k_base"),
        ("mistral", "cl100k_base"),
        ("davinci", "p50k_base"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
            fallback_encoding: default_encoding(),
            model_mapping: default_model_mapping(),
            safety_margin: default_safety_margin(),
        }
    }
}

impl TokenizerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=0.5).contains(&self.safety_margin) {
            return Err(Error::config(format!(
                "safety_margin must be within [0.0, 0.5], got {}",
                self.safety_margin
            )));
        }
        if self.encoding.trim().is_empty() {
            return Err(Error::config("encoding must not be empty"));
        }
        Ok(())
    }
}
