//! Reasoning-loop configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// How the loop decides it is done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationStrategy {
    /// The model calls the final-answer tool.
    #[default]
    Tool,
    /// Reserved. Rejected at construction.
    Confidence,
    /// Reserved. Rejected at construction.
    Hybrid,
}

/// Configuration for the ReAct reasoning loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactConfig {
    /// Model passed to the provider on every request
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temp")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Hard cap on Thought/Action/Observation cycles
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Whole-run budget in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<u64>,

    /// Budget for one model call in seconds
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: Option<u64>,

    /// Budget for one tool call in seconds
    #[serde(default = "default_step_timeout_secs")]
    pub tool_timeout_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub enable_hooks: bool,

    /// Include thought text in results and trace output
    #[serde(default = "default_true")]
    pub expose_reasoning: bool,

    #[serde(default = "default_reasoning_prefix")]
    pub reasoning_prefix: String,

    #[serde(default = "default_action_prefix")]
    pub action_prefix: String,

    #[serde(default = "default_observation_prefix")]
    pub observation_prefix: String,

    #[serde(default)]
    pub termination_strategy: TerminationStrategy,

    #[serde(default = "default_final_answer_tool")]
    pub final_answer_tool_name: String,

    /// Compact mid-run when the context nears the trigger
    #[serde(default = "default_true")]
    pub auto_compact_in_workflow: bool,

    /// Fraction of the trigger threshold at which the loop compacts
    #[serde(default = "default_compact_ratio")]
    pub compact_threshold_ratio: f64,

    /// Thought-only iterations tolerated before a tool call is forced
    #[serde(default = "default_max_consecutive_thoughts")]
    pub max_consecutive_thoughts: u32,

    /// Send the formatted scratchpad with each follow-up request
    #[serde(default = "default_true")]
    pub include_scratchpad: bool,

    /// Immediate retries for a failed or timed-out tool call
    #[serde(default = "default_tool_retry_count")]
    pub tool_retry_count: u32,

    /// End the run instead of recording an error observation
    #[serde(default)]
    pub fail_on_tool_error: bool,
}

fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temp() -> f32 {
    0.7
}
fn default_max_iterations() -> u32 {
    10
}
fn default_timeout_secs() -> Option<u64> {
    Some(300)
}
fn default_step_timeout_secs() -> Option<u64> {
    Some(30)
}
fn default_true() -> bool {
    true
}
fn default_reasoning_prefix() -> String {
    "Thought: ".into()
}
fn default_action_prefix() -> String {
    "Action: ".into()
}
fn default_observation_prefix() -> String {
    "Observation: ".into()
}
fn default_final_answer_tool() -> String {
    "final_answer".into()
}
fn default_compact_ratio() -> f64 {
    0.8
}
fn default_max_consecutive_thoughts() -> u32 {
    3
}
fn default_tool_retry_count() -> u32 {
    2
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temp(),
            max_tokens: None,
            max_iterations: default_max_iterations(),
            timeout_secs: default_timeout_secs(),
            step_timeout_secs: default_step_timeout_secs(),
            tool_timeout_secs: default_step_timeout_secs(),
            enable_hooks: true,
            expose_reasoning: true,
            reasoning_prefix: default_reasoning_prefix(),
            action_prefix: default_action_prefix(),
            observation_prefix: default_observation_prefix(),
            termination_strategy: TerminationStrategy::Tool,
            final_answer_tool_name: default_final_answer_tool(),
            auto_compact_in_workflow: true,
            compact_threshold_ratio: default_compact_ratio(),
            max_consecutive_thoughts: default_max_consecutive_thoughts(),
            include_scratchpad: true,
            tool_retry_count: default_tool_retry_count(),
            fail_on_tool_error: false,
        }
    }
}

impl ReactConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        match self.termination_strategy {
            TerminationStrategy::Tool => {}
            other => {
                return Err(Error::config(format!(
                    "termination strategy {other:?} is not supported; use 'tool'"
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }
        if !(0.1..=1.0).contains(&self.compact_threshold_ratio) {
            return Err(Error::config(format!(
                "compact_threshold_ratio must be within [0.1, 1.0], got {}",
                self.compact_threshold_ratio
            )));
        }
        if self.max_consecutive_thoughts == 0 {
            return Err(Error::config("max_consecutive_thoughts must be at least 1"));
        }
        if self.final_answer_tool_name.trim().is_empty() {
            return Err(Error::config("final_answer_tool_name must not be empty"));
        }
        for (name, secs) in [
            ("timeout_secs", self.timeout_secs),
            ("step_timeout_secs", self.step_timeout_secs),
            ("tool_timeout_secs", self.tool_timeout_secs),
        ] {
            if secs == Some(0) {
                return Err(Error::config(format!("{name} must be greater than 0 when set")));
            }
        }
        Ok(())
    }
}

/// Exponential backoff for transient model errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): base · 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let ms = self.base_delay_ms.saturating_mul(1u64 << exp).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::config(format!(
                "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}
