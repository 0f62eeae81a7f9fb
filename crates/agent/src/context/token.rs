//! Token estimation.
//!
//! Uses character-ratio heuristics per encoding: ~4 characters per token
//! for `cl100k_base`, a little more for `o200k_base`, a little less for
//! `p50k_base`. Counts are advisory, accurate within ~10% for BPE
//! tokenizers on English text, and fully deterministic.

use longhaul_core::TokenizerConfig;
use longhaul_core::message::Message;
use std::fmt;
use tracing::warn;

/// Fixed per-message cost for role name, delimiters and framing.
pub const MESSAGE_OVERHEAD: usize = 4;

/// Fixed cost of each tool-call descriptor on an assistant message.
pub const TOOL_CALL_OVERHEAD: usize = 10;

/// Supported estimator encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Cl100kBase,
    O200kBase,
    P50kBase,
}

impl Encoding {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cl100k_base" => Some(Encoding::Cl100kBase),
            "o200k_base" => Some(Encoding::O200kBase),
            "p50k_base" => Some(Encoding::P50kBase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Cl100kBase => "cl100k_base",
            Encoding::O200kBase => "o200k_base",
            Encoding::P50kBase => "p50k_base",
        }
    }

    fn chars_per_token(&self) -> f64 {
        match self {
            Encoding::Cl100kBase => 4.0,
            Encoding::O200kBase => 4.2,
            Encoding::P50kBase => 3.5,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic token counter bound to one encoding.
///
/// Message counts are cached on the message itself, so a history should be
/// counted by a single counter for its whole lifetime.
#[derive(Debug, Clone)]
pub struct TokenCounter {
    config: TokenizerConfig,
    encoding: Encoding,
}

impl TokenCounter {
    pub fn new(config: TokenizerConfig) -> Self {
        let encoding = resolve_encoding(&config.encoding, &config.fallback_encoding);
        Self { config, encoding }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Estimate the token count for a string. Rounds up.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count() as f64;
        (chars / self.encoding.chars_per_token()).ceil() as usize
    }

    /// Tokens for one message, cached on the message after the first call.
    pub fn count_message(&self, message: &Message) -> usize {
        message.cached_tokens(|m| self.message_cost(m))
    }

    fn message_cost(&self, message: &Message) -> usize {
        let calls: usize = message
            .tool_calls
            .iter()
            .map(|call| self.count(&call.name) + self.count(&call.arguments) + TOOL_CALL_OVERHEAD)
            .sum();
        MESSAGE_OVERHEAD + self.count(&message.content) + self.count(message.role.as_str()) + calls
    }

    /// Tokens for a slice of messages. Empty input is 0.
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }

    /// Count plus the configured safety margin.
    pub fn count_with_margin(&self, text: &str) -> usize {
        let base = self.count(text);
        base + (base as f64 * self.config.safety_margin) as usize
    }

    /// Whether `text` fits in `max_tokens` once the safety margin is applied.
    pub fn fits_within(&self, text: &str, max_tokens: usize) -> bool {
        self.count_with_margin(text) <= max_tokens
    }

    /// Encoding name for a model, via the longest matching `model_mapping` key.
    pub fn encoding_for_model(&self, model: &str) -> &str {
        let model = model.to_lowercase();
        self.config
            .model_mapping
            .iter()
            .filter(|(key, _)| model.contains(&key.to_lowercase()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, encoding)| encoding.as_str())
            .unwrap_or(self.config.encoding.as_str())
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}

fn resolve_encoding(name: &str, fallback: &str) -> Encoding {
    if let Some(encoding) = Encoding::from_name(name) {
        return encoding;
    }
    match Encoding::from_name(fallback) {
        Some(encoding) => {
            warn!(requested = name, fallback = fallback, "Unknown encoding, using fallback");
            encoding
        }
        None => {
            warn!(
                requested = name,
                fallback = fallback,
                "Unknown encoding and fallback, using cl100k_base"
            );
            Encoding::Cl100kBase
        }
    }
}
