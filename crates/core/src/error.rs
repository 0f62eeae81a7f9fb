//! Error types for the Longhaul domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each boundary (model, tool) has its own error type wrapped by [`Error`].

use thiserror::Error;

/// The top-level error type for all Longhaul operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // --- Context management ---
    #[error("Compaction failed ({strategy}): {reason}")]
    Compaction { strategy: String, reason: String },

    #[error("Context overflow: {tokens} tokens still at or above trigger {trigger} after {strategy}")]
    ContextOverflow {
        tokens: usize,
        trigger: usize,
        strategy: String,
    },

    // --- Reasoning loop ---
    #[error("Workflow is already running on this instance")]
    WorkflowReentrancy,

    #[error("Hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for a compaction error.
    pub fn compaction(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Compaction {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Boundary errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, timeouts, network faults, interrupted streams and 5xx
    /// responses are transient. Everything else is fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::Network(_)
            | ProviderError::StreamInterrupted(_) => true,
            ProviderError::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            ProviderError::AuthenticationFailed(_)
            | ProviderError::ModelNotFound(_)
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::RateLimited { retry_after_secs: 1 }.is_transient());
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::ApiError { status_code: 503, message: "unavailable".into() }.is_transient());
        assert!(!ProviderError::ApiError { status_code: 400, message: "bad".into() }.is_transient());
        assert!(!ProviderError::AuthenticationFailed("key".into()).is_transient());
    }

    #[test]
    fn overflow_error_mentions_numbers() {
        let err = Error::ContextOverflow {
            tokens: 1200,
            trigger: 1000,
            strategy: "sliding_window".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("1200"));
        assert!(msg.contains("1000"));
        assert!(msg.contains("sliding_window"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::Timeout {
            tool_name: "search".into(),
            timeout_secs: 30,
        });
        assert!(err.to_string().contains("search"));
        assert!(err.to_string().contains("30s"));
    }
}
