//! Lifetime token-usage counters.
//!
//! Fed by every model response the reasoning loop receives. Independent of
//! the context manager, so clearing the conversation does not reset them.

use longhaul_core::provider::Usage;
use serde::Serialize;
use std::sync::{PoisonError, RwLock};

/// Snapshot of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Model calls that returned a response
    pub requests: u64,
    pub tool_calls: u64,
}

/// Thread-safe accumulator shared by every run of one loop.
#[derive(Debug, Default)]
pub struct UsageTracker {
    totals: RwLock<UsageTotals>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one model response. Responses without usage still count as a request.
    pub fn record_response(&self, usage: Option<&Usage>) {
        let mut totals = self.totals.write().unwrap_or_else(PoisonError::into_inner);
        totals.requests += 1;
        if let Some(usage) = usage {
            totals.prompt_tokens += u64::from(usage.prompt_tokens);
            totals.completion_tokens += u64::from(usage.completion_tokens);
            totals.total_tokens += u64::from(usage.total_tokens);
        }
    }

    pub fn record_tool_call(&self) {
        self.totals.write().unwrap_or_else(PoisonError::into_inner).tool_calls += 1;
    }

    pub fn totals(&self) -> UsageTotals {
        *self.totals.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset(&self) {
        *self.totals.write().unwrap_or_else(PoisonError::into_inner) = UsageTotals::default();
    }
}
