//! Shared test helpers: a scripted provider and mock tools.

use async_trait::async_trait;
use longhaul_core::error::{ProviderError, ToolError};
use longhaul_core::message::{Message, MessageToolCall};
use longhaul_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use longhaul_core::tool::{Tool, ToolResult};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static NEXT_CALL_ID: AtomicUsize = AtomicUsize::new(0);

/// A mock provider that returns a sequence of scripted replies.
///
/// Each call to `complete` returns the next reply in the queue and records
/// the request. Once the script runs out, the `then_repeat` reply is
/// returned forever; without one, the provider panics.
pub struct SequentialMockProvider {
    replies: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    repeat: Option<ProviderResponse>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            repeat: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then_repeat(mut self, response: ProviderResponse) -> Self {
        self.repeat = Some(response);
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut replies = self.replies.lock().unwrap();
        if !replies.is_empty() {
            return replies.remove(0);
        }
        match &self.repeat {
            Some(response) => Ok(response.clone()),
            None => panic!("SequentialMockProvider: no more responses (call #{call})"),
        }
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tools(thought, tool_calls),
        ..make_text_response("")
    }
}

/// A tool call with a unique id.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    let n = NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed);
    MessageToolCall {
        id: format!("call_{name}_{n}"),
        name: name.into(),
        arguments: args.to_string(),
    }
}

pub fn make_final_answer(answer: &str) -> ProviderResponse {
    make_tool_call_response(
        vec![make_tool_call("final_answer", serde_json::json!({ "answer": answer }))],
        "",
    )
}

/// Echoes its `text` argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input text"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"].as_str().unwrap_or_default();
        Ok(ToolResult::ok("", format!("echo: {text}")))
    }
}

/// Fails its first `failures` calls, then succeeds.
pub struct FlakyTool {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyTool {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Tool for FlakyTool {
    fn name(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "Fails a fixed number of times"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(ToolError::ExecutionFailed {
                tool_name: "flaky".into(),
                reason: format!("attempt {call} failed"),
            });
        }
        Ok(ToolResult::ok("", format!("succeeded on attempt {call}")))
    }
}
