//! Prompt text and the final-answer tool definition.

use longhaul_core::ReactConfig;
use longhaul_core::provider::ToolDefinition;

/// Sent instead of the continue instruction once the model has been
/// thinking without acting for too long.
pub const FORCE_ACTION_PROMPT: &str =
    "You have been thinking without taking action. Please call a tool now to make progress on the task.";

pub const CONTINUE_PROMPT: &str =
    "Continue working on the task. Review the observations above and decide your next step.";

/// The ReAct system prompt, naming the final-answer tool.
pub fn system_prompt(final_answer_tool: &str) -> String {
    format!(
        "You are an AI assistant that solves tasks using the ReAct (Reasoning + Acting) approach.\n\
         \n\
         For each step:\n\
         1. Think about what you know and what you still need to find out.\n\
         2. Call a tool to gather information or take an action.\n\
         3. Read the observation the tool returns and decide what to do next.\n\
         \n\
         Keep going until you can answer the task. When you have the answer, call the \
         `{final_answer_tool}` tool with your complete answer. Do not answer in plain text; \
         the task only ends when `{final_answer_tool}` is called."
    )
}

/// Transient instruction appended to every request after the first.
pub fn iteration_prompt(config: &ReactConfig, scratchpad: &str, force_action: bool) -> String {
    let instruction = if force_action {
        FORCE_ACTION_PROMPT
    } else {
        CONTINUE_PROMPT
    };
    if config.include_scratchpad && !scratchpad.is_empty() {
        format!("Previous steps:\n{scratchpad}\n\n{instruction}")
    } else {
        instruction.to_string()
    }
}

/// Definition of the tool whose call ends the run successfully.
pub fn final_answer_tool(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: "Submit the final answer to the task. Calling this ends the task.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The complete final answer"
                }
            },
            "required": ["answer"]
        }),
    }
}

/// `name(key=value, ...)` rendering of an action for the scratchpad.
pub fn format_action(name: &str, arguments: &serde_json::Value) -> String {
    let args = match arguments.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{k}='{s}'"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(", "),
        None if arguments.is_null() => String::new(),
        None => arguments.to_string(),
    };
    format!("{name}({args})")
}
