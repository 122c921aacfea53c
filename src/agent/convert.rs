//! Request normalization: AG-UI history, tools, context and state into a
//! provider request.

use serde_json::Value;

use crate::error::{RelayError, Result};
use crate::schema::{is_json_schema, to_schema};
use crate::tools::{ToolSet, ToolSpec, STATE_DELTA_TOOL, STATE_SNAPSHOT_TOOL};
use crate::types::{ContentPart, ModelMessage, ToolCallPart, ToolResultOutput, ToolResultPart};

use super::input::{ContextItem, InputContentPart, InputTool, Message, RunAgentInput, UserContent};

/// Which caller-supplied instruction roles reach the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizePolicy {
    pub forward_system_messages: bool,
    /// Developer messages are forwarded with the system role.
    pub forward_developer_messages: bool,
}

/// Provider-ready view of one run request.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    /// Preamble (if any) first, then the converted history.
    pub messages: Vec<ModelMessage>,
    /// Caller-declared tools. They carry no executor.
    pub tools: ToolSet,
    pub preamble: Option<String>,
}

pub fn normalize(
    input: &RunAgentInput,
    prompt: Option<&str>,
    policy: NormalizePolicy,
) -> Result<NormalizedRequest> {
    let tools = input_tools_to_tool_set(&input.tools)?;
    let preamble = build_preamble(prompt, &input.context, &input.state);

    let mut messages = Vec::with_capacity(input.messages.len() + 1);
    if let Some(preamble) = &preamble {
        messages.push(ModelMessage::system(preamble.clone()));
    }
    messages.extend(convert_messages(&input.messages, policy)?);

    Ok(NormalizedRequest {
        messages,
        tools,
        preamble,
    })
}

/// Convert AG-UI history into provider messages, preserving order.
pub fn convert_messages(messages: &[Message], policy: NormalizePolicy) -> Result<Vec<ModelMessage>> {
    let mut converted = Vec::with_capacity(messages.len());

    for (index, message) in messages.iter().enumerate() {
        match message {
            Message::System { content, .. } => {
                if policy.forward_system_messages {
                    converted.push(ModelMessage::system(content.clone()));
                }
            }
            Message::Developer { content, .. } => {
                if policy.forward_developer_messages {
                    converted.push(ModelMessage::system(content.clone()));
                }
            }
            Message::User { content, .. } => {
                converted.push(ModelMessage::user(flatten_user_content(content)));
            }
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                let mut parts = Vec::with_capacity(tool_calls.len() + 1);
                if let Some(text) = content.as_deref().filter(|t| !t.is_empty()) {
                    parts.push(ContentPart::Text {
                        text: text.to_string(),
                    });
                }
                for call in tool_calls {
                    parts.push(ContentPart::ToolCall(ToolCallPart {
                        id: call.id.clone(),
                        name: call.function.name.clone(),
                        arguments: parse_history_arguments(&call.id, &call.function.arguments)?,
                    }));
                }
                converted.push(ModelMessage::assistant(parts));
            }
            Message::Tool {
                tool_call_id,
                content,
                ..
            } => {
                converted.push(ModelMessage::tool_result(ToolResultPart {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: resolve_tool_name(&messages[..index], tool_call_id),
                    output: ToolResultOutput::Text(content.clone()),
                    is_error: false,
                }));
            }
        }
    }

    Ok(converted)
}

fn flatten_user_content(content: &UserContent) -> String {
    match content {
        UserContent::Text(text) => text.clone(),
        UserContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                InputContentPart::Text { text } if !text.is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn parse_history_arguments(tool_call_id: &str, raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| {
        RelayError::InvalidArgument(format!(
            "tool call {tool_call_id} has malformed arguments: {e}"
        ))
    })
}

/// Best-effort lookup of the tool name behind a tool-call id.
fn resolve_tool_name(history: &[Message], tool_call_id: &str) -> String {
    history
        .iter()
        .rev()
        .filter_map(|message| match message {
            Message::Assistant { tool_calls, .. } => Some(tool_calls),
            _ => None,
        })
        .flatten()
        .find(|call| call.id == tool_call_id)
        .map(|call| call.function.name.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Assemble the system preamble from the prompt, context items and state.
///
/// Returns `None` when none of the three contributes anything.
pub fn build_preamble(prompt: Option<&str>, context: &[ContextItem], state: &Value) -> Option<String> {
    let prompt = prompt.filter(|p| !p.is_empty());
    let has_state = !is_empty_state(state);
    if prompt.is_none() && context.is_empty() && !has_state {
        return None;
    }

    let mut parts: Vec<String> = Vec::new();
    if let Some(prompt) = prompt {
        parts.push(prompt.to_string());
    }

    if !context.is_empty() {
        parts.push("\n## Context from the application\n".to_string());
        for item in context {
            parts.push(format!("{}:\n{}\n", item.description, item.value));
        }
    }

    if has_state {
        let pretty = serde_json::to_string_pretty(state).unwrap_or_else(|_| state.to_string());
        parts.push(format!(
            "\n## Application State\n\
             This is state from the application that you can edit by calling \
             {STATE_SNAPSHOT_TOOL} or {STATE_DELTA_TOOL}.\n\
             ```json\n{pretty}\n```\n"
        ));
    }

    Some(parts.concat())
}

fn is_empty_state(state: &Value) -> bool {
    match state {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Caller-declared tools become remote specs.
pub fn input_tools_to_tool_set(tools: &[InputTool]) -> Result<ToolSet> {
    let mut set = ToolSet::new();
    for tool in tools {
        if !is_json_schema(&tool.parameters) {
            return Err(RelayError::Schema(format!(
                "Invalid JSON schema for tool {}",
                tool.name
            )));
        }
        let parameters = to_schema(&tool.parameters, true).map_err(|e| {
            RelayError::Schema(format!("Invalid JSON schema for tool {}: {e}", tool.name))
        })?;
        set.insert(ToolSpec::remote(&tool.name, &tool.description, parameters));
    }
    Ok(set)
}
