//! Anthropic Messages API provider.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::RelayError;
use crate::types::*;

use super::http::{anthropic_headers, decode_sse, parse_arguments, post_json, StepDecoder};
use super::{ModelProvider, PartStream, ProviderRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(model_id: String, api_key: String, base_url: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model_id,
            api_key,
        }
    }

    fn build_request_body(&self, request: &ProviderRequest) -> Value {
        let mut system_parts = Vec::new();
        let mut messages: Vec<Value> = Vec::new();

        for msg in &request.messages {
            let (role, content) = match msg.role {
                Role::System => {
                    system_parts.push(msg.text());
                    continue;
                }
                Role::User => ("user", vec![json!({"type": "text", "text": msg.text()})]),
                Role::Assistant => ("assistant", build_assistant_content(&msg.content)),
                Role::Tool => ("user", build_tool_results(&msg.content)),
            };
            if content.is_empty() {
                continue;
            }
            // Consecutive turns of the same role are merged into one message.
            match messages.last_mut() {
                Some(last) if last["role"] == role => {
                    if let Some(blocks) = last["content"].as_array_mut() {
                        blocks.extend(content);
                    }
                }
                _ => messages.push(json!({"role": role, "content": content})),
            }
        }

        let settings = &request.settings;
        let mut obj = serde_json::Map::new();
        obj.insert("model".into(), self.model_id.clone().into());
        obj.insert("messages".into(), messages.into());
        obj.insert("stream".into(), true.into());
        obj.insert(
            "max_tokens".into(),
            settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS).into(),
        );
        if !system_parts.is_empty() {
            obj.insert("system".into(), system_parts.join("\n\n").into());
        }
        if let Some(temp) = settings.temperature {
            obj.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = settings.top_p {
            obj.insert("top_p".into(), top_p.into());
        }
        if let Some(top_k) = settings.top_k {
            obj.insert("top_k".into(), top_k.into());
        }
        if let Some(ref stops) = settings.stop_sequences {
            obj.insert("stop_sequences".into(), json!(stops));
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            obj.insert("tools".into(), tools.into());
            if let Some(ref choice) = settings.tool_choice {
                obj.insert("tool_choice".into(), tool_choice_to_anthropic(choice));
            }
        }

        Value::Object(obj)
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream_step(&self, request: &ProviderRequest) -> Result<PartStream, RelayError> {
        let body = self.build_request_body(request);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %self.model_id, tools = request.tools.len(), "Anthropic stream_step");

        let resp = post_json(&url, anthropic_headers(&self.api_key, API_VERSION), &body).await?;
        Ok(decode_sse(resp, AnthropicDecoder::default()))
    }
}

fn tool_choice_to_anthropic(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Mode(ToolChoiceMode::Auto) => json!({"type": "auto"}),
        ToolChoice::Mode(ToolChoiceMode::Required) => json!({"type": "any"}),
        ToolChoice::Mode(ToolChoiceMode::None) => json!({"type": "none"}),
        ToolChoice::Tool(tool) => json!({"type": "tool", "name": tool.tool_name}),
    }
}

fn build_assistant_content(parts: &[ContentPart]) -> Vec<Value> {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if !text.is_empty() => {
                Some(json!({"type": "text", "text": text}))
            }
            ContentPart::ToolCall(tc) => Some(json!({
                "type": "tool_use",
                "id": tc.id,
                "name": tc.name,
                "input": match &tc.arguments {
                    Value::Object(_) => tc.arguments.clone(),
                    Value::String(raw) => parse_arguments(raw),
                    _ => json!({}),
                },
            })),
            _ => None,
        })
        .collect()
}

fn build_tool_results(parts: &[ContentPart]) -> Vec<Value> {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::ToolResult(tr) => Some(json!({
                "type": "tool_result",
                "tool_use_id": tr.tool_call_id,
                "content": tr.output.to_text(),
                "is_error": tr.is_error,
            })),
            _ => None,
        })
        .collect()
}

fn parse_stop_reason(s: &str) -> FinishReason {
    match s {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

#[derive(Debug)]
enum OpenBlock {
    Text,
    Tool {
        id: String,
        name: String,
        input: String,
    },
}

/// Messages API events to stream parts.
#[derive(Debug, Default)]
pub(crate) struct AnthropicDecoder {
    blocks: HashMap<u64, OpenBlock>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
    saw_usage: bool,
}

impl StepDecoder for AnthropicDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<StreamPart>, RelayError> {
        let event: Value = serde_json::from_str(data)?;
        let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
        let mut parts = Vec::new();

        match event.get("type").and_then(Value::as_str).unwrap_or("") {
            "message_start" => {
                if let Some(input) = event
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                {
                    self.usage.input_tokens = input as u32;
                    self.saw_usage = true;
                }
            }
            "content_block_start" => {
                let block = event.get("content_block").cloned().unwrap_or_default();
                match block.get("type").and_then(Value::as_str).unwrap_or("") {
                    "text" => {
                        parts.push(StreamPart::TextStart {
                            id: Some(index.to_string()),
                        });
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                parts.push(StreamPart::text_delta(text));
                            }
                        }
                        self.blocks.insert(index, OpenBlock::Text);
                    }
                    "tool_use" => {
                        let id = block.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                        let name = block.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                        parts.push(StreamPart::ToolInputStart {
                            id: id.clone(),
                            tool_name: name.clone(),
                        });
                        self.blocks.insert(index, OpenBlock::Tool { id, name, input: String::new() });
                    }
                    _ => {}
                }
            }
            "content_block_delta" => {
                let delta = event.get("delta").cloned().unwrap_or_default();
                match (delta.get("type").and_then(Value::as_str), self.blocks.get_mut(&index)) {
                    (Some("text_delta"), Some(OpenBlock::Text)) => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            parts.push(StreamPart::text_delta(text));
                        }
                    }
                    (Some("input_json_delta"), Some(OpenBlock::Tool { id, input, .. })) => {
                        if let Some(fragment) = delta.get("partial_json").and_then(Value::as_str) {
                            if !fragment.is_empty() {
                                input.push_str(fragment);
                                parts.push(StreamPart::ToolInputDelta {
                                    id: id.clone(),
                                    delta: fragment.to_string(),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => match self.blocks.remove(&index) {
                Some(OpenBlock::Text) => parts.push(StreamPart::TextEnd),
                Some(OpenBlock::Tool { id, name, input }) => {
                    parts.push(StreamPart::ToolInputEnd { id: id.clone() });
                    parts.push(StreamPart::ToolCall {
                        id,
                        tool_name: name,
                        input: parse_arguments(&input),
                    });
                }
                None => {}
            },
            "message_delta" => {
                if let Some(stop) = event.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.finish_reason = Some(parse_stop_reason(stop));
                }
                if let Some(output) = event.pointer("/usage/output_tokens").and_then(Value::as_u64) {
                    self.usage.output_tokens = output as u32;
                    self.saw_usage = true;
                }
            }
            "error" => {
                let message = event
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown Anthropic stream error");
                return Err(RelayError::Stream(message.to_string()));
            }
            _ => {}
        }

        Ok(parts)
    }

    fn finish(&mut self) -> Vec<StreamPart> {
        let mut parts = Vec::new();
        let mut open: Vec<(u64, OpenBlock)> = self.blocks.drain().collect();
        open.sort_by_key(|(index, _)| *index);
        for (_, block) in open {
            match block {
                OpenBlock::Text => parts.push(StreamPart::TextEnd),
                OpenBlock::Tool { id, .. } => parts.push(StreamPart::ToolInputEnd { id }),
            }
        }
        let usage = self.saw_usage.then(|| {
            let mut usage = self.usage.clone();
            usage.total_tokens = usage.input_tokens + usage.output_tokens;
            usage
        });
        parts.push(StreamPart::FinishStep {
            finish_reason: self.finish_reason.take(),
            usage,
        });
        parts
    }
}
