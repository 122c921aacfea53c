//! OpenAI Chat Completions API provider.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::RelayError;
use crate::types::*;

use super::http::{arguments_to_string, bearer_headers, decode_sse, parse_arguments, post_json, StepDecoder};
use super::{ModelProvider, PartStream, ProviderRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
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
        let messages: Vec<Value> = request.messages.iter().flat_map(message_to_openai).collect();

        let mut obj = serde_json::Map::new();
        obj.insert("model".into(), self.model_id.clone().into());
        obj.insert("messages".into(), messages.into());
        obj.insert("stream".into(), true.into());
        obj.insert("stream_options".into(), json!({"include_usage": true}));

        let settings = &request.settings;
        if let Some(max) = settings.max_tokens {
            obj.insert("max_tokens".into(), max.into());
        }
        if let Some(temp) = settings.temperature {
            obj.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = settings.top_p {
            obj.insert("top_p".into(), top_p.into());
        }
        if let Some(ref stops) = settings.stop_sequences {
            obj.insert("stop".into(), json!(stops));
        }
        if let Some(pp) = settings.presence_penalty {
            obj.insert("presence_penalty".into(), pp.into());
        }
        if let Some(fp) = settings.frequency_penalty {
            obj.insert("frequency_penalty".into(), fp.into());
        }
        if let Some(seed) = settings.seed {
            obj.insert("seed".into(), seed.into());
        }

        if !request.tools.is_empty() {
            let tool_defs: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), tool_defs.into());
            if let Some(ref choice) = settings.tool_choice {
                obj.insert("tool_choice".into(), tool_choice_to_openai(choice));
            }
        }

        Value::Object(obj)
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream_step(&self, request: &ProviderRequest) -> Result<PartStream, RelayError> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model_id, tools = request.tools.len(), "OpenAI stream_step");

        let resp = post_json(&url, bearer_headers(&self.api_key), &body).await?;
        Ok(decode_sse(resp, OpenAiDecoder::default()))
    }
}

fn tool_choice_to_openai(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Mode(mode) => Value::String(mode.to_string()),
        ToolChoice::Tool(tool) => json!({
            "type": "function",
            "function": { "name": tool.tool_name },
        }),
    }
}

fn message_to_openai(msg: &ModelMessage) -> Vec<Value> {
    match msg.role {
        Role::System => vec![json!({ "role": "system", "content": msg.text() })],
        Role::User => vec![json!({ "role": "user", "content": msg.text() })],
        Role::Assistant => {
            let text = msg.text();
            let tool_calls: Vec<Value> = msg
                .tool_calls()
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": arguments_to_string(&tc.arguments),
                        }
                    })
                })
                .collect();
            let mut out = json!({ "role": "assistant", "content": text });
            if !tool_calls.is_empty() {
                out["content"] = if text.is_empty() { Value::Null } else { Value::String(text) };
                out["tool_calls"] = tool_calls.into();
            }
            vec![out]
        }
        Role::Tool => msg
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolResult(tr) => Some(json!({
                    "role": "tool",
                    "tool_call_id": tr.tool_call_id,
                    "content": tr.output.to_text(),
                })),
                _ => None,
            })
            .collect(),
    }
}

fn parse_finish_reason(s: &str) -> FinishReason {
    match s {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Chat Completions chunks to stream parts.
///
/// Tool calls arrive as index-addressed fragments; the first fragment for an
/// index carries id and name, later ones only argument text.
#[derive(Debug, Default)]
pub(crate) struct OpenAiDecoder {
    text_open: bool,
    calls: BTreeMap<u32, PendingCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl OpenAiDecoder {
    fn close_text(&mut self, parts: &mut Vec<StreamPart>) {
        if self.text_open {
            self.text_open = false;
            parts.push(StreamPart::TextEnd);
        }
    }
}

impl StepDecoder for OpenAiDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<StreamPart>, RelayError> {
        let chunk: OpenAiStreamChunk = serde_json::from_str(data)?;
        if let Some(error) = chunk.error {
            return Err(RelayError::Stream(error.message));
        }

        let mut parts = Vec::new();
        if let Some(u) = chunk.usage {
            self.usage = Some(u.into());
        }

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                if !self.text_open {
                    self.text_open = true;
                    parts.push(StreamPart::TextStart { id: None });
                }
                parts.push(StreamPart::text_delta(text));
            }

            for fragment in choice.delta.tool_calls.unwrap_or_default() {
                if !self.calls.contains_key(&fragment.index) {
                    self.close_text(&mut parts);
                    let function = fragment.function.as_ref();
                    let pending = PendingCall {
                        id: fragment
                            .id
                            .clone()
                            .unwrap_or_else(|| format!("call_{}", fragment.index)),
                        name: function.and_then(|f| f.name.clone()).unwrap_or_default(),
                        arguments: String::new(),
                    };
                    parts.push(StreamPart::ToolInputStart {
                        id: pending.id.clone(),
                        tool_name: pending.name.clone(),
                    });
                    self.calls.insert(fragment.index, pending);
                }

                let fragment_args = fragment.function.and_then(|f| f.arguments).unwrap_or_default();
                if let Some(pending) = self.calls.get_mut(&fragment.index) {
                    if !fragment_args.is_empty() {
                        pending.arguments.push_str(&fragment_args);
                        parts.push(StreamPart::ToolInputDelta {
                            id: pending.id.clone(),
                            delta: fragment_args,
                        });
                    }
                }
            }

            if let Some(reason) = choice.finish_reason.as_deref() {
                self.finish_reason = Some(parse_finish_reason(reason));
            }
        }

        Ok(parts)
    }

    fn finish(&mut self) -> Vec<StreamPart> {
        let mut parts = Vec::new();
        self.close_text(&mut parts);
        for (_, call) in std::mem::take(&mut self.calls) {
            parts.push(StreamPart::ToolInputEnd { id: call.id.clone() });
            parts.push(StreamPart::ToolCall {
                input: parse_arguments(&call.arguments),
                id: call.id,
                tool_name: call.name,
            });
        }
        parts.push(StreamPart::FinishStep {
            finish_reason: self.finish_reason.take(),
            usage: self.usage.take(),
        });
        parts
    }
}

// OpenAI API response types (internal)

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<OpenAiUsage> for Usage {
    fn from(u: OpenAiUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
    error: Option<OpenAiStreamError>,
}

#[derive(Deserialize)]
struct OpenAiStreamError {
    message: String,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Deserialize)]
struct OpenAiToolCallDelta {
    index: u32,
    id: Option<String>,
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Deserialize)]
struct OpenAiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
