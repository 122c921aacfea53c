//! Google Gemini API provider.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::RelayError;
use crate::types::*;

use super::http::{decode_sse, google_headers, parse_arguments, post_json, StepDecoder};
use super::{ModelProvider, PartStream, ProviderRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleProvider {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
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
        let mut contents: Vec<Value> = Vec::new();

        for msg in &request.messages {
            let (role, parts) = match msg.role {
                Role::System => {
                    system_parts.push(json!({"text": msg.text()}));
                    continue;
                }
                Role::User => ("user", vec![json!({"text": msg.text()})]),
                Role::Assistant => ("model", build_model_parts(&msg.content)),
                Role::Tool => ("user", build_function_responses(&msg.content)),
            };
            if parts.is_empty() {
                continue;
            }
            match contents.last_mut() {
                Some(last) if last["role"] == role => {
                    if let Some(existing) = last["parts"].as_array_mut() {
                        existing.extend(parts);
                    }
                }
                _ => contents.push(json!({"role": role, "parts": parts})),
            }
        }

        let mut obj = serde_json::Map::new();
        obj.insert("contents".into(), contents.into());
        if !system_parts.is_empty() {
            obj.insert("systemInstruction".into(), json!({"parts": system_parts}));
        }

        let settings = &request.settings;
        let mut gen_config = serde_json::Map::new();
        if let Some(max) = settings.max_tokens {
            gen_config.insert("maxOutputTokens".into(), max.into());
        }
        if let Some(temp) = settings.temperature {
            gen_config.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = settings.top_p {
            gen_config.insert("topP".into(), top_p.into());
        }
        if let Some(top_k) = settings.top_k {
            gen_config.insert("topK".into(), top_k.into());
        }
        if let Some(ref stops) = settings.stop_sequences {
            gen_config.insert("stopSequences".into(), json!(stops));
        }
        if let Some(pp) = settings.presence_penalty {
            gen_config.insert("presencePenalty".into(), pp.into());
        }
        if let Some(fp) = settings.frequency_penalty {
            gen_config.insert("frequencyPenalty".into(), fp.into());
        }
        if let Some(seed) = settings.seed {
            gen_config.insert("seed".into(), seed.into());
        }
        if !gen_config.is_empty() {
            obj.insert("generationConfig".into(), Value::Object(gen_config));
        }

        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            obj.insert("tools".into(), json!([{ "functionDeclarations": declarations }]));
            if let Some(ref choice) = settings.tool_choice {
                obj.insert("toolConfig".into(), tool_choice_to_google(choice));
            }
        }

        Value::Object(obj)
    }
}

#[async_trait]
impl ModelProvider for GoogleProvider {
    fn provider_name(&self) -> &str {
        "google"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream_step(&self, request: &ProviderRequest) -> Result<PartStream, RelayError> {
        let body = self.build_request_body(request);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model_id
        );

        debug!(model = %self.model_id, tools = request.tools.len(), "Google stream_step");

        let resp = post_json(&url, google_headers(&self.api_key), &body).await?;
        Ok(decode_sse(resp, GoogleDecoder::default()))
    }
}

fn tool_choice_to_google(choice: &ToolChoice) -> Value {
    let config = match choice {
        ToolChoice::Mode(ToolChoiceMode::Auto) => json!({"mode": "AUTO"}),
        ToolChoice::Mode(ToolChoiceMode::Required) => json!({"mode": "ANY"}),
        ToolChoice::Mode(ToolChoiceMode::None) => json!({"mode": "NONE"}),
        ToolChoice::Tool(tool) => json!({"mode": "ANY", "allowedFunctionNames": [tool.tool_name]}),
    };
    json!({ "functionCallingConfig": config })
}

fn build_model_parts(parts: &[ContentPart]) -> Vec<Value> {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if !text.is_empty() => Some(json!({"text": text})),
            ContentPart::ToolCall(tc) => Some(json!({
                "functionCall": {
                    "name": tc.name,
                    "args": match &tc.arguments {
                        Value::String(raw) => parse_arguments(raw),
                        other => other.clone(),
                    },
                }
            })),
            _ => None,
        })
        .collect()
}

fn build_function_responses(parts: &[ContentPart]) -> Vec<Value> {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::ToolResult(tr) => {
                let content = match &tr.output {
                    ToolResultOutput::Text(text) => Value::String(text.clone()),
                    ToolResultOutput::Json(value) => value.clone(),
                };
                Some(json!({
                    "functionResponse": {
                        "name": tr.tool_name,
                        "response": { "name": tr.tool_name, "content": content },
                    }
                }))
            }
            _ => None,
        })
        .collect()
}

fn parse_finish_reason(s: &str) -> FinishReason {
    match s {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

/// Gemini chunks to stream parts.
///
/// Function calls arrive whole, so no tool-input parts are produced.
#[derive(Debug, Default)]
pub(crate) struct GoogleDecoder {
    text_open: bool,
    saw_function_call: bool,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl StepDecoder for GoogleDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<StreamPart>, RelayError> {
        let chunk: GeminiChunk = serde_json::from_str(data)?;
        if let Some(error) = chunk.error {
            return Err(RelayError::Stream(error.message));
        }

        let mut parts = Vec::new();
        if let Some(meta) = chunk.usage_metadata {
            self.usage = Some(Usage {
                input_tokens: meta.prompt_token_count,
                output_tokens: meta.candidates_token_count,
                total_tokens: meta.total_token_count,
            });
        }

        for candidate in chunk.candidates {
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                    if !self.text_open {
                        self.text_open = true;
                        parts.push(StreamPart::TextStart { id: None });
                    }
                    parts.push(StreamPart::text_delta(text));
                }
                if let Some(call) = part.function_call {
                    if self.text_open {
                        self.text_open = false;
                        parts.push(StreamPart::TextEnd);
                    }
                    self.saw_function_call = true;
                    parts.push(StreamPart::ToolCall {
                        id: call
                            .id
                            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                        tool_name: call.name,
                        input: call.args.unwrap_or_else(|| json!({})),
                    });
                }
            }
            if let Some(reason) = candidate.finish_reason.as_deref() {
                self.finish_reason = Some(parse_finish_reason(reason));
            }
        }

        Ok(parts)
    }

    fn finish(&mut self) -> Vec<StreamPart> {
        let mut parts = Vec::new();
        if self.text_open {
            self.text_open = false;
            parts.push(StreamPart::TextEnd);
        }
        let finish_reason = if self.saw_function_call {
            Some(FinishReason::ToolCalls)
        } else {
            self.finish_reason.take()
        };
        parts.push(StreamPart::FinishStep {
            finish_reason,
            usage: self.usage.take(),
        });
        parts
    }
}

// Gemini API response types (internal)

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Deserialize)]
struct GeminiFunctionCall {
    id: Option<String>,
    name: String,
    args: Option<Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GeminiUsage {
    prompt_token_count: u32,
    candidates_token_count: u32,
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn text_then_function_call() {
        let mut decoder = GoogleDecoder::default();
        let mut parts = decoder
            .decode(&json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Let me check."}]}}]}).to_string())
            .unwrap();
        parts.extend(
            decoder
                .decode(
                    &json!({
                        "candidates": [{
                            "content": {"parts": [{"functionCall": {"id": "fc-1", "name": "weather", "args": {"city": "Lima"}}}]},
                            "finishReason": "STOP"
                        }],
                        "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 7, "totalTokenCount": 12}
                    })
                    .to_string(),
                )
                .unwrap(),
        );
        parts.extend(decoder.finish());

        assert_eq!(
            parts,
            vec![
                StreamPart::TextStart { id: None },
                StreamPart::text_delta("Let me check."),
                StreamPart::TextEnd,
                StreamPart::ToolCall { id: "fc-1".into(), tool_name: "weather".into(), input: json!({"city": "Lima"}) },
                StreamPart::FinishStep {
                    finish_reason: Some(FinishReason::ToolCalls),
                    usage: Some(Usage { input_tokens: 5, output_tokens: 7, total_tokens: 12 }),
                },
            ]
        );
    }

    #[test]
    fn function_call_without_id_gets_one() {
        let mut decoder = GoogleDecoder::default();
        let parts = decoder
            .decode(&json!({"candidates": [{"content": {"parts": [{"functionCall": {"name": "ping"}}]}}]}).to_string())
            .unwrap();
        let StreamPart::ToolCall { id, input, .. } = &parts[0] else {
            panic!("expected tool call, got {parts:?}");
        };
        assert!(!id.is_empty());
        assert_eq!(input, &json!({}));
    }

    #[test]
    fn request_body_uses_gemini_shapes() {
        let provider = GoogleProvider::new("gemini-2.5-pro".into(), "key".into(), None);
        let request = ProviderRequest {
            messages: vec![
                ModelMessage::system("ctx"),
                ModelMessage::user("hi"),
                ModelMessage::assistant(vec![ContentPart::ToolCall(ToolCallPart {
                    id: "c".into(),
                    name: "weather".into(),
                    arguments: json!({"city": "Lima"}),
                })]),
                ModelMessage::tool_result(ToolResultPart {
                    tool_call_id: "c".into(),
                    tool_name: "weather".into(),
                    output: ToolResultOutput::Text("sunny".into()),
                    is_error: false,
                }),
            ],
            settings: GenerationSettings::builder().top_k(20).build(),
            tools: vec![crate::provider::ToolDefinition {
                name: "weather".into(),
                description: "Weather".into(),
                parameters: json!({"type": "object", "properties": {}}),
            }],
        };

        let body = provider.build_request_body(&request);
        assert_eq!(body["systemInstruction"], json!({"parts": [{"text": "ctx"}]}));
        assert_eq!(body["generationConfig"], json!({"topK": 20}));
        assert_eq!(body["contents"][1]["role"], json!("model"));
        assert_eq!(body["contents"][1]["parts"][0]["functionCall"]["args"], json!({"city": "Lima"}));
        assert_eq!(body["contents"][2]["parts"][0]["functionResponse"]["response"]["content"], json!("sunny"));
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], json!("weather"));
    }
}
