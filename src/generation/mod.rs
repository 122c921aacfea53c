//! Multi-step streaming generation with local tool execution.
//!
//! [`stream_text`] drives one or more provider steps and flattens them into a
//! single part stream that always ends with exactly one of
//! [`StreamPart::Finish`], [`StreamPart::Abort`] or [`StreamPart::Error`].

use std::sync::Arc;

use bon::Builder;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::provider::{ModelProvider, ProviderRequest};
use crate::tools::{ToolExecutionContext, ToolSet};
use crate::types::*;
use crate::util::retry::RetryPolicy;

/// Inputs for [`stream_text`].
#[derive(Builder)]
pub struct StreamTextRequest {
    pub model: Arc<dyn ModelProvider>,
    #[builder(default)]
    pub messages: Vec<ModelMessage>,
    #[builder(default)]
    pub tools: ToolSet,
    #[builder(default)]
    pub settings: GenerationSettings,
    /// Upper bound on provider steps. Values below 1 are treated as 1.
    #[builder(default = 1)]
    pub max_steps: u32,
    /// Extra attempts for opening a step after a retryable error.
    #[builder(default = 2)]
    pub max_retries: u32,
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
}

/// Stream a (possibly multi-step) generation.
///
/// Cancelling `cancel` drops the in-flight provider stream and ends the
/// output with [`StreamPart::Abort`].
pub fn stream_text(
    request: StreamTextRequest,
    cancel: CancellationToken,
) -> BoxStream<'static, StreamPart> {
    let StreamTextRequest {
        model,
        mut messages,
        tools,
        settings,
        max_steps,
        max_retries,
        thread_id,
        run_id,
    } = request;
    let max_steps = max_steps.max(1);
    let definitions = tools.definitions();
    let retry = RetryPolicy::with_max_retries(max_retries);

    let stream = async_stream::stream! {
        let mut usage = Usage::default();
        let mut saw_usage = false;
        let mut finish_reason = None;

        for step in 0..max_steps {
            let provider_request = ProviderRequest {
                messages: messages.clone(),
                settings: settings.clone(),
                tools: definitions.clone(),
            };
            debug!(step, provider = model.provider_name(), model_id = model.model_id(), "opening model step");

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                opened = retry.execute(|| model.stream_step(&provider_request)) => Some(opened),
            };
            let mut step_stream = match opened {
                None => {
                    yield StreamPart::Abort;
                    return;
                }
                Some(Err(e)) => {
                    yield StreamPart::error(e.to_string());
                    return;
                }
                Some(Ok(s)) => s,
            };

            let mut text = String::new();
            let mut calls: Vec<ToolCallPart> = Vec::new();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = step_stream.next() => Some(next),
                };
                let Some(next) = next else {
                    yield StreamPart::Abort;
                    return;
                };
                let part = match next {
                    None => break,
                    Some(Err(e)) => {
                        yield StreamPart::error(e.to_string());
                        return;
                    }
                    Some(Ok(part)) => part,
                };

                match &part {
                    StreamPart::TextDelta { text: delta } => text.push_str(delta),
                    StreamPart::ToolCall { id, tool_name, input } => calls.push(ToolCallPart {
                        id: id.clone(),
                        name: tool_name.clone(),
                        arguments: input.clone(),
                    }),
                    StreamPart::FinishStep { finish_reason: reason, usage: step_usage } => {
                        finish_reason = *reason;
                        if let Some(step_usage) = step_usage {
                            usage.merge(step_usage);
                            saw_usage = true;
                        }
                    }
                    _ => {}
                }
                yield part;
            }

            if calls.is_empty() {
                break;
            }

            let mut results = Vec::new();
            let mut all_local = true;
            for call in &calls {
                let Some(executor) = tools.get(&call.name).and_then(|spec| spec.executor.clone()) else {
                    all_local = false;
                    continue;
                };
                let ctx = ToolExecutionContext {
                    tool_call_id: call.id.clone(),
                    thread_id: thread_id.clone(),
                    run_id: run_id.clone(),
                };

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    outcome = async {
                        if let Err(reason) = executor.parameters().validate(&call.arguments) {
                            return Err(format!("Invalid arguments for tool {}: {reason}", call.name));
                        }
                        executor.execute(&call.arguments, &ctx).await.map_err(|e| e.to_string())
                    } => Some(outcome),
                };
                let Some(outcome) = outcome else {
                    yield StreamPart::Abort;
                    return;
                };

                let (output, is_error) = match outcome {
                    Ok(value) => (value, false),
                    Err(message) => {
                        debug!(tool = %call.name, tool_call_id = %call.id, error = %message, "local tool failed");
                        (json!({ "error": message }), true)
                    }
                };
                yield StreamPart::ToolResult {
                    id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output: output.clone(),
                };
                results.push(ToolResultPart {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output: ToolResultOutput::Json(output),
                    is_error,
                });
            }

            if !all_local || step + 1 >= max_steps {
                break;
            }

            let mut assistant = Vec::new();
            if !text.is_empty() {
                assistant.push(ContentPart::Text { text });
            }
            assistant.extend(calls.into_iter().map(ContentPart::ToolCall));
            messages.push(ModelMessage::assistant(assistant));
            messages.extend(results.into_iter().map(ModelMessage::tool_result));
        }

        yield StreamPart::Finish {
            finish_reason,
            usage: saw_usage.then_some(usage),
        };
    };

    Box::pin(stream)
}

/// Render a tool output as the string placed in history and events.
pub fn output_to_string(output: &Value) -> String {
    serde_json::to_string(output).unwrap_or_else(|_| output.to_string())
}
