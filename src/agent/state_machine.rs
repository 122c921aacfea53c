//! Per-run translation of raw stream parts into AG-UI events.
//!
//! The translator owns message identity and one [`ToolCallState`] per live
//! tool-call id. It keeps the tool-call lifecycle well ordered even when a
//! provider skips `tool-input-start` or never streams argument deltas, and it
//! emits at most one terminal event.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::generation::output_to_string;
use crate::provider::http::arguments_to_string;
use crate::tools::state::is_state_tool;
use crate::tools::STATE_SNAPSHOT_TOOL;
use crate::types::StreamPart;

use super::events::{AgUiEvent, EventRole};

/// Lifecycle of one tool call within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallState {
    pub started: bool,
    pub saw_argument_delta: bool,
    pub ended: bool,
    pub tool_name: String,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Finished,
    Aborted,
    Errored(String),
}

#[derive(Debug)]
pub struct EventTranslator {
    thread_id: String,
    run_id: String,
    message_id: String,
    tool_calls: HashMap<String, ToolCallState>,
    terminal: Option<Terminal>,
}

impl EventTranslator {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            message_id: fresh_id(),
            tool_calls: HashMap::new(),
            terminal: None,
        }
    }

    pub fn started_event(&self) -> AgUiEvent {
        AgUiEvent::RunStarted {
            thread_id: self.thread_id.clone(),
            run_id: self.run_id.clone(),
        }
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn tool_call_state(&self, id: &str) -> Option<&ToolCallState> {
        self.tool_calls.get(id)
    }

    /// Translate one part. Returns nothing once the run is terminal.
    pub fn translate(&mut self, part: StreamPart, cancel_requested: bool) -> Vec<AgUiEvent> {
        if self.terminal.is_some() {
            return Vec::new();
        }

        let mut events = Vec::new();
        match part {
            StreamPart::TextStart { id } => {
                // Some providers report "0" for every segment.
                self.message_id = match id {
                    Some(id) if !id.is_empty() && id != "0" => id,
                    _ => fresh_id(),
                };
            }
            StreamPart::TextDelta { text } => events.push(AgUiEvent::TextMessageChunk {
                role: EventRole::Assistant,
                message_id: self.message_id.clone(),
                delta: text,
            }),
            StreamPart::ToolInputStart { id, tool_name } => {
                self.ensure_started(&id, &tool_name, &mut events);
            }
            StreamPart::ToolInputDelta { id, delta } => {
                self.tool_calls.entry(id.clone()).or_default().saw_argument_delta = true;
                events.push(AgUiEvent::ToolCallArgs {
                    tool_call_id: id,
                    delta,
                });
            }
            StreamPart::ToolCall {
                id,
                tool_name,
                input,
            } => {
                self.ensure_started(&id, &tool_name, &mut events);
                let state = self.tool_calls.entry(id.clone()).or_default();
                if !state.saw_argument_delta {
                    let args = arguments_to_string(&input);
                    if !args.is_empty() {
                        events.push(AgUiEvent::ToolCallArgs {
                            tool_call_id: id.clone(),
                            delta: args,
                        });
                    }
                }
                if !state.ended {
                    state.ended = true;
                    events.push(AgUiEvent::ToolCallEnd { tool_call_id: id });
                }
            }
            StreamPart::ToolResult {
                id,
                tool_name,
                output,
            } => {
                self.tool_calls.remove(&id);
                if let Some(state_event) = state_sync_event(&tool_name, &output) {
                    events.push(state_event);
                }
                events.push(AgUiEvent::ToolCallResult {
                    role: EventRole::Tool,
                    message_id: fresh_id(),
                    tool_call_id: id,
                    content: output_to_string(&output),
                });
            }
            StreamPart::Finish { .. } => events.push(self.finish_with(Terminal::Finished)),
            StreamPart::Abort => events.push(self.finish_with(Terminal::Aborted)),
            StreamPart::Error { message } => events.extend(self.fail(message, cancel_requested)),
            StreamPart::TextEnd | StreamPart::ToolInputEnd { .. } | StreamPart::FinishStep { .. } => {}
        }
        events
    }

    /// Record a run failure. Suppressed when cancellation was requested.
    pub fn fail(&mut self, message: String, cancel_requested: bool) -> Option<AgUiEvent> {
        if self.terminal.is_some() {
            return None;
        }
        self.tool_calls.clear();
        if cancel_requested {
            self.terminal = Some(Terminal::Aborted);
            return None;
        }
        self.terminal = Some(Terminal::Errored(message.clone()));
        Some(AgUiEvent::RunError { message })
    }

    /// Close out a stream that ended without a terminal part.
    ///
    /// Synthesizes `RUN_FINISHED` unless cancellation was requested, in which
    /// case the run ends silently as aborted.
    pub fn finish(&mut self, cancel_requested: bool) -> Option<AgUiEvent> {
        if self.terminal.is_some() {
            return None;
        }
        if cancel_requested {
            self.tool_calls.clear();
            self.terminal = Some(Terminal::Aborted);
            return None;
        }
        Some(self.finish_with(Terminal::Finished))
    }

    fn finish_with(&mut self, terminal: Terminal) -> AgUiEvent {
        self.tool_calls.clear();
        self.terminal = Some(terminal);
        AgUiEvent::RunFinished {
            thread_id: self.thread_id.clone(),
            run_id: self.run_id.clone(),
        }
    }

    fn ensure_started(&mut self, id: &str, tool_name: &str, events: &mut Vec<AgUiEvent>) {
        let state = self.tool_calls.entry(id.to_string()).or_default();
        if state.tool_name.is_empty() {
            state.tool_name = tool_name.to_string();
        }
        if !state.started {
            state.started = true;
            events.push(AgUiEvent::ToolCallStart {
                parent_message_id: self.message_id.clone(),
                tool_call_id: id.to_string(),
                tool_call_name: state.tool_name.clone(),
            });
        }
    }
}

/// State event for a reserved state tool's result. Error outputs carry no
/// `snapshot`/`delta` key and produce nothing.
fn state_sync_event(tool_name: &str, output: &Value) -> Option<AgUiEvent> {
    if !is_state_tool(tool_name) {
        return None;
    }
    let output = output.as_object()?;
    if tool_name == STATE_SNAPSHOT_TOOL {
        output
            .get("snapshot")
            .cloned()
            .map(|snapshot| AgUiEvent::StateSnapshot { snapshot })
    } else {
        output
            .get("delta")
            .cloned()
            .map(|delta| AgUiEvent::StateDelta { delta })
    }
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::STATE_DELTA_TOOL;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn kinds(events: &[AgUiEvent]) -> Vec<&'static str> {
        events.iter().map(AgUiEvent::kind).collect()
    }

    fn run(parts: Vec<StreamPart>) -> (EventTranslator, Vec<AgUiEvent>) {
        let mut translator = EventTranslator::new("t", "r");
        let mut events = vec![translator.started_event()];
        for part in parts {
            events.extend(translator.translate(part, false));
        }
        events.extend(translator.finish(false));
        (translator, events)
    }

    #[test]
    fn streamed_arguments_are_forwarded_without_synthesis() {
        let (_, events) = run(vec![
            StreamPart::ToolInputStart { id: "x".into(), tool_name: "search".into() },
            StreamPart::ToolInputDelta { id: "x".into(), delta: "a".into() },
            StreamPart::ToolInputDelta { id: "x".into(), delta: "b".into() },
            StreamPart::ToolCall { id: "x".into(), tool_name: "search".into(), input: json!({"q": 1}) },
            StreamPart::ToolResult { id: "x".into(), tool_name: "search".into(), output: json!("ok") },
            StreamPart::Finish { finish_reason: None, usage: None },
        ]);

        assert_eq!(
            kinds(&events),
            vec![
                "RUN_STARTED",
                "TOOL_CALL_START",
                "TOOL_CALL_ARGS",
                "TOOL_CALL_ARGS",
                "TOOL_CALL_END",
                "TOOL_CALL_RESULT",
                "RUN_FINISHED"
            ]
        );
        assert!(matches!(&events[2], AgUiEvent::ToolCallArgs { delta, .. } if delta == "a"));
        assert!(matches!(&events[3], AgUiEvent::ToolCallArgs { delta, .. } if delta == "b"));
    }

    #[test]
    fn whole_tool_call_synthesizes_one_args_event() {
        let (translator, events) = run(vec![StreamPart::ToolCall {
            id: "g1".into(),
            tool_name: "lookup".into(),
            input: json!({"id": 7}),
        }]);

        assert_eq!(kinds(&events), vec!["RUN_STARTED", "TOOL_CALL_START", "TOOL_CALL_ARGS", "TOOL_CALL_END", "RUN_FINISHED"]);
        assert_eq!(
            events[2],
            AgUiEvent::ToolCallArgs { tool_call_id: "g1".into(), delta: "{\"id\":7}".into() }
        );
        assert!(translator.tool_call_state("g1").is_none());
    }

    #[test]
    fn duplicate_start_and_call_do_not_double_emit() {
        let mut translator = EventTranslator::new("t", "r");
        let start = StreamPart::ToolInputStart { id: "x".into(), tool_name: "f".into() };
        let call = StreamPart::ToolCall { id: "x".into(), tool_name: "f".into(), input: json!("") };

        let mut events = translator.translate(start.clone(), false);
        events.extend(translator.translate(start, false));
        events.extend(translator.translate(call.clone(), false));
        events.extend(translator.translate(call, false));

        assert_eq!(kinds(&events), vec!["TOOL_CALL_START", "TOOL_CALL_END"]);
        let state = translator.tool_call_state("x").unwrap();
        assert!(state.started && state.ended && !state.saw_argument_delta);
    }

    #[test]
    fn zero_text_id_is_replaced_and_stable() {
        let (_, events) = run(vec![
            StreamPart::TextStart { id: Some("0".into()) },
            StreamPart::text_delta("Hel"),
            StreamPart::text_delta("lo"),
            StreamPart::TextStart { id: Some("msg_2".into()) },
            StreamPart::text_delta("!"),
        ]);

        let ids: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                AgUiEvent::TextMessageChunk { message_id, .. } => Some(message_id.as_str()),
                _ => None,
            })
            .collect();
        assert_ne!(ids[0], "0");
        assert_eq!(ids[0], ids[1]);
        assert_eq!(ids[2], "msg_2");
    }

    #[test]
    fn tool_call_parent_is_current_message() {
        let mut translator = EventTranslator::new("t", "r");
        translator.translate(StreamPart::TextStart { id: Some("m7".into()) }, false);
        let events = translator.translate(
            StreamPart::ToolInputStart { id: "c".into(), tool_name: "f".into() },
            false,
        );
        assert!(matches!(&events[0], AgUiEvent::ToolCallStart { parent_message_id, .. } if parent_message_id == "m7"));
    }

    #[test]
    fn state_tools_emit_state_events_before_result() {
        let (_, events) = run(vec![
            StreamPart::ToolResult {
                id: "s1".into(),
                tool_name: STATE_SNAPSHOT_TOOL.into(),
                output: json!({"success": true, "snapshot": {"counter": 1}}),
            },
            StreamPart::ToolResult {
                id: "s2".into(),
                tool_name: STATE_DELTA_TOOL.into(),
                output: json!({"success": true, "delta": [{"op": "remove", "path": "/a"}]}),
            },
        ]);

        assert_eq!(
            kinds(&events),
            vec!["RUN_STARTED", "STATE_SNAPSHOT", "TOOL_CALL_RESULT", "STATE_DELTA", "TOOL_CALL_RESULT", "RUN_FINISHED"]
        );
        assert_eq!(events[1], AgUiEvent::StateSnapshot { snapshot: json!({"counter": 1}) });
    }

    #[test]
    fn failed_state_tools_emit_only_the_result() {
        let (_, events) = run(vec![
            StreamPart::ToolResult {
                id: "s1".into(),
                tool_name: STATE_SNAPSHOT_TOOL.into(),
                output: json!({"error": "Invalid arguments for tool AGUISendStateSnapshot"}),
            },
            StreamPart::ToolResult {
                id: "s2".into(),
                tool_name: STATE_DELTA_TOOL.into(),
                output: json!({"error": "Invalid arguments for tool AGUISendStateDelta"}),
            },
        ]);

        assert_eq!(
            kinds(&events),
            vec!["RUN_STARTED", "TOOL_CALL_RESULT", "TOOL_CALL_RESULT", "RUN_FINISHED"]
        );
    }

    #[test]
    fn tool_result_content_is_json_text() {
        let (_, events) = run(vec![StreamPart::ToolResult {
            id: "c".into(),
            tool_name: "weather".into(),
            output: json!("rain"),
        }]);
        assert!(matches!(
            &events[1],
            AgUiEvent::ToolCallResult { role: EventRole::Tool, content, .. } if content == "\"rain\""
        ));
    }

    #[test]
    fn abort_finishes_without_error() {
        let (translator, events) = run(vec![StreamPart::text_delta("x"), StreamPart::Abort, StreamPart::text_delta("late")]);
        assert_eq!(kinds(&events), vec!["RUN_STARTED", "TEXT_MESSAGE_CHUNK", "RUN_FINISHED"]);
        assert_eq!(translator.terminal(), Some(&Terminal::Aborted));
    }

    #[test]
    fn error_emits_run_error_once() {
        let (translator, events) = run(vec![StreamPart::error("boom"), StreamPart::error("again")]);
        assert_eq!(kinds(&events), vec!["RUN_STARTED", "RUN_ERROR"]);
        assert_eq!(translator.terminal(), Some(&Terminal::Errored("boom".into())));
    }

    #[test]
    fn errors_after_cancellation_are_suppressed() {
        let mut translator = EventTranslator::new("t", "r");
        assert!(translator.translate(StreamPart::error("socket closed"), true).is_empty());
        assert_eq!(translator.terminal(), Some(&Terminal::Aborted));
        assert_eq!(translator.finish(true), None);
    }

    #[test]
    fn cancelled_stream_end_is_silent() {
        let mut translator = EventTranslator::new("t", "r");
        translator.translate(StreamPart::text_delta("partial"), false);
        assert_eq!(translator.finish(true), None);
        assert_eq!(translator.terminal(), Some(&Terminal::Aborted));
    }
}
