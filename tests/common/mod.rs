//! Shared test helpers: a scripted model provider and counting tool providers.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use agui_relay::agent::{AgUiEvent, AgentConfig};
use agui_relay::error::RelayError;
use agui_relay::provider::{ModelProvider, PartStream, ProviderRequest};
use agui_relay::tools::{DynamicTool, DynamicToolProvider, ToolExecutionContext, ToolProviderConnector};
use agui_relay::types::*;

enum Step {
    Parts(Vec<StreamPart>),
    /// Parts followed by a stream that never yields.
    Hang(Vec<StreamPart>),
    Fail(fn() -> RelayError),
}

/// A provider that replays one scripted part sequence per step and records
/// every request it receives.
pub struct MockProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Queue the parts of the next step.
    pub fn queue(self: &Arc<Self>, parts: Vec<StreamPart>) -> Arc<Self> {
        self.steps.lock().unwrap().push_back(Step::Parts(parts));
        self.clone()
    }

    /// Queue a step that emits `parts` and then stalls until cancelled.
    pub fn queue_hanging(self: &Arc<Self>, parts: Vec<StreamPart>) -> Arc<Self> {
        self.steps.lock().unwrap().push_back(Step::Hang(parts));
        self.clone()
    }

    /// Queue a step whose opening fails.
    pub fn queue_failure(self: &Arc<Self>, error: fn() -> RelayError) -> Arc<Self> {
        self.steps.lock().unwrap().push_back(Step::Fail(error));
        self.clone()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap().last().cloned().expect("provider was called")
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        "mock-1"
    }

    async fn stream_step(&self, request: &ProviderRequest) -> Result<PartStream, RelayError> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(futures::stream::empty::<Result<StreamPart, RelayError>>().boxed()),
            Some(Step::Parts(parts)) => Ok(futures::stream::iter(parts.into_iter().map(Ok)).boxed()),
            Some(Step::Hang(parts)) => Ok(futures::stream::iter(parts.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
            Some(Step::Fail(error)) => Err(error()),
        }
    }
}

/// Minimal config around a mock model.
pub fn config(model: Arc<MockProvider>) -> AgentConfig {
    let model: Arc<dyn ModelProvider> = model;
    AgentConfig::builder().model(model).build()
}

pub fn kinds(events: &[AgUiEvent]) -> Vec<&'static str> {
    events.iter().map(AgUiEvent::kind).collect()
}

pub fn finish_step(reason: FinishReason) -> StreamPart {
    StreamPart::FinishStep {
        finish_reason: Some(reason),
        usage: None,
    }
}

pub fn text_of(message: &ModelMessage) -> String {
    message.text()
}

/// Counts connects and closes; optionally exposes one tool.
pub struct CountingConnector {
    pub connects: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub tool: Option<DynamicTool>,
    pub fail_connect: bool,
}

impl CountingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            tool: None,
            fail_connect: false,
        })
    }

    pub fn with_tool(tool: DynamicTool) -> Arc<Self> {
        Arc::new(Self {
            connects: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            tool: Some(tool),
            fail_connect: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            connects: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            tool: None,
            fail_connect: true,
        })
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolProviderConnector for CountingConnector {
    fn label(&self) -> String {
        "counting".into()
    }

    async fn connect(&self) -> Result<Arc<dyn DynamicToolProvider>, RelayError> {
        if self.fail_connect {
            return Err(RelayError::Provider {
                provider: "counting".into(),
                message: "connection refused".into(),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountingToolProvider {
            closes: self.closes.clone(),
            tool: self.tool.clone(),
        }))
    }
}

struct CountingToolProvider {
    closes: Arc<AtomicUsize>,
    tool: Option<DynamicTool>,
}

#[async_trait]
impl DynamicToolProvider for CountingToolProvider {
    async fn list_tools(&self) -> Result<Vec<DynamicTool>, RelayError> {
        Ok(self.tool.clone().into_iter().collect())
    }

    async fn execute_tool(
        &self,
        name: &str,
        args: &Value,
        _ctx: &ToolExecutionContext,
    ) -> Result<Value, RelayError> {
        Ok(serde_json::json!({ "tool": name, "args": args }))
    }

    async fn close(&self) -> Result<(), RelayError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
