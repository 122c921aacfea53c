//! Run execution: one spawned producer task per run, feeding a bounded
//! channel of AG-UI events.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::generation::{stream_text, StreamTextRequest};
use crate::models::ModelSpecifier;
use crate::provider::{create_provider, ModelProvider};
use crate::tools::dynamic::discover_tool_specs;
use crate::tools::state::state_tool_specs;
use crate::tools::{DynamicToolProvider, ToolProviderConnector, ToolSet, ToolSpec};

use super::config::AgentConfig;
use super::convert::normalize;
use super::events::AgUiEvent;
use super::input::RunAgentInput;
use super::overrides::{self, OverridableProperty};
use super::state_machine::{EventTranslator, Terminal};

/// Events buffered between the run task and its consumer.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    /// Cancelled by the caller or by dropping the [`RunStream`].
    Aborted,
}

/// Cancels one run. Cloneable; aborting twice is a no-op.
#[derive(Debug, Clone)]
pub struct RunAbortHandle {
    token: CancellationToken,
}

impl RunAbortHandle {
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The event stream of one run.
///
/// Dropping it before the run ends cancels the run; auxiliary tool providers
/// are still closed.
pub struct RunStream {
    rx: ReceiverStream<AgUiEvent>,
    abort: RunAbortHandle,
    task: Option<JoinHandle<Result<RunOutcome>>>,
}

impl RunStream {
    pub fn abort_handle(&self) -> RunAbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Discard remaining events and wait for the run's result.
    pub async fn outcome(mut self) -> Result<RunOutcome> {
        while self.rx.next().await.is_some() {}
        self.join().await
    }

    /// Drain every event, then the run's result.
    pub async fn collect(mut self) -> (Vec<AgUiEvent>, Result<RunOutcome>) {
        let mut events = Vec::new();
        while let Some(event) = self.rx.next().await {
            events.push(event);
        }
        let outcome = self.join().await;
        (events, outcome)
    }

    async fn join(&mut self) -> Result<RunOutcome> {
        let Some(task) = self.task.take() else {
            return Ok(RunOutcome::Aborted);
        };
        task.await
            .map_err(|e| RelayError::Stream(format!("run task failed: {e}")))?
    }
}

impl Stream for RunStream {
    type Item = AgUiEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_next_unpin(cx)
    }
}

impl Drop for RunStream {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// Runs an [`AgentConfig`] against AG-UI requests.
///
/// Clones share the configuration but not the current run.
pub struct BuiltInAgent {
    config: Arc<AgentConfig>,
    current: Arc<Mutex<Option<RunAbortHandle>>>,
}

impl Clone for BuiltInAgent {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            current: Arc::new(Mutex::new(None)),
        }
    }
}

impl BuiltInAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config: Arc::new(config),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn can_override(&self, property: OverridableProperty) -> bool {
        self.config.can_override(property)
    }

    /// Start a run. Must be called within a Tokio runtime.
    pub fn run(&self, input: RunAgentInput) -> RunStream {
        let token = CancellationToken::new();
        let abort = RunAbortHandle {
            token: token.clone(),
        };
        if let Ok(mut current) = self.current.lock() {
            *current = Some(abort.clone());
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(execute_run(self.config.clone(), input, tx, token));

        RunStream {
            rx: ReceiverStream::new(rx),
            abort,
            task: Some(task),
        }
    }

    /// Abort the most recently started run, if any.
    pub fn abort_run(&self) {
        let handle = self.current.lock().ok().and_then(|mut current| current.take());
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

struct EventSink {
    tx: mpsc::Sender<AgUiEvent>,
    token: CancellationToken,
}

impl EventSink {
    /// A closed channel means the consumer is gone, which cancels the run.
    async fn emit(&self, event: AgUiEvent) {
        let sent = tokio::select! {
            biased;
            sent = self.tx.send(event) => sent.is_ok(),
            _ = self.token.cancelled() => false,
        };
        if !sent && !self.token.is_cancelled() {
            debug!("run stream dropped, cancelling run");
            self.token.cancel();
        }
    }
}

/// Open auxiliary tool-provider connections for one run.
///
/// Every connection is closed exactly once: by [`close_all`] on the normal
/// path, or from `Drop` if the run task is torn down first.
///
/// [`close_all`]: AuxiliaryConnections::close_all
#[derive(Default)]
struct AuxiliaryConnections {
    open: Vec<(String, Arc<dyn DynamicToolProvider>)>,
}

impl AuxiliaryConnections {
    async fn connect_all(&mut self, connectors: &[Arc<dyn ToolProviderConnector>]) -> Result<Vec<ToolSpec>> {
        let mut specs = Vec::new();
        for connector in connectors {
            let label = connector.label();
            let provider = connector.connect().await?;
            self.open.push((label.clone(), provider.clone()));
            let discovered = discover_tool_specs(&provider).await?;
            debug!(provider = %label, tools = discovered.len(), "auxiliary tool provider connected");
            specs.extend(discovered);
        }
        Ok(specs)
    }

    async fn close_all(&mut self) {
        for (label, provider) in std::mem::take(&mut self.open) {
            close_one(label, provider).await;
        }
    }
}

impl Drop for AuxiliaryConnections {
    fn drop(&mut self) {
        let open = std::mem::take(&mut self.open);
        if open.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for (label, provider) in open {
                        close_one(label, provider).await;
                    }
                });
            }
            Err(_) => warn!(count = open.len(), "no runtime to close auxiliary tool providers"),
        }
    }
}

async fn close_one(label: String, provider: Arc<dyn DynamicToolProvider>) {
    match provider.close().await {
        Ok(()) => debug!(provider = %label, "auxiliary tool provider closed"),
        Err(e) => warn!(provider = %label, error = %e, "failed to close auxiliary tool provider"),
    }
}

fn resolve_model(spec: &ModelSpecifier, config: &AgentConfig) -> Result<Arc<dyn ModelProvider>> {
    match spec {
        ModelSpecifier::Provider(provider) => Ok(provider.clone()),
        ModelSpecifier::Id(model) => {
            create_provider(model, &config.relay_config(), config.api_key.as_deref())
        }
    }
}

async fn execute_run(
    config: Arc<AgentConfig>,
    input: RunAgentInput,
    tx: mpsc::Sender<AgUiEvent>,
    token: CancellationToken,
) -> Result<RunOutcome> {
    let thread_id = input.thread_id.clone();
    let run_id = input.run_id.clone();
    let sink = EventSink {
        tx,
        token: token.clone(),
    };
    let mut translator = EventTranslator::new(&thread_id, &run_id);

    sink.emit(translator.started_event()).await;
    info!(%thread_id, %run_id, "run started");

    let prepared = overrides::resolve(&config, input.forwarded_props.as_ref()).and_then(|params| {
        let normalized = normalize(&input, params.prompt.as_deref(), config.normalize_policy())?;
        let model = resolve_model(&params.model, &config)?;
        Ok((params, normalized, model))
    });
    let (params, normalized, model) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!(%thread_id, %run_id, error = %e, "run setup failed");
            return Err(e);
        }
    };
    debug!(
        %thread_id,
        %run_id,
        provider = model.provider_name(),
        model_id = model.model_id(),
        "model resolved"
    );

    let mut auxiliary = AuxiliaryConnections::default();
    let connected = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        connected = auxiliary.connect_all(&config.tool_providers) => Some(connected),
    };
    let auxiliary_tools = match connected {
        None => {
            auxiliary.close_all().await;
            info!(%thread_id, %run_id, "run aborted while connecting tool providers");
            return Ok(RunOutcome::Aborted);
        }
        Some(Err(e)) => {
            if let Some(event) = translator.fail(e.to_string(), token.is_cancelled()) {
                sink.emit(event).await;
            }
            auxiliary.close_all().await;
            return match translator.terminal() {
                Some(Terminal::Aborted) => Ok(RunOutcome::Aborted),
                _ => {
                    warn!(%thread_id, %run_id, error = %e, "tool provider setup failed");
                    Err(e)
                }
            };
        }
        Some(Ok(tools)) => tools,
    };

    let mut tools = normalized.tools;
    tools.merge(config.tools.iter().cloned().map(ToolSpec::local).collect::<ToolSet>());
    tools.merge(state_tool_specs().into_iter().collect());
    tools.merge(auxiliary_tools.into_iter().collect());

    let request = StreamTextRequest::builder()
        .model(model)
        .messages(normalized.messages)
        .tools(tools)
        .settings(params.settings)
        .max_steps(config.max_steps)
        .max_retries(params.max_retries)
        .thread_id(thread_id.clone())
        .run_id(run_id.clone())
        .build();
    let mut parts = stream_text(request, token.clone());

    while let Some(part) = parts.next().await {
        for event in translator.translate(part, token.is_cancelled()) {
            sink.emit(event).await;
        }
        if translator.terminal().is_some() {
            break;
        }
    }
    drop(parts);
    if let Some(event) = translator.finish(token.is_cancelled()) {
        sink.emit(event).await;
    }

    auxiliary.close_all().await;

    match translator.terminal() {
        Some(Terminal::Errored(message)) => {
            warn!(%thread_id, %run_id, error = %message, "run failed");
            Err(RelayError::Stream(message.clone()))
        }
        Some(Terminal::Finished) => {
            info!(%thread_id, %run_id, "run finished");
            Ok(RunOutcome::Finished)
        }
        Some(Terminal::Aborted) | None => {
            info!(%thread_id, %run_id, "run aborted");
            Ok(RunOutcome::Aborted)
        }
    }
}
