//! In-memory pipeline engine.
//!
//! `MemoryEngine` keeps pipelines in a table instead of talking to a media
//! server. It is used by the test suite and by the binary's dry-run mode
//! (`--engine memory`).
//!
//! # Features
//!
//! - **Call log**: every command is recorded in issue order, successful or not
//! - **Failure injection**: make a given operation on a given pipeline fail
//! - **Element checks**: properties can only be set on elements that appear as
//!   `name=<element>` in the pipeline description
//! - **Signals**: [`MemoryEngine::emit_signal`] releases waiters blocked in
//!   `wait_signal`
//! - **Event bus**: [`MemoryEngine::post_bus_message`] feeds `next_bus_message`
//! - **Leaky queues**: [`MemoryEngine::feed`] pushes chunks through a queue
//!   element bounded by its recorded `max-size-*` properties
//!
//! # Example
//!
//! ```rust
//! use ingest_orchestrator::engine::{MemoryEngine, PipelineEngine};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = MemoryEngine::new();
//! engine.create("cam0", "videotestsrc ! interpipesink name=cam0").await?;
//! engine.play("cam0").await?;
//! assert_eq!(engine.play_count("cam0"), 1);
//! # Ok(())
//! # }
//! ```

// Standard library imports
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// External crate imports
use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use tracing::debug;

// Internal module imports
use super::daemon::EngineHost;
use super::{BusMessage, EngineError, EngineResult, PipelineEngine};
use crate::core::leaky_window::{LeakyWindow, WindowLimits, WindowStatus};

/// Operation kinds, used for failure injection and call-log queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Create,
    Play,
    Stop,
    Delete,
    Eos,
    SetProperty,
    WaitSignal,
    BusRead,
}

/// One recorded engine command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Create { name: String, description: String },
    Play(String),
    Stop(String),
    Delete(String),
    Eos(String),
    SetProperty {
        name: String,
        element: String,
        property: String,
        value: String,
    },
    WaitSignal {
        name: String,
        element: String,
        signal: String,
    },
}

impl EngineCall {
    pub fn op(&self) -> EngineOp {
        match self {
            Self::Create { .. } => EngineOp::Create,
            Self::Play(_) => EngineOp::Play,
            Self::Stop(_) => EngineOp::Stop,
            Self::Delete(_) => EngineOp::Delete,
            Self::Eos(_) => EngineOp::Eos,
            Self::SetProperty { .. } => EngineOp::SetProperty,
            Self::WaitSignal { .. } => EngineOp::WaitSignal,
        }
    }

    /// Pipeline the command addressed
    pub fn pipeline(&self) -> &str {
        match self {
            Self::Create { name, .. }
            | Self::SetProperty { name, .. }
            | Self::WaitSignal { name, .. } => name,
            Self::Play(name) | Self::Stop(name) | Self::Delete(name) | Self::Eos(name) => name,
        }
    }
}

/// Engine-side pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Null,
    Playing,
}

#[derive(Debug)]
struct MemPipeline {
    description: String,
    state: EngineState,
    eos_sent: bool,
    properties: HashMap<(String, String), String>,
    windows: HashMap<String, LeakyWindow>,
    bus: VecDeque<BusMessage>,
}

impl MemPipeline {
    fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            state: EngineState::Null,
            eos_sent: false,
            properties: HashMap::new(),
            windows: HashMap::new(),
            bus: VecDeque::new(),
        }
    }

    fn has_element(&self, element: &str) -> bool {
        let needle = format!("name={element}");
        self.description
            .split_whitespace()
            .any(|token| token == needle)
    }

    fn window_limits(&self, element: &str) -> WindowLimits {
        let read = |prop: &str| -> u64 {
            self.properties
                .get(&(element.to_string(), prop.to_string()))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        };
        WindowLimits {
            max_time_ns: read("max-size-time"),
            max_bytes: read("max-size-bytes"),
            max_buffers: read("max-size-buffers") as usize,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    pipelines: HashMap<String, MemPipeline>,
    calls: Vec<EngineCall>,
    failures: HashMap<(EngineOp, String), EngineError>,
    signals: HashMap<(String, String, String), Arc<Semaphore>>,
    terminated: bool,
}

/// Deterministic in-memory [`PipelineEngine`].
#[derive(Debug, Default)]
pub struct MemoryEngine {
    inner: Mutex<Inner>,
    bus_notify: Notify,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every `op` on `pipeline` fail with `error` until cleared.
    pub fn inject_failure(&self, op: EngineOp, pipeline: &str, error: EngineError) {
        self.lock()
            .failures
            .insert((op, pipeline.to_string()), error);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Every command issued so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn play_count(&self, name: &str) -> usize {
        self.count(EngineOp::Play, name)
    }

    pub fn count(&self, op: EngineOp, name: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op() == op && c.pipeline() == name)
            .count()
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().pipelines.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn description(&self, name: &str) -> Option<String> {
        self.lock()
            .pipelines
            .get(name)
            .map(|p| p.description.clone())
    }

    pub fn state(&self, name: &str) -> Option<EngineState> {
        self.lock().pipelines.get(name).map(|p| p.state)
    }

    pub fn eos_sent(&self, name: &str) -> bool {
        self.lock().pipelines.get(name).is_some_and(|p| p.eos_sent)
    }

    /// Last value set for `element.property`, if any.
    pub fn property(&self, name: &str, element: &str, property: &str) -> Option<String> {
        self.lock().pipelines.get(name).and_then(|p| {
            p.properties
                .get(&(element.to_string(), property.to_string()))
                .cloned()
        })
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    /// Release `count` pending or future `wait_signal` calls.
    pub fn emit_signal(&self, name: &str, element: &str, signal: &str, count: usize) {
        let semaphore = self.signal_semaphore(name, element, signal);
        semaphore.add_permits(count);
    }

    /// Queue a message on a pipeline's bus.
    pub fn post_bus_message(&self, name: &str, message: BusMessage) -> EngineResult<()> {
        {
            let mut inner = self.lock();
            let pipeline = inner
                .pipelines
                .get_mut(name)
                .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
            pipeline.bus.push_back(message);
        }
        self.bus_notify.notify_waiters();
        Ok(())
    }

    /// Push one chunk through the queue element `element`, bounded by the
    /// `max-size-time`, `max-size-bytes` and `max-size-buffers` properties
    /// currently recorded for it.
    pub fn feed(
        &self,
        name: &str,
        element: &str,
        duration_ns: u64,
        bytes: u64,
    ) -> EngineResult<WindowStatus> {
        let mut inner = self.lock();
        let pipeline = inner
            .pipelines
            .get_mut(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        if !pipeline.has_element(element) {
            return Err(EngineError::NotFound(format!("{name}.{element}")));
        }

        let limits = pipeline.window_limits(element);
        let window = pipeline.windows.entry(element.to_string()).or_default();
        window.set_limits(limits);
        window.push(duration_ns, bytes);
        Ok(window.status())
    }

    pub fn window_status(&self, name: &str, element: &str) -> Option<WindowStatus> {
        self.lock()
            .pipelines
            .get(name)
            .and_then(|p| p.windows.get(element))
            .map(LeakyWindow::status)
    }

    fn signal_semaphore(&self, name: &str, element: &str, signal: &str) -> Arc<Semaphore> {
        let key = (name.to_string(), element.to_string(), signal.to_string());
        Arc::clone(
            self.lock()
                .signals
                .entry(key)
                .or_insert_with(|| Arc::new(Semaphore::new(0))),
        )
    }

    /// Record the call, then apply terminal and injected failures.
    fn admit(&self, inner: &mut Inner, call: EngineCall) -> EngineResult<()> {
        let key = (call.op(), call.pipeline().to_string());
        debug!(?call, "memory engine command");
        inner.calls.push(call);

        if inner.terminated {
            return Err(EngineError::Transport("engine terminated".to_string()));
        }
        if let Some(error) = inner.failures.get(&key) {
            return Err(error.clone());
        }
        Ok(())
    }

    fn with_pipeline<T>(
        &self,
        call: EngineCall,
        apply: impl FnOnce(&mut MemPipeline) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let name = call.pipeline().to_string();
        let mut inner = self.lock();
        self.admit(&mut inner, call)?;
        let pipeline = inner
            .pipelines
            .get_mut(&name)
            .ok_or(EngineError::NotFound(name))?;
        apply(pipeline)
    }
}

#[async_trait]
impl PipelineEngine for MemoryEngine {
    async fn create(&self, name: &str, description: &str) -> EngineResult<()> {
        let mut inner = self.lock();
        self.admit(
            &mut inner,
            EngineCall::Create {
                name: name.to_string(),
                description: description.to_string(),
            },
        )?;

        if inner.pipelines.contains_key(name) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        if description.trim().is_empty() {
            return Err(EngineError::InvalidDescription {
                name: name.to_string(),
                reason: "empty description".to_string(),
            });
        }
        inner
            .pipelines
            .insert(name.to_string(), MemPipeline::new(description));
        Ok(())
    }

    async fn play(&self, name: &str) -> EngineResult<()> {
        self.with_pipeline(EngineCall::Play(name.to_string()), |p| {
            p.state = EngineState::Playing;
            p.eos_sent = false;
            Ok(())
        })
    }

    async fn stop(&self, name: &str) -> EngineResult<()> {
        self.with_pipeline(EngineCall::Stop(name.to_string()), |p| {
            p.state = EngineState::Null;
            p.windows.clear();
            Ok(())
        })
    }

    async fn delete(&self, name: &str) -> EngineResult<()> {
        let mut inner = self.lock();
        self.admit(&mut inner, EngineCall::Delete(name.to_string()))?;
        inner
            .pipelines
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn send_eos(&self, name: &str) -> EngineResult<()> {
        self.with_pipeline(EngineCall::Eos(name.to_string()), |p| {
            p.eos_sent = true;
            Ok(())
        })
    }

    async fn set_property(
        &self,
        name: &str,
        element: &str,
        property: &str,
        value: &str,
    ) -> EngineResult<()> {
        let call = EngineCall::SetProperty {
            name: name.to_string(),
            element: element.to_string(),
            property: property.to_string(),
            value: value.to_string(),
        };
        self.with_pipeline(call, |p| {
            if !p.has_element(element) {
                return Err(EngineError::NotFound(format!("{name}.{element}")));
            }
            p.properties
                .insert((element.to_string(), property.to_string()), value.to_string());
            Ok(())
        })
    }

    async fn wait_signal(&self, name: &str, element: &str, signal: &str) -> EngineResult<()> {
        let call = EngineCall::WaitSignal {
            name: name.to_string(),
            element: element.to_string(),
            signal: signal.to_string(),
        };
        self.with_pipeline(call, |p| {
            if p.has_element(element) {
                Ok(())
            } else {
                Err(EngineError::NotFound(format!("{name}.{element}")))
            }
        })?;

        let semaphore = self.signal_semaphore(name, element, signal);
        let permit = semaphore
            .acquire()
            .await
            .map_err(|_| EngineError::Transport("signal source closed".to_string()))?;
        permit.forget();
        Ok(())
    }

    async fn next_bus_message(
        &self,
        name: &str,
        timeout: Duration,
    ) -> EngineResult<Option<BusMessage>> {
        let notified = self.bus_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        {
            let mut inner = self.lock();
            if let Some(error) = inner.failures.get(&(EngineOp::BusRead, name.to_string())) {
                return Err(error.clone());
            }
            let pipeline = inner
                .pipelines
                .get_mut(name)
                .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
            if let Some(message) = pipeline.bus.pop_front() {
                return Ok(Some(message));
            }
        }

        if tokio::time::timeout(timeout, notified).await.is_err() {
            return Ok(None);
        }
        Ok(self
            .lock()
            .pipelines
            .get_mut(name)
            .and_then(|p| p.bus.pop_front()))
    }
}

#[async_trait]
impl EngineHost for MemoryEngine {
    async fn terminate(&self) -> EngineResult<()> {
        let mut inner = self.lock();
        inner.terminated = true;
        inner.pipelines.clear();
        Ok(())
    }
}
