//! # Background Supervisor
//!
//! Owns every background task of a session: the resource monitor, frame
//! counters, event listeners and snapshot workers.
//!
//! ## Architecture
//!
//! ```text
//!                    root CancellationToken
//!                 ┌──────────┼──────────────┐
//!            child token  child token   child token
//!                 │          │              │
//!            ┌────▼───┐ ┌────▼────┐   ┌─────▼─────┐
//!            │monitor │ │counter_A│   │ snapshot  │
//!            └────────┘ └─────────┘   └───────────┘
//! ```
//!
//! Each worker is registered with its token and `JoinHandle` at spawn time.
//! [`Supervisor::stop_all`] cancels every token unconditionally, joins each
//! worker with a bounded wait and aborts the ones that do not finish.

// Standard library imports
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// External crate imports
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Internal module imports
use crate::error::{IngestError, IngestResult};

pub mod event_listener;
pub mod frame_counter;
pub mod monitor;

pub use event_listener::EventListener;
pub use frame_counter::{FrameCounter, FrameCounters};
pub use monitor::{ResourceMonitor, MIN_MONITOR_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    ResourceMonitor,
    FrameCounter,
    EventListener,
    ImageSnapshot,
    VideoSnapshot,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResourceMonitor => "resource-monitor",
            Self::FrameCounter => "frame-counter",
            Self::EventListener => "event-listener",
            Self::ImageSnapshot => "image-snapshot",
            Self::VideoSnapshot => "video-snapshot",
        })
    }
}

/// One registered worker.
#[derive(Debug)]
pub struct WorkerHandle {
    pub name: String,
    pub kind: WorkerKind,
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// Outcome of [`Supervisor::stop_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopSummary {
    /// Workers that finished within the join timeout
    pub joined: Vec<String>,
    /// Workers that had to be aborted
    pub aborted: Vec<String>,
}

/// Registry of background workers.
#[derive(Debug)]
pub struct Supervisor {
    root: CancellationToken,
    workers: Mutex<Vec<WorkerHandle>>,
    next_id: AtomicU64,
    join_timeout: Duration,
}

impl Supervisor {
    pub fn new(join_timeout: Duration) -> Self {
        Self {
            root: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            join_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WorkerHandle>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn and register a worker. The closure receives the worker's
    /// cancellation token and must return promptly once it fires.
    ///
    /// Returns the worker's unique name. Fails once `stop_all` has run.
    pub fn spawn<F, Fut>(&self, name: &str, kind: WorkerKind, worker: F) -> IngestResult<String>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut workers = self.lock();
        if self.root.is_cancelled() {
            return Err(IngestError::state(name, "stopped", "spawn worker"));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let unique = format!("{name}#{id}");
        let token = self.root.child_token();
        let join = tokio::spawn(worker(token.clone()));

        debug!(worker = %unique, %kind, "worker spawned");
        workers.retain(|w| !w.join.is_finished());
        workers.push(WorkerHandle {
            name: unique.clone(),
            kind,
            token,
            join,
        });
        Ok(unique)
    }

    /// Workers still running, as `(name, kind)`.
    pub fn active(&self) -> Vec<(String, WorkerKind)> {
        self.lock()
            .iter()
            .filter(|w| !w.join.is_finished())
            .map(|w| (w.name.clone(), w.kind))
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel every worker, join each with a bounded wait, abort stragglers.
    pub async fn stop_all(&self) -> StopSummary {
        let workers: Vec<WorkerHandle> = {
            let mut guard = self.lock();
            self.root.cancel();
            guard.drain(..).collect()
        };
        for worker in &workers {
            worker.token.cancel();
        }

        let timeout = self.join_timeout;
        let results = join_all(workers.into_iter().map(|mut worker| async move {
            match tokio::time::timeout(timeout, &mut worker.join).await {
                Ok(Ok(())) => (worker.name, true),
                Ok(Err(e)) => {
                    warn!(worker = %worker.name, error = %e, "worker ended abnormally");
                    (worker.name, true)
                }
                Err(_) => {
                    warn!(worker = %worker.name, "worker did not stop in time, aborting");
                    worker.join.abort();
                    let _ = worker.join.await;
                    (worker.name, false)
                }
            }
        }))
        .await;

        let mut summary = StopSummary::default();
        for (name, joined) in results {
            if joined {
                summary.joined.push(name);
            } else {
                summary.aborted.push(name);
            }
        }
        info!(
            joined = summary.joined.len(),
            aborted = summary.aborted.len(),
            "all workers stopped"
        );
        summary
    }
}
