//! Per-camera frame counting from the `identity` tap's handoff signal.

// Standard library imports
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// External crate imports
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// Internal module imports
use crate::engine::EngineError;
use crate::error::IngestError;
use crate::topology::describe;
use crate::topology::entity::PipelineEntity;

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Shared counters, written by workers and read by the control path.
#[derive(Debug, Clone, Default)]
pub struct FrameCounters {
    counters: BTreeMap<String, Arc<AtomicU64>>,
}

impl FrameCounters {
    pub fn register(&mut self, camera: &str) -> Arc<AtomicU64> {
        self.counters
            .entry(camera.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    /// Shared handle for a registered camera.
    pub fn counter(&self, camera: &str) -> Option<Arc<AtomicU64>> {
        self.counters.get(camera).cloned()
    }

    pub fn get(&self, camera: &str) -> Option<u64> {
        self.counters
            .get(camera)
            .map(|c| c.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.counters
            .iter()
            .map(|(name, c)| (name.clone(), c.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// Worker counting frames of one camera.
#[derive(Debug)]
pub struct FrameCounter {
    camera: Arc<PipelineEntity>,
    counter: Arc<AtomicU64>,
    log_every: u64,
}

impl FrameCounter {
    pub fn new(camera: Arc<PipelineEntity>, counter: Arc<AtomicU64>, log_every: u64) -> Self {
        Self {
            camera,
            counter,
            log_every: log_every.max(1),
        }
    }

    pub async fn run(self, token: CancellationToken) {
        let camera = self.camera.name().to_string();
        let element = describe::counter_name(&camera);

        loop {
            let waited = tokio::select! {
                _ = token.cancelled() => break,
                result = self.camera.wait_signal(&element, describe::HANDOFF_SIGNAL) => result,
            };

            match waited {
                Ok(()) => {
                    let frames = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
                    if frames % self.log_every == 0 {
                        info!(camera = %camera, frames, "FRAMES: ({camera}, {frames})");
                    }
                }
                Err(IngestError::Engine {
                    source: EngineError::Unsupported(what),
                    ..
                }) => {
                    warn!(camera = %camera, "frame counting unavailable: {what}");
                    break;
                }
                Err(e) => {
                    warn!(camera = %camera, error = %e, "handoff wait failed");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{CameraSpec, ReportMode};
    use crate::engine::MemoryEngine;
    use crate::topology::entity::Role;

    #[tokio::test(start_paused = true)]
    async fn test_counts_handoffs_until_cancelled() {
        let engine = Arc::new(MemoryEngine::new());
        let spec = CameraSpec::new("camA", "rtsp://a").with_report(ReportMode::FrameCounter, 2);
        let camera = PipelineEntity::create(
            engine.clone(),
            "camA",
            Role::Camera,
            describe::camera(&spec),
        )
        .await
        .unwrap();

        let mut counters = FrameCounters::default();
        let counter = counters.register("camA");
        let token = CancellationToken::new();
        let worker = tokio::spawn(FrameCounter::new(camera, counter, 2).run(token.clone()));

        engine.emit_signal("camA", "counter_camA", "handoff", 5);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counters.get("camA"), Some(5));

        token.cancel();
        worker.await.unwrap();
        assert_eq!(counters.snapshot(), vec![("camA".to_string(), 5)]);
    }
}
