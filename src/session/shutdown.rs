//! Ordered, best-effort teardown.
//!
//! ```text
//! 1. stop recording        EOS, grace, stop
//! 2. stop workers          cancel, bounded join, abort
//! 3. EOS broadcast         recorder and encoder entities still playing
//! 4. grace                 only when step 3 sent anything
//! 5. stop entities         snapshot, recorder, encoder, buffer, camera
//! 6. delete entities       same order
//! 7. terminate host
//! ```
//!
//! No step aborts the sequence. Failures are logged and collected in the
//! [`ShutdownReport`].

// Standard library imports
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// External crate imports
use tracing::{info, warn};

// Internal module imports
use crate::engine::EngineHost;
use crate::recording::RecordingManager;
use crate::supervisor::{StopSummary, Supervisor};
use crate::topology::entity::{EntityState, PipelineEntity, Role};
use crate::topology::EntityRegistry;

/// Teardown order of entity roles.
pub const STOP_ORDER: [Role; 5] = [
    Role::Snapshot,
    Role::Recorder,
    Role::Encoder,
    Role::Buffer,
    Role::Camera,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    StopRecording,
    StopWorkers,
    BroadcastEos,
    StopEntities,
    DeleteEntities,
    TerminateHost,
}

impl fmt::Display for ShutdownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StopRecording => "stop recording",
            Self::StopWorkers => "stop workers",
            Self::BroadcastEos => "end-of-stream broadcast",
            Self::StopEntities => "stop entities",
            Self::DeleteEntities => "delete entities",
            Self::TerminateHost => "terminate engine host",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownFailure {
    pub step: ShutdownStep,
    pub detail: String,
}

/// What the teardown did and what went wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub workers: StopSummary,
    pub eos_sent: Vec<String>,
    pub stopped: Vec<String>,
    pub deleted: Vec<String>,
    pub host_terminated: bool,
    pub failures: Vec<ShutdownFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// True for the report of a shutdown that had already run.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn fail(&mut self, step: ShutdownStep, detail: impl fmt::Display) {
        warn!(%step, "shutdown step failed: {detail}");
        self.failures.push(ShutdownFailure {
            step,
            detail: detail.to_string(),
        });
    }
}

pub struct ShutdownSequencer<'a> {
    recording: Option<&'a RecordingManager>,
    supervisor: &'a Supervisor,
    registry: &'a EntityRegistry,
    host: &'a dyn EngineHost,
    eos_grace: Duration,
}

impl<'a> ShutdownSequencer<'a> {
    pub fn new(
        recording: Option<&'a RecordingManager>,
        supervisor: &'a Supervisor,
        registry: &'a EntityRegistry,
        host: &'a dyn EngineHost,
        eos_grace: Duration,
    ) -> Self {
        Self {
            recording,
            supervisor,
            registry,
            host,
            eos_grace,
        }
    }

    fn in_stop_order(&self) -> Vec<Arc<PipelineEntity>> {
        STOP_ORDER
            .iter()
            .flat_map(|role| self.registry.by_role(*role))
            .filter(|e| e.state() != EntityState::Deleted)
            .collect()
    }

    pub async fn run(self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        info!(entities = self.registry.len(), "shutdown started");

        if let Some(recording) = self.recording {
            if recording.entity().is_playing() && !recording.stop().await {
                report.fail(ShutdownStep::StopRecording, "recording did not stop cleanly");
            }
        }

        report.workers = self.supervisor.stop_all().await;
        if !report.workers.aborted.is_empty() {
            report.fail(
                ShutdownStep::StopWorkers,
                format!("aborted {}", report.workers.aborted.join(", ")),
            );
        }

        for entity in self
            .registry
            .live()
            .iter()
            .filter(|e| matches!(e.role(), Role::Recorder | Role::Encoder) && e.is_playing())
        {
            match entity.eos().await {
                Ok(()) => report.eos_sent.push(entity.name().to_string()),
                Err(e) => report.fail(ShutdownStep::BroadcastEos, e),
            }
        }
        if !report.eos_sent.is_empty() {
            tokio::time::sleep(self.eos_grace).await;
        }

        let ordered = self.in_stop_order();
        for entity in &ordered {
            match entity.stop().await {
                Ok(()) => report.stopped.push(entity.name().to_string()),
                Err(e) => report.fail(ShutdownStep::StopEntities, e),
            }
        }
        for entity in &ordered {
            match entity.delete().await {
                Ok(()) => report.deleted.push(entity.name().to_string()),
                Err(e) => report.fail(ShutdownStep::DeleteEntities, e),
            }
        }

        match self.host.terminate().await {
            Ok(()) => report.host_terminated = true,
            Err(e) => report.fail(ShutdownStep::TerminateHost, e),
        }

        info!(
            stopped = report.stopped.len(),
            deleted = report.deleted.len(),
            failures = report.failures.len(),
            "shutdown finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, EngineError, EngineOp, MemoryEngine};

    fn registry(entities: &[Arc<PipelineEntity>]) -> EntityRegistry {
        let mut registry = EntityRegistry::new();
        for entity in entities {
            registry.insert(entity.clone()).unwrap();
        }
        registry
    }

    async fn entity(engine: &Arc<MemoryEngine>, name: &str, role: Role) -> Arc<PipelineEntity> {
        PipelineEntity::create(engine.clone(), name, role, format!("fakesrc ! fakesink name={name}"))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_order_and_eos_broadcast() {
        let engine = Arc::new(MemoryEngine::new());
        let camera = entity(&engine, "camA", Role::Camera).await;
        let buffer = entity(&engine, "buffer_h264_camA", Role::Buffer).await;
        let encoder = entity(&engine, "encode_jpeg", Role::Encoder).await;
        let snap = entity(&engine, "snap_jpeg", Role::Snapshot).await;
        camera.play().await.unwrap();
        encoder.play().await.unwrap();

        let supervisor = Supervisor::new(Duration::from_secs(1));
        let entities = vec![camera, buffer, encoder, snap];
        let registry = registry(&entities);
        let before = tokio::time::Instant::now();
        let report = ShutdownSequencer::new(
            None,
            &supervisor,
            &registry,
            engine.as_ref(),
            Duration::from_secs(10),
        )
        .run()
        .await;

        assert!(report.is_clean());
        assert_eq!(report.eos_sent, vec!["encode_jpeg".to_string()]);
        assert!(before.elapsed() >= Duration::from_secs(10));
        assert_eq!(
            report.stopped,
            vec!["snap_jpeg", "encode_jpeg", "buffer_h264_camA", "camA"]
        );
        assert!(entities.iter().all(|e| e.state() == EntityState::Deleted));
        assert!(engine.is_terminated());
        assert!(supervisor.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_abort_the_sequence() {
        let engine = Arc::new(MemoryEngine::new());
        let camera = entity(&engine, "camA", Role::Camera).await;
        let camera_b = entity(&engine, "camB", Role::Camera).await;
        engine.inject_failure(
            EngineOp::Stop,
            "camA",
            EngineError::Transport("connection reset".into()),
        );

        let supervisor = Supervisor::new(Duration::from_secs(1));
        let registry = registry(&[camera.clone(), camera_b.clone()]);
        let report = ShutdownSequencer::new(
            None,
            &supervisor,
            &registry,
            engine.as_ref(),
            Duration::from_secs(10),
        )
        .run()
        .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, ShutdownStep::StopEntities);
        assert!(report.eos_sent.is_empty());
        assert_eq!(report.deleted, vec!["camA", "camB"]);
        assert!(report.host_terminated);
        assert!(engine
            .calls()
            .iter()
            .any(|c| matches!(c, EngineCall::Delete(name) if name == "camA")));
    }
}
