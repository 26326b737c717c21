//! # Ingest Session
//!
//! One run of the orchestrator: a numbered directory, a topology of pipeline
//! entities, persistent recording, snapshot serving and the background
//! workers, torn down exactly once.
//!
//! ## Lifecycle
//!
//! ```text
//! SessionBuilder::build        Session::start                 Session::shutdown
//! ─────────────────────        ──────────────                 ─────────────────
//! issue number, mkdir          play cameras                   ShutdownSequencer
//! write header + config        settle                         (runs once)
//! build topology               play buffers
//! prepare recording            start recording
//!                              spawn monitor/counters/listeners
//! ```
//!
//! Construction errors are fatal: whatever the builder created is deleted
//! again before the error is returned. After `start`, failures are logged
//! at the narrowest scope and the session keeps running.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ingest_orchestrator::config::parser;
//! use ingest_orchestrator::engine::MemoryEngine;
//! use ingest_orchestrator::session::Session;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(MemoryEngine::new());
//! let session = Session::builder("/data/ingest", parser::load("cameras.config")?)
//!     .engine(engine.clone())
//!     .host(engine)
//!     .build()
//!     .await?;
//! session.start().await?;
//! let report = session.shutdown().await;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

// Standard library imports
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// External crate imports
use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// Internal module imports
use crate::config::model::{ReportMode, SessionConfig};
use crate::config::policy::Policies;
use crate::config::timings::Timings;
use crate::engine::{EngineHost, ExternalHost, PipelineEngine};
use crate::error::{IngestError, IngestResult};
use crate::placeholder::PlaceholderContext;
use crate::recording::RecordingManager;
use crate::snapshot::{ImageSnapshotter, SnapshotCoordinator, VideoSnapshotter};
use crate::supervisor::monitor::{MonitorTargets, DEFAULT_MONITOR_INTERVAL};
use crate::supervisor::{
    EventListener, FrameCounter, FrameCounters, ResourceMonitor, Supervisor, WorkerKind,
};
use crate::topology::entity::{EntityState, Role};
use crate::topology::{EntityRegistry, Topology, TopologyBuilder};

pub mod header;
pub mod numbering;
pub mod shutdown;

pub use shutdown::{ShutdownReport, ShutdownSequencer, ShutdownStep};

/// Fluent construction of a [`Session`].
pub struct SessionBuilder {
    root: PathBuf,
    config: SessionConfig,
    engine: Option<Arc<dyn PipelineEngine>>,
    host: Arc<dyn EngineHost>,
    timings: Timings,
    monitor_interval: Duration,
    allocated: Option<(u32, PathBuf)>,
}

impl SessionBuilder {
    pub fn new(root: impl Into<PathBuf>, config: SessionConfig) -> Self {
        Self {
            root: root.into(),
            config,
            engine: None,
            host: Arc::new(ExternalHost),
            timings: Timings::default(),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            allocated: None,
        }
    }

    /// Use a number and directory already issued by
    /// [`numbering::allocate`], e.g. so logging can start in the session
    /// directory before construction.
    pub fn allocated(mut self, number: u32, dir: impl Into<PathBuf>) -> Self {
        self.allocated = Some((number, dir.into()));
        self
    }

    pub fn engine(mut self, engine: Arc<dyn PipelineEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Process that owns the engine; terminated as the last shutdown step.
    pub fn host(mut self, host: Arc<dyn EngineHost>) -> Self {
        self.host = host;
        self
    }

    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Number the session, write its header files and construct every
    /// entity. Nothing is played yet.
    pub async fn build(self) -> IngestResult<Session> {
        let engine = self
            .engine
            .ok_or_else(|| IngestError::config("engine", "no pipeline engine configured"))?;
        self.config.validate()?;
        let policies = Policies::from_config(&self.config)?;

        let (number, dir) = match self.allocated {
            Some(allocated) => allocated,
            None => numbering::allocate(&self.root)?,
        };
        let started = Local::now();
        header::write_session_files(number, &dir, started, &self.config, &policies)?;

        let mut registry = EntityRegistry::new();
        let topology = TopologyBuilder::new(engine.clone(), &mut registry)
            .build(&self.config, &policies)
            .await?;

        let ctx = PlaceholderContext::new(number).at(started);
        let recording = match &topology.recorder {
            Some(entity) => match RecordingManager::new(
                entity.clone(),
                policies.recording.clone(),
                &self.config.cameras,
                &dir,
                &ctx,
                self.timings.recording_eos_grace,
            ) {
                Ok(manager) => Some(manager),
                Err(error) => {
                    discard(&registry).await;
                    return Err(error);
                }
            },
            None => None,
        };

        let mut counters = FrameCounters::default();
        for camera in &self.config.cameras {
            if camera.report == ReportMode::FrameCounter {
                counters.register(&camera.name);
            }
        }

        let supervisor = Arc::new(Supervisor::new(self.timings.worker_join_timeout));
        let image = match (&topology.encoder, &topology.image_capture) {
            (Some(encoder), Some(capture)) => Some(ImageSnapshotter::new(
                encoder.clone(),
                capture.clone(),
                policies.image.clone(),
            )),
            _ => None,
        };
        let video = topology.video_snapshot.as_ref().map(|entity| {
            VideoSnapshotter::new(
                entity.clone(),
                policies.video.clone(),
                self.timings.video_finalize_grace,
            )
        });
        let snapshots = SnapshotCoordinator::new(
            supervisor.clone(),
            self.config.camera_names().into_iter().map(String::from).collect(),
            number,
            dir.clone(),
            image,
            video,
        );

        info!(number, dir = %dir.display(), entities = registry.len(), "session constructed");
        Ok(Session {
            number,
            dir,
            started,
            config: self.config,
            policies,
            host: self.host,
            timings: self.timings,
            monitor_interval: self.monitor_interval,
            registry,
            topology,
            recording,
            counters,
            supervisor,
            snapshots,
            started_flag: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Delete whatever a failed construction left behind.
async fn discard(registry: &EntityRegistry) {
    for entity in registry.all().iter().rev() {
        if let Err(error) = entity.delete().await {
            warn!(pipeline = entity.name(), %error, "cleanup delete failed");
        }
    }
}

/// A running ingest session.
pub struct Session {
    number: u32,
    dir: PathBuf,
    started: DateTime<Local>,
    config: SessionConfig,
    policies: Policies,
    host: Arc<dyn EngineHost>,
    timings: Timings,
    monitor_interval: Duration,
    registry: EntityRegistry,
    topology: Topology,
    recording: Option<RecordingManager>,
    counters: FrameCounters,
    supervisor: Arc<Supervisor>,
    snapshots: SnapshotCoordinator,
    started_flag: AtomicBool,
    shut_down: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("number", &self.number)
            .field("dir", &self.dir)
            .field("entities", &self.registry.names())
            .field("shut_down", &self.shut_down.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn builder(root: impl Into<PathBuf>, config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(root, config)
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn policies(&self) -> &Policies {
        &self.policies
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn recording(&self) -> Option<&RecordingManager> {
        self.recording.as_ref()
    }

    pub fn snapshots(&self) -> &SnapshotCoordinator {
        &self.snapshots
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn frame_counts(&self) -> Vec<(String, u64)> {
        self.counters.snapshot()
    }

    /// Bring the session up: cameras, settle, buffers, recording, workers.
    ///
    /// Failing to play a camera or buffer is fatal and leaves teardown to the
    /// caller. A recording that fails to start is logged and the session
    /// continues without it.
    pub async fn start(&self) -> IngestResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(IngestError::state(
                numbering::session_dir_name(self.number),
                "shut down",
                "start",
            ));
        }
        if self.started_flag.swap(true, Ordering::SeqCst) {
            return Err(IngestError::state(
                numbering::session_dir_name(self.number),
                "started",
                "start",
            ));
        }

        for camera in &self.topology.cameras {
            camera.play().await?;
        }
        info!(cameras = self.topology.cameras.len(), "cameras playing");

        if !self.topology.buffers.is_empty() {
            tokio::time::sleep(self.timings.camera_settle).await;
            for buffer in &self.topology.buffers {
                buffer.play().await?;
            }
            info!(buffers = self.topology.buffers.len(), "look-back buffers playing");
        }

        let recording_root = match &self.recording {
            Some(manager) => {
                manager.start().await;
                manager.root_directory()
            }
            None => None,
        };

        self.spawn_workers(recording_root)?;
        info!(number = self.number, "session started");
        Ok(())
    }

    /// [`start`](Self::start), abandoned as soon as `stop` fires.
    ///
    /// Returns `Ok(false)` when start-up was cut short. Whatever was already
    /// playing is left for [`shutdown`](Self::shutdown), which the caller
    /// runs next either way.
    pub async fn start_until(&self, stop: &CancellationToken) -> IngestResult<bool> {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                warn!(number = self.number, "start-up interrupted");
                Ok(false)
            }
            started = self.start() => started.map(|()| true),
        }
    }

    fn spawn_workers(&self, recording_root: Option<PathBuf>) -> IngestResult<()> {
        let monitor = ResourceMonitor::new(
            MonitorTargets {
                session_dir: self.dir.clone(),
                recording_dir: recording_root,
            },
            self.monitor_interval,
        );
        self.supervisor.spawn(
            "resource-monitor",
            WorkerKind::ResourceMonitor,
            move |token| monitor.run(token),
        )?;

        for (spec, entity) in self.config.cameras.iter().zip(&self.topology.cameras) {
            match spec.report {
                ReportMode::FrameCounter => {
                    let counter = self.counters.counter(&spec.name).ok_or_else(|| {
                        IngestError::state(&spec.name, "unregistered", "count frames")
                    })?;
                    let worker = FrameCounter::new(entity.clone(), counter, spec.report_interval);
                    self.supervisor.spawn(
                        &format!("frame-counter-{}", spec.name),
                        WorkerKind::FrameCounter,
                        move |token| worker.run(token),
                    )?;
                }
                ReportMode::Progress => {
                    let worker = EventListener::new(entity.clone(), self.timings.bus_poll_timeout);
                    self.supervisor.spawn(
                        &format!("event-listener-{}", spec.name),
                        WorkerKind::EventListener,
                        move |token| worker.run(token),
                    )?;
                }
                ReportMode::None => {}
            }
        }
        Ok(())
    }

    /// Point-in-time view for the control surface.
    pub fn status(&self) -> SessionStatus {
        let entities = self
            .registry
            .all()
            .iter()
            .map(|e| (e.name().to_string(), e.role(), e.state()))
            .collect();
        SessionStatus {
            number: self.number,
            directory: self.dir.clone(),
            started: self.started_at(),
            image_snapshots: self.snapshots.image_enabled(),
            video_snapshots: self.snapshots.video_enabled(),
            entities,
            workers: self
                .supervisor
                .active()
                .into_iter()
                .map(|(name, kind)| (name, kind.to_string()))
                .collect(),
            frames: self.frame_counts(),
            shut_down: self.shut_down.load(Ordering::SeqCst),
        }
    }

    /// Run the shutdown sequence. Only the first call does anything; later
    /// calls return an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return ShutdownReport::default();
        }
        ShutdownSequencer::new(
            self.recording.as_ref(),
            &self.supervisor,
            &self.registry,
            self.host.as_ref(),
            self.timings.shutdown_eos_grace,
        )
        .run()
        .await
    }
}

/// Snapshot of a session's entities, workers and frame counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub number: u32,
    pub directory: PathBuf,
    pub started: DateTime<Local>,
    pub image_snapshots: bool,
    pub video_snapshots: bool,
    pub entities: Vec<(String, Role, EntityState)>,
    pub workers: Vec<(String, String)>,
    pub frames: Vec<(String, u64)>,
    pub shut_down: bool,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "session #{} at {}{}",
            self.number,
            self.directory.display(),
            if self.shut_down { " (shut down)" } else { "" }
        )?;
        let enabled = |on: bool| if on { "enabled" } else { "disabled" };
        writeln!(
            f,
            "  started {}, image snapshots {}, video snapshots {}",
            self.started.format("%Y-%m-%d %H:%M:%S"),
            enabled(self.image_snapshots),
            enabled(self.video_snapshots)
        )?;
        for (name, role, state) in &self.entities {
            writeln!(f, "  {name:<24} {role:<10} {state}")?;
        }
        for (name, kind) in &self.workers {
            writeln!(f, "  worker {name} ({kind})")?;
        }
        for (camera, frames) in &self.frames {
            writeln!(f, "  frames {camera}: {frames}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{CameraSpec, ConfigBlock};
    use crate::engine::MemoryEngine;

    fn config() -> SessionConfig {
        SessionConfig {
            cameras: vec![
                CameraSpec::new("camA", "rtsp://a").with_report(ReportMode::FrameCounter, 10),
                CameraSpec::new("camB", "rtsp://b").with_report(ReportMode::Progress, 5),
            ],
            image_snapshot: Some(ConfigBlock::new().with("enabled", "true")),
            video_snapshot: Some(ConfigBlock::new().with("buffer_time", "30")),
            recording: Some(ConfigBlock::new().with("segment_time", "15")),
        }
    }

    async fn session(root: &Path, engine: &Arc<MemoryEngine>) -> Session {
        Session::builder(root, config())
            .engine(engine.clone())
            .host(engine.clone())
            .build()
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_spawns_workers_per_report_mode() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::new());
        let session = session(root.path(), &engine).await;
        session.start().await.unwrap();

        let kinds: Vec<String> = session.status().workers.into_iter().map(|(_, k)| k).collect();
        assert_eq!(kinds, vec!["resource-monitor", "frame-counter", "event-listener"]);
        assert_eq!(engine.play_count("record_h264"), 1);
        assert_eq!(engine.play_count("buffer_h264_camB"), 1);
        assert!(session.start().await.is_err());

        let report = session.shutdown().await;
        assert!(report.is_clean(), "{report:?}");
        assert!(session.supervisor().active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_runs_once() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::new());
        let session = session(root.path(), &engine).await;

        let first = session.shutdown().await;
        assert!(!first.deleted.is_empty());
        let second = session.shutdown().await;
        assert!(second.is_empty());
        assert!(session.start().await.is_err());
        assert!(session
            .status()
            .entities
            .iter()
            .all(|(_, _, state)| *state == EntityState::Deleted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_until_interrupted_during_settle() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::new());
        let session = session(root.path(), &engine).await;

        let stop = CancellationToken::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });
        assert!(!session.start_until(&stop).await.unwrap());
        assert_eq!(engine.play_count("camA"), 1);
        assert_eq!(engine.play_count("buffer_h264_camA"), 0);
        assert_eq!(engine.play_count("record_h264"), 0);
        assert!(session.supervisor().active().is_empty());

        let report = session.shutdown().await;
        assert!(report.is_clean(), "{report:?}");
        assert!(engine.is_terminated());
        assert!(session
            .status()
            .entities
            .iter()
            .all(|(_, _, state)| *state == EntityState::Deleted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_until_completes_without_signal() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::new());
        let session = session(root.path(), &engine).await;

        assert!(session.start_until(&CancellationToken::new()).await.unwrap());
        let status = session.status();
        assert!(status.image_snapshots && status.video_snapshots);
        assert!(status.to_string().contains("image snapshots enabled"));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_unusable_recording_directory_discards_topology() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let engine = Arc::new(MemoryEngine::new());
        let mut config = config();
        config.recording = Some(ConfigBlock::new().with(
            "recording_filename",
            format!("{}/{{cam_name}}/seg_%05d.mp4", blocker.display()),
        ));

        let result = Session::builder(root.path(), config)
            .engine(engine.clone())
            .build()
            .await;
        assert!(result.is_err());
        assert!(engine.pipeline_names().is_empty());
    }
}
