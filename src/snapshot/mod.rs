//! # Snapshot Coordinator
//!
//! Accepts image and video snapshot requests while recording runs. Requests
//! are checked up front, then handed to a supervised worker:
//!
//! ```text
//! request ──▶ checks ──▶ Supervisor::spawn ──▶ worker
//!               │                               │
//!        rejected here,                  holds the image or
//!      no entity touched                  video slot lock
//! ```
//!
//! | Mode | Returns |
//! |------|---------|
//! | [`SnapshotMode::Detached`] | the worker name, immediately |
//! | [`SnapshotMode::Wait`] | the worker's result |
//!
//! Image requests serialize on the transcoder lock, video requests on the
//! `snap_video` lock. The two never contend with each other.

// Standard library imports
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// External crate imports
use tokio::sync::oneshot;
use tracing::{info, warn};

// Internal module imports
use crate::config::policy;
use crate::error::{IngestError, IngestResult};
use crate::placeholder::{self, PlaceholderContext};
use crate::supervisor::{Supervisor, WorkerKind};

pub mod image;
pub mod video;

pub use image::{ImageOutcome, ImageSnapshotter};
pub use video::VideoSnapshotter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Return as soon as the worker is spawned
    #[default]
    Detached,
    /// Block until the worker finishes
    Wait,
}

/// Which cameras an image request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSelection {
    All,
    Named(Vec<String>),
}

impl FromStr for CameraSelection {
    type Err = IngestError;

    /// `all`, or a comma separated list of camera names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let names: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();
        if names.is_empty() {
            return Err(IngestError::validation(
                "cameras",
                "expected 'all' or camera names",
                s,
            ));
        }
        Ok(Self::Named(names))
    }
}

/// What a snapshot request hands back.
#[derive(Debug)]
pub enum SnapshotHandle<T> {
    Detached { worker: String },
    Completed(T),
}

impl<T> SnapshotHandle<T> {
    pub fn worker(&self) -> Option<&str> {
        match self {
            Self::Detached { worker } => Some(worker),
            Self::Completed(_) => None,
        }
    }

    pub fn into_completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Detached { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct SnapshotCoordinator {
    supervisor: Arc<Supervisor>,
    cameras: Vec<String>,
    session_number: u32,
    session_dir: PathBuf,
    image: Option<ImageSnapshotter>,
    video: Option<VideoSnapshotter>,
}

impl SnapshotCoordinator {
    pub fn new(
        supervisor: Arc<Supervisor>,
        cameras: Vec<String>,
        session_number: u32,
        session_dir: PathBuf,
        image: Option<ImageSnapshotter>,
        video: Option<VideoSnapshotter>,
    ) -> Self {
        Self {
            supervisor,
            cameras,
            session_number,
            session_dir,
            image,
            video,
        }
    }

    pub fn image_enabled(&self) -> bool {
        self.image.is_some()
    }

    pub fn video_enabled(&self) -> bool {
        self.video.is_some()
    }

    fn resolve_selection(&self, selection: &CameraSelection) -> IngestResult<Vec<String>> {
        match selection {
            CameraSelection::All => Ok(self.cameras.clone()),
            CameraSelection::Named(names) => {
                if let Some(unknown) = names.iter().find(|n| !self.cameras.contains(n)) {
                    return Err(IngestError::validation(
                        "cameras",
                        "unknown camera",
                        unknown,
                    ));
                }
                Ok(names.clone())
            }
        }
    }

    /// Take one still image per selected camera.
    pub async fn image_snapshot(
        &self,
        selection: &CameraSelection,
        template: &str,
        mode: SnapshotMode,
    ) -> IngestResult<SnapshotHandle<Vec<ImageOutcome>>> {
        let snapshotter = self
            .image
            .clone()
            .ok_or_else(|| IngestError::config("image snapshot", "disabled for this session"))?;
        let cameras = self.resolve_selection(selection)?;
        placeholder::check_tokens(template)?;
        if cameras.len() > 1 && !placeholder::uses(template, placeholder::CAM_NAME) {
            return Err(IngestError::validation(
                "image path",
                "several cameras need {cam_name} in the path",
                template,
            ));
        }

        info!(cameras = ?cameras, template, "image snapshot requested");
        let ctx = PlaceholderContext::new(self.session_number);
        let template = template.to_string();
        let session_dir = self.session_dir.clone();
        self.dispatch("image-snapshot", WorkerKind::ImageSnapshot, mode, async move {
            snapshotter
                .capture(&cameras, &template, &ctx, &session_dir)
                .await
        })
        .await
    }

    /// Record a clip of every camera. `None` uses the configured default
    /// duration.
    pub async fn video_snapshot(
        &self,
        duration_seconds: Option<u64>,
        template: &str,
        mode: SnapshotMode,
    ) -> IngestResult<SnapshotHandle<Option<PathBuf>>> {
        let snapshotter = self
            .video
            .clone()
            .ok_or_else(|| IngestError::config("video snapshot", "disabled for this session"))?;
        let seconds = policy::check_video_duration(
            duration_seconds.unwrap_or(snapshotter.policy().default_duration_seconds),
        )?;
        placeholder::check_tokens(template)?;

        info!(seconds, template, "video snapshot requested");
        let ctx = PlaceholderContext::new(self.session_number).with_camera(self.cameras.join("_"));
        let template = template.to_string();
        let session_dir = self.session_dir.clone();
        self.dispatch("video-snapshot", WorkerKind::VideoSnapshot, mode, async move {
            snapshotter
                .record(Duration::from_secs(seconds), &template, &ctx, &session_dir)
                .await
        })
        .await
    }

    async fn dispatch<T, Fut>(
        &self,
        name: &str,
        kind: WorkerKind,
        mode: SnapshotMode,
        job: Fut,
    ) -> IngestResult<SnapshotHandle<T>>
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let worker = self.supervisor.spawn(name, kind, move |token| async move {
            tokio::select! {
                _ = token.cancelled() => warn!(%kind, "snapshot cancelled"),
                out = job => {
                    let _ = tx.send(out);
                }
            }
        })?;

        match mode {
            SnapshotMode::Detached => Ok(SnapshotHandle::Detached { worker }),
            SnapshotMode::Wait => rx
                .await
                .map(SnapshotHandle::Completed)
                .map_err(|_| IngestError::state(&worker, "cancelled", "complete snapshot")),
        }
    }
}
