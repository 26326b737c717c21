//! Still-image capture through the shared transcoder.
//!
//! ```text
//!   camA ─┐
//!   camB ─┼─▶ encode_jpeg (listen-to=<camera>) ─▶ snap_jpeg ─▶ file
//!   camC ─┘        one camera at a time, under the transcoder lock
//! ```

// Standard library imports
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// External crate imports
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// Internal module imports
use crate::config::policy::ImageSnapshotPolicy;
use crate::error::{IngestError, IngestResult};
use crate::placeholder::{self, PlaceholderContext};
use crate::topology::describe;
use crate::topology::entity::PipelineEntity;

/// Result of one camera within an image request.
#[derive(Debug)]
pub struct ImageOutcome {
    pub camera: String,
    pub result: IngestResult<PathBuf>,
}

impl ImageOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Owns the transcoder and capture entities plus their single-slot lock.
#[derive(Debug, Clone)]
pub struct ImageSnapshotter {
    encoder: Arc<PipelineEntity>,
    capture: Arc<PipelineEntity>,
    policy: ImageSnapshotPolicy,
    lock: Arc<Mutex<()>>,
}

impl ImageSnapshotter {
    pub fn new(
        encoder: Arc<PipelineEntity>,
        capture: Arc<PipelineEntity>,
        policy: ImageSnapshotPolicy,
    ) -> Self {
        Self {
            encoder,
            capture,
            policy,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Capture one image per camera, in order, holding the transcoder for
    /// the whole request.
    pub async fn capture(
        &self,
        cameras: &[String],
        template: &str,
        ctx: &PlaceholderContext,
        session_dir: &Path,
    ) -> Vec<ImageOutcome> {
        let _slot = self.lock.clone().lock_owned().await;
        debug!(cameras = cameras.len(), "transcoder acquired");

        let mut outcomes = Vec::with_capacity(cameras.len());
        for camera in cameras {
            let ctx = ctx.clone().with_camera(camera);
            let result = self.capture_one(camera, template, &ctx, session_dir).await;
            match &result {
                Ok(path) => info!(camera = %camera, path = %path.display(), "image snapshot written"),
                Err(e) => {
                    warn!(camera = %camera, error = %e, "image snapshot failed");
                    self.reset().await;
                }
            }
            outcomes.push(ImageOutcome {
                camera: camera.clone(),
                result,
            });
        }
        outcomes
    }

    async fn capture_one(
        &self,
        camera: &str,
        template: &str,
        ctx: &PlaceholderContext,
        session_dir: &Path,
    ) -> IngestResult<PathBuf> {
        let path = placeholder::resolve_path(session_dir, template, ctx)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| IngestError::io("create snapshot directory", dir, e))?;
        }

        self.capture
            .set_location(describe::IMAGE_FILESINK, &path)
            .await?;
        self.encoder.rewire(camera).await?;

        self.encoder.play().await?;
        tokio::time::sleep(self.policy.spin_up).await;
        self.capture.play().await?;
        tokio::time::sleep(self.policy.execute).await;

        self.encoder.eos().await?;
        self.capture.eos().await?;
        self.encoder.stop().await?;
        self.capture.stop().await?;
        Ok(path)
    }

    /// Best-effort stop after a failed camera so the next one starts clean.
    async fn reset(&self) {
        for entity in [&self.capture, &self.encoder] {
            if let Err(e) = entity.stop().await {
                debug!(pipeline = entity.name(), error = %e, "reset stop failed");
            }
        }
    }
}
