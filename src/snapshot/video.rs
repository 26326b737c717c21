//! Short multi-camera video clips from the leaky look-back buffers.

// Standard library imports
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// External crate imports
use tokio::sync::Mutex;
use tracing::{error, info, warn};

// Internal module imports
use crate::config::policy::VideoSnapshotPolicy;
use crate::error::{IngestError, IngestResult};
use crate::placeholder::{self, PlaceholderContext};
use crate::topology::describe;
use crate::topology::entity::PipelineEntity;

#[derive(Debug, Clone)]
pub struct VideoSnapshotter {
    entity: Arc<PipelineEntity>,
    policy: VideoSnapshotPolicy,
    finalize_grace: Duration,
    lock: Arc<Mutex<()>>,
}

impl VideoSnapshotter {
    pub fn new(
        entity: Arc<PipelineEntity>,
        policy: VideoSnapshotPolicy,
        finalize_grace: Duration,
    ) -> Self {
        Self {
            entity,
            policy,
            finalize_grace,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn policy(&self) -> &VideoSnapshotPolicy {
        &self.policy
    }

    /// Record `duration` of every camera into one file. Returns the path, or
    /// `None` if any step failed.
    pub async fn record(
        &self,
        duration: Duration,
        template: &str,
        ctx: &PlaceholderContext,
        session_dir: &Path,
    ) -> Option<PathBuf> {
        let _slot = self.lock.clone().lock_owned().await;
        match self.try_record(duration, template, ctx, session_dir).await {
            Ok(path) => {
                info!(path = %path.display(), seconds = duration.as_secs(), "video snapshot written");
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "video snapshot failed");
                if let Err(e) = self.entity.stop().await {
                    warn!(error = %e, "video snapshot stop after failure failed");
                }
                None
            }
        }
    }

    async fn try_record(
        &self,
        duration: Duration,
        template: &str,
        ctx: &PlaceholderContext,
        session_dir: &Path,
    ) -> IngestResult<PathBuf> {
        let path = placeholder::resolve_path(session_dir, template, ctx)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| IngestError::io("create snapshot directory", dir, e))?;
        }

        self.entity
            .set_location(describe::VIDEO_FILESINK, &path)
            .await?;
        self.entity.play().await?;
        tokio::time::sleep(duration).await;
        self.entity.eos().await?;
        tokio::time::sleep(self.finalize_grace).await;
        self.entity.stop().await?;
        Ok(path)
    }
}
