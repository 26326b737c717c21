//! # Persistent Recording
//!
//! Drives the single multi-branch recording entity: per-camera segment
//! location, segment length and retention, then one `play` for every
//! camera at once.
//!
//! Start and stop never raise. They are part of session startup and of the
//! best-effort shutdown, so failures are logged and reported through the
//! return value instead.

// Standard library imports
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// External crate imports
use tracing::{error, info, warn};

// Internal module imports
use crate::config::model::CameraSpec;
use crate::config::policy::RecordingPolicy;
use crate::error::{IngestError, IngestResult};
use crate::placeholder::{self, PlaceholderContext};
use crate::topology::describe;
use crate::topology::entity::PipelineEntity;

/// Resolved per-camera recording target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingBranch {
    pub camera: String,
    /// Segment path with the `%0Nd` formatter intact
    pub location: PathBuf,
}

/// Lifecycle of the persistent recording entity.
#[derive(Debug)]
pub struct RecordingManager {
    entity: Arc<PipelineEntity>,
    policy: RecordingPolicy,
    branches: Vec<RecordingBranch>,
    grace: std::time::Duration,
}

impl RecordingManager {
    /// Resolve every branch path and create the target directories.
    pub fn new(
        entity: Arc<PipelineEntity>,
        policy: RecordingPolicy,
        cameras: &[CameraSpec],
        session_dir: &Path,
        ctx: &PlaceholderContext,
        grace: std::time::Duration,
    ) -> IngestResult<Self> {
        placeholder::validate_segment_template(&policy.filename_template)?;

        let branches = cameras
            .iter()
            .map(|cam| {
                let ctx = ctx.clone().with_camera(&cam.name);
                placeholder::resolve_path(session_dir, &policy.filename_template, &ctx).map(
                    |location| RecordingBranch {
                        camera: cam.name.clone(),
                        location,
                    },
                )
            })
            .collect::<IngestResult<Vec<_>>>()?;

        let dirs: BTreeSet<&Path> = branches
            .iter()
            .filter_map(|b| b.location.parent())
            .collect();
        for dir in dirs {
            fs::create_dir_all(dir)
                .map_err(|e| IngestError::io("create recording directory", dir, e))?;
        }

        Ok(Self {
            entity,
            policy,
            branches,
            grace,
        })
    }

    pub fn branches(&self) -> &[RecordingBranch] {
        &self.branches
    }

    pub fn policy(&self) -> &RecordingPolicy {
        &self.policy
    }

    pub fn entity(&self) -> &Arc<PipelineEntity> {
        &self.entity
    }

    /// Common parent directory of every branch, used by the resource monitor.
    pub fn root_directory(&self) -> Option<PathBuf> {
        let mut dirs = self.branches.iter().filter_map(|b| b.location.parent());
        let mut common = dirs.next()?.to_path_buf();
        for dir in dirs {
            while !dir.starts_with(&common) {
                if !common.pop() {
                    return None;
                }
            }
        }
        Some(common)
    }

    /// Configure every branch and play the recording entity once.
    ///
    /// Returns the segment paths, or `None` if any step failed.
    pub async fn start(&self) -> Option<Vec<PathBuf>> {
        match self.try_start().await {
            Ok(paths) => {
                info!(
                    branches = paths.len(),
                    segment_minutes = self.policy.segment_minutes,
                    max_files = self.policy.retention_files(),
                    "persistent recording started"
                );
                Some(paths)
            }
            Err(e) => {
                error!(error = %e, "failed to start persistent recording");
                None
            }
        }
    }

    async fn try_start(&self) -> IngestResult<Vec<PathBuf>> {
        let segment_ns = self.policy.segment_duration_ns().to_string();
        let max_files = self.policy.retention_files().to_string();

        for branch in &self.branches {
            let sink = describe::multisink_name(&branch.camera);
            self.entity.set_location(&sink, &branch.location).await?;
            self.entity
                .set_property(&sink, "max-size-time", &segment_ns)
                .await?;
            self.entity
                .set_property(&sink, "max-files", &max_files)
                .await?;
            info!(camera = %branch.camera, location = %branch.location.display(), "recording branch configured");
        }
        self.entity.play().await?;

        Ok(self.branches.iter().map(|b| b.location.clone()).collect())
    }

    /// Send EOS, let the muxers finalize, then stop. Returns whether every
    /// step succeeded.
    pub async fn stop(&self) -> bool {
        let mut clean = true;
        match self.entity.eos().await {
            Ok(()) => tokio::time::sleep(self.grace).await,
            Err(e) => {
                warn!(error = %e, "recording end-of-stream failed");
                clean = false;
            }
        }
        if let Err(e) = self.entity.stop().await {
            warn!(error = %e, "recording stop failed");
            clean = false;
        }
        if clean {
            info!("persistent recording stopped");
        }
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, EngineOp, MemoryEngine};
    use crate::topology::entity::{EntityState, Role};
    use std::time::Duration;

    async fn recorder(engine: &Arc<MemoryEngine>, cams: &[CameraSpec]) -> Arc<PipelineEntity> {
        PipelineEntity::create(
            engine.clone(),
            describe::RECORDER,
            Role::Recorder,
            describe::recording(cams),
        )
        .await
        .unwrap()
    }

    fn cams() -> Vec<CameraSpec> {
        vec![
            CameraSpec::new("camA", "rtsp://a"),
            CameraSpec::new("camB", "rtsp://b"),
        ]
    }

    #[tokio::test]
    async fn test_start_configures_each_branch_and_plays_once() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::new());
        let policy = RecordingPolicy {
            enabled: true,
            filename_template: "rec/{cam_name}/seg_%03d.mp4".into(),
            ..RecordingPolicy::default()
        };
        let manager = RecordingManager::new(
            recorder(&engine, &cams()).await,
            policy,
            &cams(),
            dir.path(),
            &PlaceholderContext::new(1),
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(dir.path().join("rec/camA").is_dir());
        assert!(dir.path().join("rec/camB").is_dir());
        assert_eq!(manager.root_directory(), Some(dir.path().join("rec")));

        let paths = manager.start().await.unwrap();
        assert_eq!(paths[1], dir.path().join("rec/camB/seg_%03d.mp4"));
        assert_eq!(engine.play_count("record_h264"), 1);
        assert_eq!(
            engine.property("record_h264", "multisink_camA", "max-files").as_deref(),
            Some("0")
        );
    }

    #[tokio::test]
    async fn test_bad_template_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::new());
        let policy = RecordingPolicy {
            enabled: true,
            filename_template: "rec/all_%05d.mp4".into(),
            ..RecordingPolicy::default()
        };
        let result = RecordingManager::new(
            recorder(&engine, &cams()).await,
            policy,
            &cams(),
            dir.path(),
            &PlaceholderContext::new(1),
            Duration::from_secs(10),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_failure_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::new());
        let manager = RecordingManager::new(
            recorder(&engine, &cams()).await,
            RecordingPolicy {
                enabled: true,
                ..RecordingPolicy::default()
            },
            &cams(),
            dir.path(),
            &PlaceholderContext::new(1),
            Duration::from_secs(10),
        )
        .unwrap();
        engine.inject_failure(
            EngineOp::Play,
            "record_h264",
            EngineError::Rejected {
                code: 1,
                description: "no".into(),
            },
        );
        assert!(manager.start().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_sends_eos_waits_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::new());
        let manager = RecordingManager::new(
            recorder(&engine, &cams()).await,
            RecordingPolicy {
                enabled: true,
                ..RecordingPolicy::default()
            },
            &cams(),
            dir.path(),
            &PlaceholderContext::new(1),
            Duration::from_secs(10),
        )
        .unwrap();
        manager.start().await.unwrap();

        let before = tokio::time::Instant::now();
        assert!(manager.stop().await);
        assert!(before.elapsed() >= Duration::from_secs(10));
        assert!(engine.eos_sent("record_h264"));
        assert_eq!(manager.entity().state(), EntityState::Stopped);
    }
}
