//! Topology construction with rollback.
//!
//! Entities are created in a fixed order: cameras, recording, buffers,
//! encoder, image capture, video snapshot. Any failure deletes every entity
//! created by this attempt, removes it from the registry and returns the
//! error.

// Standard library imports
use std::sync::Arc;

// External crate imports
use tracing::{info, warn};

// Internal module imports
use super::describe;
use super::entity::{PipelineEntity, Role};
use super::registry::EntityRegistry;
use crate::config::model::SessionConfig;
use crate::config::policy::Policies;
use crate::engine::PipelineEngine;
use crate::error::{IngestError, IngestResult};

/// Handles to every entity of a built topology.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub cameras: Vec<Arc<PipelineEntity>>,
    pub recorder: Option<Arc<PipelineEntity>>,
    pub buffers: Vec<Arc<PipelineEntity>>,
    pub encoder: Option<Arc<PipelineEntity>>,
    pub image_capture: Option<Arc<PipelineEntity>>,
    pub video_snapshot: Option<Arc<PipelineEntity>>,
}

/// Builds the session's entities from configuration.
pub struct TopologyBuilder<'a> {
    engine: Arc<dyn PipelineEngine>,
    registry: &'a mut EntityRegistry,
    created: Vec<Arc<PipelineEntity>>,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(engine: Arc<dyn PipelineEngine>, registry: &'a mut EntityRegistry) -> Self {
        Self {
            engine,
            registry,
            created: Vec::new(),
        }
    }

    /// Build the full topology, or roll back and return the first error.
    pub async fn build(
        mut self,
        config: &SessionConfig,
        policies: &Policies,
    ) -> IngestResult<Topology> {
        match self.build_all(config, policies).await {
            Ok(topology) => {
                info!(
                    entities = self.created.len(),
                    cameras = topology.cameras.len(),
                    "topology constructed"
                );
                Ok(topology)
            }
            Err(error) => {
                warn!(%error, created = self.created.len(), "topology construction failed, rolling back");
                self.rollback().await;
                Err(error)
            }
        }
    }

    async fn build_all(
        &mut self,
        config: &SessionConfig,
        policies: &Policies,
    ) -> IngestResult<Topology> {
        config.validate()?;
        let mut topology = Topology::default();

        for camera in &config.cameras {
            let entity = self
                .add(&camera.name, Role::Camera, describe::camera(camera))
                .await?;
            topology.cameras.push(entity);
        }

        if policies.recording.enabled {
            topology.recorder = Some(
                self.add(
                    describe::RECORDER,
                    Role::Recorder,
                    describe::recording(&config.cameras),
                )
                .await?,
            );
        }

        if policies.video.enabled {
            let video = &policies.video;
            for camera in &config.cameras {
                let entity = self
                    .add(
                        &describe::buffer_entity_name(&camera.name),
                        Role::Buffer,
                        describe::buffer(&camera.name),
                    )
                    .await?;
                let queue = describe::buffer_queue_name(&camera.name);
                entity
                    .set_property(&queue, "min-threshold-time", &video.min_threshold_ns().to_string())
                    .await?;
                entity
                    .set_property(&queue, "max-size-time", &video.max_size_time_ns().to_string())
                    .await?;
                entity
                    .set_property(&queue, "max-size-bytes", &video.max_size_bytes().to_string())
                    .await?;
                topology.buffers.push(entity);
            }
        }

        if policies.image.enabled {
            let first = config
                .cameras
                .first()
                .ok_or_else(|| IngestError::config("cameras", "at least one camera is required"))?;
            topology.encoder = Some(
                self.add(describe::ENCODER, Role::Encoder, describe::encoder(&first.name))
                    .await?,
            );
            topology.image_capture = Some(
                self.add(
                    describe::IMAGE_CAPTURE,
                    Role::Snapshot,
                    describe::image_capture(),
                )
                .await?,
            );
        }

        if policies.video.enabled {
            topology.video_snapshot = Some(
                self.add(
                    describe::VIDEO_SNAPSHOT,
                    Role::Snapshot,
                    describe::video_snapshot(&config.cameras),
                )
                .await?,
            );
        }

        Ok(topology)
    }

    async fn add(
        &mut self,
        name: &str,
        role: Role,
        description: String,
    ) -> IngestResult<Arc<PipelineEntity>> {
        if self.registry.contains_name(name) {
            return Err(IngestError::config(
                "pipeline name",
                format!("'{name}' is already in use"),
            ));
        }
        let entity = PipelineEntity::create(self.engine.clone(), name, role, description).await?;
        self.created.push(entity.clone());
        self.registry.insert(entity.clone())?;
        Ok(entity)
    }

    async fn rollback(&mut self) {
        for entity in self.created.drain(..).rev() {
            if let Err(error) = entity.delete().await {
                warn!(pipeline = entity.name(), %error, "rollback delete failed");
            }
            self.registry.remove(entity.name());
        }
    }
}
