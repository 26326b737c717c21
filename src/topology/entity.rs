//! Pipeline entities.
//!
//! A [`PipelineEntity`] is the orchestrator-side handle of one named engine
//! pipeline. Every state-changing command goes through the entity's command
//! gate, so an entity executes one command at a time even when several
//! tasks hold the same handle.
//!
//! ```text
//!   Created ──play──▶ Playing ──stop──▶ Stopped ──play──▶ Playing ...
//!      │                 │                 │
//!      └──────stop───────┼─────────────────┘
//!                        ▼
//!                     Deleted   (terminal, reachable from every other state)
//! ```

// Standard library imports
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

// External crate imports
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

// Internal module imports
use crate::engine::{BusMessage, EngineError, PipelineEngine};
use crate::error::{IngestError, IngestResult};

/// Entity groups, in the order the builder creates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Camera,
    Recorder,
    Buffer,
    Encoder,
    Snapshot,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Camera => "camera",
            Self::Recorder => "recorder",
            Self::Buffer => "buffer",
            Self::Encoder => "encoder",
            Self::Snapshot => "snapshot",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Created,
    Playing,
    Stopped,
    Deleted,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Created => "created",
            Self::Playing => "playing",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        })
    }
}

/// Handle to one named engine pipeline.
pub struct PipelineEntity {
    name: String,
    role: Role,
    description: String,
    state: Mutex<EntityState>,
    gate: AsyncMutex<()>,
    engine: Arc<dyn PipelineEngine>,
}

impl fmt::Debug for PipelineEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEntity")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PipelineEntity {
    /// Create the pipeline in the engine and return its handle.
    pub async fn create(
        engine: Arc<dyn PipelineEngine>,
        name: impl Into<String>,
        role: Role,
        description: impl Into<String>,
    ) -> IngestResult<Arc<Self>> {
        let name = name.into();
        let description = description.into();
        debug!(pipeline = %name, %role, %description, "creating pipeline");
        engine
            .create(&name, &description)
            .await
            .map_err(|e| IngestError::engine("create", &name, e))?;

        Ok(Arc::new(Self {
            name,
            role,
            description,
            state: Mutex::new(EntityState::Created),
            gate: AsyncMutex::new(()),
            engine,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn state(&self) -> EntityState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_playing(&self) -> bool {
        self.state() == EntityState::Playing
    }

    fn set_state(&self, state: EntityState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn ensure_live(&self, operation: &str) -> IngestResult<()> {
        match self.state() {
            EntityState::Deleted => Err(IngestError::state(
                &self.name,
                EntityState::Deleted,
                operation,
            )),
            _ => Ok(()),
        }
    }

    pub async fn play(&self) -> IngestResult<()> {
        let _gate = self.gate.lock().await;
        self.ensure_live("play")?;
        self.engine
            .play(&self.name)
            .await
            .map_err(|e| IngestError::engine("play", &self.name, e))?;
        self.set_state(EntityState::Playing);
        debug!(pipeline = %self.name, "playing");
        Ok(())
    }

    pub async fn stop(&self) -> IngestResult<()> {
        let _gate = self.gate.lock().await;
        self.ensure_live("stop")?;
        self.engine
            .stop(&self.name)
            .await
            .map_err(|e| IngestError::engine("stop", &self.name, e))?;
        self.set_state(EntityState::Stopped);
        debug!(pipeline = %self.name, "stopped");
        Ok(())
    }

    pub async fn eos(&self) -> IngestResult<()> {
        let _gate = self.gate.lock().await;
        self.ensure_live("eos")?;
        self.engine
            .send_eos(&self.name)
            .await
            .map_err(|e| IngestError::engine("eos", &self.name, e))?;
        debug!(pipeline = %self.name, "end-of-stream sent");
        Ok(())
    }

    /// Destroy the pipeline. An engine that no longer knows the name counts
    /// as success.
    pub async fn delete(&self) -> IngestResult<()> {
        let _gate = self.gate.lock().await;
        self.ensure_live("delete")?;
        match self.engine.delete(&self.name).await {
            Ok(()) => {}
            Err(EngineError::NotFound(_)) => {
                warn!(pipeline = %self.name, "pipeline already gone from engine");
            }
            Err(e) => return Err(IngestError::engine("delete", &self.name, e)),
        }
        self.set_state(EntityState::Deleted);
        debug!(pipeline = %self.name, "deleted");
        Ok(())
    }

    pub async fn set_property(&self, element: &str, property: &str, value: &str) -> IngestResult<()> {
        let _gate = self.gate.lock().await;
        self.ensure_live("set_property")?;
        self.engine
            .set_property(&self.name, element, property, value)
            .await
            .map_err(|e| {
                IngestError::engine(format!("set {element}.{property}"), &self.name, e)
            })
    }

    /// Set the `location` property of a file sink element.
    pub async fn set_location(&self, element: &str, path: &Path) -> IngestResult<()> {
        self.set_property(element, "location", &path.display().to_string())
            .await
    }

    /// Point this entity's interpipe source at another upstream sink.
    pub async fn rewire(&self, upstream_sink: &str) -> IngestResult<()> {
        let _gate = self.gate.lock().await;
        self.ensure_live("rewire")?;
        self.engine
            .rewire_source(&self.name, upstream_sink)
            .await
            .map_err(|e| IngestError::engine("rewire", &self.name, e))?;
        debug!(pipeline = %self.name, upstream_sink, "rewired");
        Ok(())
    }

    /// Wait for one emission of `signal`. Does not take the command gate.
    pub async fn wait_signal(&self, element: &str, signal: &str) -> IngestResult<()> {
        self.ensure_live("wait_signal")?;
        self.engine
            .wait_signal(&self.name, element, signal)
            .await
            .map_err(|e| IngestError::engine(format!("wait {element}::{signal}"), &self.name, e))
    }

    /// Read one bus message. Does not take the command gate.
    pub async fn next_bus_message(&self, timeout: Duration) -> IngestResult<Option<BusMessage>> {
        self.ensure_live("read_bus")?;
        self.engine
            .next_bus_message(&self.name, timeout)
            .await
            .map_err(|e| IngestError::engine("read bus", &self.name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineOp, MemoryEngine};

    async fn entity(engine: &Arc<MemoryEngine>) -> Arc<PipelineEntity> {
        PipelineEntity::create(
            engine.clone(),
            "cam0",
            Role::Camera,
            "videotestsrc ! interpipesink name=cam0",
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let engine = Arc::new(MemoryEngine::new());
        let cam = entity(&engine).await;
        assert_eq!(cam.state(), EntityState::Created);

        cam.stop().await.unwrap();
        assert_eq!(cam.state(), EntityState::Stopped);
        cam.play().await.unwrap();
        assert!(cam.is_playing());
        cam.stop().await.unwrap();
        cam.play().await.unwrap();
        cam.delete().await.unwrap();
        assert_eq!(cam.state(), EntityState::Deleted);
    }

    #[tokio::test]
    async fn test_deleted_is_terminal_and_not_forwarded() {
        let engine = Arc::new(MemoryEngine::new());
        let cam = entity(&engine).await;
        cam.delete().await.unwrap();

        let err = cam.play().await.unwrap_err();
        assert_eq!(err.category(), "state");
        assert!(cam.eos().await.is_err());
        assert!(cam.delete().await.is_err());
        assert_eq!(engine.count(EngineOp::Play, "cam0"), 0);
        assert_eq!(engine.count(EngineOp::Delete, "cam0"), 1);
    }

    #[tokio::test]
    async fn test_failed_play_keeps_state() {
        let engine = Arc::new(MemoryEngine::new());
        let cam = entity(&engine).await;
        engine.inject_failure(
            EngineOp::Play,
            "cam0",
            EngineError::Rejected {
                code: 1,
                description: "no".into(),
            },
        );
        assert!(cam.play().await.is_err());
        assert_eq!(cam.state(), EntityState::Created);
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_pipeline() {
        let engine = Arc::new(MemoryEngine::new());
        let cam = entity(&engine).await;
        engine.delete("cam0").await.unwrap();
        cam.delete().await.unwrap();
        assert_eq!(cam.state(), EntityState::Deleted);
    }

    #[tokio::test]
    async fn test_create_failure_maps_to_engine_error() {
        let engine = Arc::new(MemoryEngine::new());
        let _first = entity(&engine).await;
        let err = PipelineEntity::create(engine.clone(), "cam0", Role::Camera, "x name=cam0")
            .await
            .unwrap_err();
        assert_eq!(err.category(), "engine");
    }
}
