//! Ordered entity registry keyed by (role, name).

// Standard library imports
use std::sync::Arc;

// Internal module imports
use super::entity::{EntityState, PipelineEntity, Role};
use crate::error::{IngestError, IngestResult};

/// All entities of a session, in creation order.
///
/// Names are unique across every role, so a camera name can never be
/// reused by another group.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entries: Vec<Arc<PipelineEntity>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Arc<PipelineEntity>) -> IngestResult<()> {
        if let Some(existing) = self.entries.iter().find(|e| e.name() == entity.name()) {
            return Err(IngestError::config(
                "pipeline name",
                format!(
                    "'{}' already registered as {}",
                    entity.name(),
                    existing.role()
                ),
            ));
        }
        self.entries.push(entity);
        Ok(())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name() == name)
    }

    /// Entities of one role, in creation order.
    pub fn by_role(&self, role: Role) -> Vec<Arc<PipelineEntity>> {
        self.entries
            .iter()
            .filter(|e| e.role() == role)
            .cloned()
            .collect()
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<PipelineEntity>> {
        let index = self.entries.iter().position(|e| e.name() == name)?;
        Some(self.entries.remove(index))
    }

    pub fn all(&self) -> Vec<Arc<PipelineEntity>> {
        self.entries.clone()
    }

    /// Entities not yet deleted.
    pub fn live(&self) -> Vec<Arc<PipelineEntity>> {
        self.entries
            .iter()
            .filter(|e| e.state() != EntityState::Deleted)
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    #[tokio::test]
    async fn test_names_unique_across_roles() {
        let engine = Arc::new(MemoryEngine::new());
        let mut registry = EntityRegistry::new();
        let cam = PipelineEntity::create(engine.clone(), "cam0", Role::Camera, "x name=cam0")
            .await
            .unwrap();
        registry.insert(cam.clone()).unwrap();
        assert!(registry.insert(cam).is_err());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains_name("cam0"));
        assert_eq!(registry.by_role(Role::Camera).len(), 1);
        assert!(registry.by_role(Role::Buffer).is_empty());
    }

    #[tokio::test]
    async fn test_by_role_keeps_order_and_remove() {
        let engine = Arc::new(MemoryEngine::new());
        let mut registry = EntityRegistry::new();
        for name in ["c", "a", "b"] {
            let entity = PipelineEntity::create(engine.clone(), name, Role::Camera, "x name=y")
                .await
                .unwrap();
            registry.insert(entity).unwrap();
        }
        let names: Vec<_> = registry
            .by_role(Role::Camera)
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);

        assert!(registry.remove("a").is_some());
        assert_eq!(registry.names(), vec!["c", "b"]);
        assert!(registry.remove("a").is_none());
    }

    #[tokio::test]
    async fn test_live_skips_deleted() {
        let engine = Arc::new(MemoryEngine::new());
        let mut registry = EntityRegistry::new();
        for name in ["camA", "camB"] {
            let entity = PipelineEntity::create(engine.clone(), name, Role::Camera, "x name=y")
                .await
                .unwrap();
            registry.insert(entity).unwrap();
        }
        registry.by_role(Role::Camera)[0].delete().await.unwrap();

        let live: Vec<_> = registry.live().iter().map(|e| e.name().to_string()).collect();
        assert_eq!(live, vec!["camB"]);
        assert_eq!(registry.len(), 2);
    }
}
