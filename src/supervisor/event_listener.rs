//! Logs bus messages of cameras using the passive progress tap.

// Standard library imports
use std::sync::Arc;
use std::time::Duration;

// External crate imports
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// Internal module imports
use crate::topology::entity::PipelineEntity;

#[derive(Debug)]
pub struct EventListener {
    camera: Arc<PipelineEntity>,
    poll_timeout: Duration,
}

impl EventListener {
    pub fn new(camera: Arc<PipelineEntity>, poll_timeout: Duration) -> Self {
        Self {
            camera,
            poll_timeout,
        }
    }

    pub async fn run(self, token: CancellationToken) {
        let camera = self.camera.name().to_string();
        loop {
            let read = tokio::select! {
                _ = token.cancelled() => break,
                read = self.camera.next_bus_message(self.poll_timeout) => read,
            };
            match read {
                Ok(Some(msg)) if msg.kind == "error" => {
                    error!(camera = %camera, source = %msg.source, "{}", msg.text);
                }
                Ok(Some(msg)) if msg.kind == "warning" => {
                    warn!(camera = %camera, source = %msg.source, "{}", msg.text);
                }
                Ok(Some(msg)) => {
                    info!(camera = %camera, kind = %msg.kind, source = %msg.source, "{}", msg.text);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(camera = %camera, error = %e, "bus read failed");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_timeout) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BusMessage, MemoryEngine, PipelineEngine};
    use crate::topology::entity::Role;

    #[tokio::test(start_paused = true)]
    async fn test_drains_bus_and_stops_on_cancel() {
        let engine = Arc::new(MemoryEngine::new());
        let camera = PipelineEntity::create(engine.clone(), "camA", Role::Camera, "x name=camA")
            .await
            .unwrap();
        for i in 0..3 {
            engine
                .post_bus_message(
                    "camA",
                    BusMessage {
                        kind: "element".into(),
                        source: "progress_camA".into(),
                        text: format!("{i} s"),
                    },
                )
                .unwrap();
        }

        let token = CancellationToken::new();
        let worker = tokio::spawn(
            EventListener::new(camera, Duration::from_millis(200)).run(token.clone()),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        worker.await.unwrap();

        let again = engine
            .next_bus_message("camA", Duration::from_millis(1))
            .await
            .unwrap();
        assert!(again.is_none());
    }
}
