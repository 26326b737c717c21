//! # Pipeline Engine Client
//!
//! Capability interface to the external media-pipeline engine. The
//! orchestrator never moves media itself; it only creates, plays, stops and
//! deletes *named* pipelines, sends end-of-stream, sets element properties
//! and rewires interpipe sources.
//!
//! ## Implementations
//!
//! - [`gstd::GstdClient`]: GStreamer Daemon over its HTTP API
//! - [`memory::MemoryEngine`]: deterministic in-memory engine (tests, dry runs)
//! - `native::NativeEngine`: in-process gstreamer-rs (feature `native-engine`)
//!
//! The engine process itself is owned through [`EngineHost`], which the
//! shutdown sequence uses as its very last step.

// Standard library imports
use std::time::Duration;

// External crate imports
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal module imports
pub mod daemon;
pub mod gstd;
pub mod memory;
#[cfg(all(feature = "native-engine", target_os = "linux"))]
pub mod native;

pub use daemon::{EngineHost, ExternalHost, GstdDaemon, GstdDaemonOptions};
pub use gstd::GstdClient;
pub use memory::{EngineCall, EngineOp, EngineState, MemoryEngine};

/// Failures reported by the pipeline engine for a single command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// A pipeline with this name already exists
    #[error("pipeline '{0}' already exists")]
    DuplicateName(String),
    /// The engine could not build a pipeline from the description
    #[error("invalid description for '{name}': {reason}")]
    InvalidDescription { name: String, reason: String },
    /// The pipeline (or element inside it) does not exist
    #[error("'{0}' not found")]
    NotFound(String),
    /// The engine accepted the request but refused to carry it out
    #[error("engine rejected command (code {code}): {description}")]
    Rejected { code: i64, description: String },
    /// The engine could not be reached or answered garbage
    #[error("engine transport failure: {0}")]
    Transport(String),
    /// The engine implementation does not offer this capability
    #[error("operation not supported by this engine: {0}")]
    Unsupported(&'static str),
}

/// Result type for engine commands
pub type EngineResult<T> = Result<T, EngineError>;

/// One message read from a pipeline's event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    /// Message type as reported by the engine (e.g. `element`, `eos`, `error`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Name of the element that posted the message
    #[serde(default)]
    pub source: String,
    /// Human readable payload
    #[serde(default)]
    pub text: String,
}

/// Name of the interpipe source element of a pipeline, the one rewired by
/// [`PipelineEngine::rewire_source`].
pub fn source_element_name(pipeline: &str) -> String {
    format!("{pipeline}_src")
}

/// Abstract interface for the pipeline engine.
///
/// Every command addresses a pipeline by name. Implementations must be safe
/// to call from several tasks at once; the orchestrator serializes commands
/// per pipeline, not globally.
#[async_trait]
pub trait PipelineEngine: Send + Sync {
    /// Create a named pipeline from a textual description.
    async fn create(&self, name: &str, description: &str) -> EngineResult<()>;

    /// Move the pipeline to the playing state.
    async fn play(&self, name: &str) -> EngineResult<()>;

    /// Move the pipeline to the null (stopped) state.
    async fn stop(&self, name: &str) -> EngineResult<()>;

    /// Destroy the pipeline. The name may be reused afterwards.
    async fn delete(&self, name: &str) -> EngineResult<()>;

    /// Inject an end-of-stream event so muxers can finalize their files.
    async fn send_eos(&self, name: &str) -> EngineResult<()>;

    /// Set a property on a named element inside the pipeline.
    async fn set_property(
        &self,
        name: &str,
        element: &str,
        property: &str,
        value: &str,
    ) -> EngineResult<()>;

    /// Point the pipeline's interpipe source at a different upstream sink.
    async fn rewire_source(&self, name: &str, upstream_sink: &str) -> EngineResult<()> {
        self.set_property(name, &source_element_name(name), "listen-to", upstream_sink)
            .await
    }

    /// Block until `element` inside the pipeline emits `signal` once.
    async fn wait_signal(&self, name: &str, element: &str, signal: &str) -> EngineResult<()>;

    /// Read the next bus message, waiting at most `timeout`.
    async fn next_bus_message(
        &self,
        name: &str,
        timeout: Duration,
    ) -> EngineResult<Option<BusMessage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_element_name() {
        assert_eq!(source_element_name("encode_jpeg"), "encode_jpeg_src");
    }

    #[test]
    fn test_bus_message_from_json() {
        let msg: BusMessage =
            serde_json::from_str(r#"{"type":"element","source":"progress_cam0","text":"12 s"}"#)
                .unwrap();
        assert_eq!(msg.kind, "element");
        assert_eq!(msg.source, "progress_cam0");
    }
}
