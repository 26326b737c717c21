//! # Ingest Orchestrator
//!
//! Runs a continuous multi-camera ingest session on top of an external media
//! pipeline engine (GStreamer Daemon with interpipe elements): persistent
//! segmented recording with retention, plus on-demand still images and short
//! video clips, without interrupting the recording.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────── Session ───────────────────────────┐
//! config file ──▶ │ TopologyBuilder ──▶ EntityRegistry ◀── ShutdownSequencer       │
//!                 │       │                   ▲                                    │
//!                 │       ▼                   │                                    │
//!                 │ RecordingManager   SnapshotCoordinator ──▶ Supervisor (workers) │
//!                 └───────┬───────────────────┬──────────────────────┬─────────────┘
//!                         ▼                   ▼                      ▼
//!                              PipelineEngine (gstd HTTP │ memory │ native)
//! ```
//!
//! The library is organized into these modules:
//! - `engine`: the engine capability trait and its implementations
//! - `config`: block-file parsing, typed policies and timings
//! - `topology`: pipeline entities, their descriptions and construction
//! - `recording`: the persistent multi-branch recorder
//! - `snapshot`: serialized image and video snapshots
//! - `supervisor`: background workers and their cancellation
//! - `session`: numbering, lifecycle and ordered teardown
//! - `control`: the line-based command surface used by the binary
//! - `signals`: SIGINT/SIGTERM as a cancellation token
//! - `core`: the leaky look-back window model
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ingest_orchestrator::{config::parser, engine::GstdClient, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = parser::load("cameras.config")?;
//! let session = Session::builder("/data/ingest", config)
//!     .engine(Arc::new(GstdClient::new("127.0.0.1", 5001)?))
//!     .build()
//!     .await?;
//! session.start().await?;
//! // ... serve snapshot requests ...
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod placeholder;
pub mod recording;
pub mod session;
pub mod signals;
pub mod snapshot;
pub mod supervisor;
pub mod topology;

/// Re-export error types for convenience
pub use error::{IngestError, IngestResult};

pub use config::{Policies, SessionConfig, Timings};
pub use session::{Session, SessionBuilder, ShutdownReport};
pub use snapshot::{CameraSelection, SnapshotHandle, SnapshotMode};
