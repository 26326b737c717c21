//! # Configuration Module
//!
//! Session configuration: the block file parser, the camera/feature model
//! and the typed feature policies derived from it.

pub mod model;
pub mod parser;
pub mod policy;
pub mod timings;

pub use model::{CameraSpec, ConfigBlock, ReportMode, SessionConfig};
pub use policy::{ImageSnapshotPolicy, Policies, RecordingPolicy, VideoSnapshotPolicy};
pub use timings::Timings;
