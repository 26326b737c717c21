//! # Topology
//!
//! Pipeline entities and how they are derived from configuration.
//!
//! ## Architecture
//!
//! ```text
//!  camA ──┬──▶ record_h264 (one branch per camera)
//!         ├──▶ buffer_h264_camA ──▶ snap_video (mp4mux of all buffers)
//!         └──▶ encode_jpeg (rewired per request) ──▶ snap_jpeg
//!  camB ──┴──▶ ...
//! ```

pub mod builder;
pub mod describe;
pub mod entity;
pub mod registry;

pub use builder::{Topology, TopologyBuilder};
pub use entity::{EntityState, PipelineEntity, Role};
pub use registry::EntityRegistry;
