//! Shared fixtures for the integration tests.
//!
//! Sessions run against the in-memory engine inside a temporary root, with
//! configuration written to disk and loaded through the block-file parser.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ingest_orchestrator::config::{parser, SessionConfig, Timings};
use ingest_orchestrator::engine::{EngineCall, MemoryEngine};
use ingest_orchestrator::session::Session;
use tempfile::TempDir;

pub const RECORDING_TEMPLATE: &str = "rec/record_{cam_name}_%05d.mp4";

/// Block-format configuration for `cameras` cameras named camA, camB, ...
/// with every feature enabled.
pub fn config_text(cameras: usize) -> String {
    let mut text = String::new();
    for i in 0..cameras {
        let name = camera_name(i);
        text.push_str(&format!(
            "__CAMERA__\nname == {name}\nuri == rtsp://10.0.0.{}/stream\n\n",
            i + 10
        ));
    }
    text.push_str("__IMAGE-SNAPSHOT__\nenabled == true\nspin_up_time == 1.0\nexecute_time == 0.5\n\n");
    text.push_str("__VIDEO-SNAPSHOT__\nbuffer_time == 10\ndefault_duration == 30\n\n");
    text.push_str(&format!(
        "__PERSISTENT-RECORDING__\nrecording_filename == {RECORDING_TEMPLATE}\nsegment_time == 15\nmaximum_segment_files == 4\n"
    ));
    text
}

pub fn camera_name(index: usize) -> String {
    format!("cam{}", (b'A' + index as u8) as char)
}

/// Write `text` next to the session root and load it back.
pub fn load_config(dir: &Path, text: &str) -> SessionConfig {
    let path = dir.join("cameras.config");
    std::fs::write(&path, text).unwrap();
    parser::load(&path).unwrap()
}

pub fn fast_timings() -> Timings {
    Timings {
        camera_settle: Duration::from_secs(1),
        recording_eos_grace: Duration::from_secs(1),
        shutdown_eos_grace: Duration::from_secs(1),
        video_finalize_grace: Duration::from_millis(500),
        worker_join_timeout: Duration::from_secs(5),
        bus_poll_timeout: Duration::from_millis(200),
    }
}

pub struct Harness {
    pub root: TempDir,
    pub engine: Arc<MemoryEngine>,
    pub session: Session,
}

/// Build (but do not start) a session with `cameras` cameras.
pub async fn harness(cameras: usize) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let config = load_config(root.path(), &config_text(cameras));
    let engine = Arc::new(MemoryEngine::new());
    let session = Session::builder(root.path().join("sessions"), config)
        .engine(engine.clone())
        .host(engine.clone())
        .timings(fast_timings())
        .build()
        .await
        .unwrap();
    Harness {
        root,
        engine,
        session,
    }
}

/// Index of the first call matching `wanted`.
pub fn position(calls: &[EngineCall], wanted: &EngineCall) -> usize {
    calls
        .iter()
        .position(|c| c == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} was never issued"))
}
