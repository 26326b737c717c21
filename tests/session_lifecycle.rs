//! Session construction, start-up order, recording layout and numbering.

mod common;

use std::fs;

use ingest_orchestrator::config::parser;
use ingest_orchestrator::engine::{EngineCall, EngineOp};
use ingest_orchestrator::session::header::{CONFIG_FILE, INFO_FILE};
use ingest_orchestrator::session::numbering;

use common::{camera_name, harness, position};

#[tokio::test(start_paused = true)]
async fn test_four_cameras_share_one_recorder() {
    let h = harness(4).await;
    h.session.start().await.unwrap();

    let recorder_creates = h
        .engine
        .calls()
        .iter()
        .filter(|c| matches!(c, EngineCall::Create { name, .. } if name == "record_h264"))
        .count();
    assert_eq!(recorder_creates, 1);
    let description = h.engine.description("record_h264").unwrap();
    assert_eq!(description.matches("splitmuxsink").count(), 4);
    assert_eq!(h.engine.play_count("record_h264"), 1);

    let dir = h.session.directory();
    for i in 0..4 {
        let cam = camera_name(i);
        let sink = format!("multisink_{cam}");
        let expected = dir.join(format!("rec/record_{cam}_%05d.mp4"));
        assert_eq!(
            h.engine.property("record_h264", &sink, "location"),
            Some(expected.display().to_string())
        );
        assert_eq!(
            h.engine.property("record_h264", &sink, "max-files").as_deref(),
            Some("4")
        );
        assert_eq!(
            h.engine.property("record_h264", &sink, "max-size-time").as_deref(),
            Some("900000000000")
        );
    }
    assert!(dir.join("rec").is_dir());

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_plays_cameras_then_buffers_then_recorder() {
    let h = harness(2).await;
    h.session.start().await.unwrap();

    let calls = h.engine.calls();
    let last_camera = position(&calls, &EngineCall::Play("camB".into()));
    let first_buffer = position(&calls, &EngineCall::Play("buffer_h264_camA".into()));
    let recorder = position(&calls, &EngineCall::Play("record_h264".into()));
    assert!(position(&calls, &EngineCall::Play("camA".into())) < last_camera);
    assert!(last_camera < first_buffer);
    assert!(first_buffer < recorder);

    // Snapshot entities stay idle until a request arrives.
    assert_eq!(h.engine.play_count("encode_jpeg"), 0);
    assert_eq!(h.engine.play_count("snap_video"), 0);

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_session_files_written() {
    let h = harness(2).await;
    let dir = h.session.directory();
    assert_eq!(
        dir.file_name().and_then(|n| n.to_str()),
        Some("ingest_session_00000")
    );

    let info = fs::read_to_string(dir.join(INFO_FILE)).unwrap();
    assert!(info.starts_with("SESSION #0\n"));
    assert!(info.contains(&format!("Directory (absolute): {}", dir.display())));
    assert!(info.contains("Recording retention (files per camera): 4"));

    let copy = parser::load(dir.join(CONFIG_FILE)).unwrap();
    assert_eq!(copy.camera_names(), vec!["camA", "camB"]);
    assert_eq!(copy.cameras, h.session.config().cameras);

    h.session.shutdown().await;
}

#[test]
fn test_numbers_never_reused_after_deletion() {
    let root = tempfile::tempdir().unwrap();
    let issued: Vec<u32> = (0..3)
        .map(|_| numbering::allocate(root.path()).unwrap().0)
        .collect();
    assert_eq!(issued, vec![0, 1, 2]);

    // Delete out of order, newest included.
    fs::remove_dir(root.path().join(numbering::session_dir_name(2))).unwrap();
    fs::remove_dir(root.path().join(numbering::session_dir_name(0))).unwrap();
    assert_eq!(numbering::allocate(root.path()).unwrap().0, 3);

    // Without the counter the highest directory still wins.
    fs::remove_file(root.path().join(numbering::COUNTER_FILE)).unwrap();
    assert_eq!(numbering::allocate(root.path()).unwrap().0, 4);
}

#[tokio::test(start_paused = true)]
async fn test_camera_start_failure_is_reported() {
    let h = harness(2).await;
    h.engine.inject_failure(
        EngineOp::Play,
        "camB",
        ingest_orchestrator::engine::EngineError::Transport("connection refused".into()),
    );
    assert!(h.session.start().await.is_err());
    assert_eq!(h.engine.play_count("record_h264"), 0);

    let report = h.session.shutdown().await;
    assert!(report.host_terminated);
    assert!(h.engine.is_terminated());
}
