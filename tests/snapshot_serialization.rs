//! Snapshot serialization and look-back buffer ceilings.

mod common;

use ingest_orchestrator::engine::EngineCall;
use ingest_orchestrator::snapshot::{CameraSelection, SnapshotMode};

use common::harness;

/// `(index, camera)` of every transcoder rewire, in issue order.
fn rewires(calls: &[EngineCall]) -> Vec<(usize, String)> {
    calls
        .iter()
        .enumerate()
        .filter_map(|(i, call)| match call {
            EngineCall::SetProperty {
                name,
                property,
                value,
                ..
            } if name == "encode_jpeg" && property == "listen-to" => Some((i, value.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_image_requests_never_interleave() {
    let h = harness(2).await;
    h.session.start().await.unwrap();
    h.engine.clear_calls();

    let snapshots = h.session.snapshots();
    let reversed = CameraSelection::Named(vec!["camB".into(), "camA".into()]);
    let (first, second) = tokio::join!(
        snapshots.image_snapshot(&CameraSelection::All, "img/a_{cam_name}.jpg", SnapshotMode::Wait),
        snapshots.image_snapshot(&reversed, "img/b_{cam_name}.jpg", SnapshotMode::Wait),
    );
    let first = first.unwrap().into_completed().unwrap();
    let second = second.unwrap().into_completed().unwrap();
    assert!(first.iter().chain(&second).all(|o| o.is_ok()));

    let calls = h.engine.calls();
    let rewired = rewires(&calls);
    let order: Vec<&str> = rewired.iter().map(|(_, cam)| cam.as_str()).collect();
    assert!(
        order == ["camA", "camB", "camB", "camA"] || order == ["camB", "camA", "camA", "camB"],
        "requests interleaved: {order:?}"
    );

    // Every capture finishes before the transcoder is pointed elsewhere.
    let stop = EngineCall::Stop("snap_jpeg".into());
    for pair in rewired.windows(2) {
        let (from, to) = (pair[0].0, pair[1].0);
        assert!(
            calls[from..to].contains(&stop),
            "rewire at {to} issued while capture from {from} was running"
        );
    }

    let dir = h.session.directory();
    for name in ["a_camA", "a_camB", "b_camA", "b_camB"] {
        assert!(first
            .iter()
            .chain(&second)
            .any(|o| o.result.as_ref().is_ok_and(|p| *p == dir.join(format!("img/{name}.jpg")))));
    }

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_video_duration_limits() {
    let h = harness(2).await;
    h.session.start().await.unwrap();
    let snapshots = h.session.snapshots();

    let rejected = snapshots
        .video_snapshot(Some(3), "clips/short.mp4", SnapshotMode::Wait)
        .await;
    assert!(rejected.is_err());
    assert_eq!(h.engine.play_count("snap_video"), 0);

    let clip = snapshots
        .video_snapshot(Some(5), "clips/{session}_{cam_name}.mp4", SnapshotMode::Wait)
        .await
        .unwrap()
        .into_completed()
        .unwrap();
    assert_eq!(
        clip,
        Some(h.session.directory().join("clips/00000_camA_camB.mp4"))
    );
    assert_eq!(h.engine.play_count("snap_video"), 1);
    assert!(h.engine.eos_sent("snap_video"));

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_buffer_ceiling_drops_oldest() {
    let h = harness(1).await;
    h.session.start().await.unwrap();

    let policy = &h.session.policies().video;
    let max_time = policy.max_size_time_ns();
    let max_bytes = policy.max_size_bytes();
    assert_eq!(max_time, 10_500_000_000);

    const SECOND: u64 = 1_000_000_000;
    const MB: u64 = 1024 * 1024;
    let mut last = None;
    for _ in 0..20 {
        let status = h
            .engine
            .feed("buffer_h264_camA", "fifo_queue_camA", SECOND, MB)
            .unwrap();
        assert!(status.held_time_ns <= max_time);
        assert!(status.held_bytes <= max_bytes);
        last = Some(status);
    }
    let status = last.unwrap();
    assert_eq!(status.buffered_chunks, 10);
    assert_eq!(status.dropped_chunks, 10);

    // A burst of large chunks hits the byte ceiling instead.
    let mut last = None;
    for _ in 0..5 {
        let status = h
            .engine
            .feed("buffer_h264_camA", "fifo_queue_camA", SECOND / 10, 40 * MB)
            .unwrap();
        assert!(status.held_bytes <= max_bytes);
        assert!(status.held_time_ns <= max_time);
        last = Some(status);
    }
    let status = last.unwrap();
    assert!(status.dropped_chunks > 10);
    assert_eq!(
        h.engine.window_status("buffer_h264_camA", "fifo_queue_camA"),
        Some(status)
    );

    h.session.shutdown().await;
}
