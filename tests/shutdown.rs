//! Teardown from every point of a session's life.

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ingest_orchestrator::engine::{EngineError, EngineOp};
use ingest_orchestrator::session::{Session, ShutdownStep};
use ingest_orchestrator::snapshot::{CameraSelection, SnapshotMode};
use ingest_orchestrator::topology::EntityState;

use common::harness;

fn all_deleted(session: &Session) -> bool {
    session
        .status()
        .entities
        .iter()
        .all(|(_, _, state)| *state == EntityState::Deleted)
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_start() {
    let h = harness(2).await;

    let report = h.session.shutdown().await;
    assert!(report.is_clean(), "{report:?}");
    assert!(report.eos_sent.is_empty());
    assert_eq!(report.deleted.len(), h.session.status().entities.len());
    assert!(all_deleted(&h.session));
    assert!(h.session.supervisor().active().is_empty());
    assert!(h.engine.is_terminated());
    assert!(h.engine.pipeline_names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_after_start() {
    let h = harness(3).await;
    h.session.start().await.unwrap();
    assert!(!h.session.supervisor().active().is_empty());

    let report = h.session.shutdown().await;
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(h.engine.count(EngineOp::Eos, "record_h264"), 1);
    assert!(report.workers.aborted.is_empty());
    assert!(h.session.supervisor().active().is_empty());
    assert!(all_deleted(&h.session));
    assert!(report.host_terminated);

    // Cameras are stopped last.
    let first_camera = report
        .stopped
        .iter()
        .position(|n| n.starts_with("cam"))
        .unwrap();
    assert!(report.stopped[first_camera..].iter().all(|n| n.starts_with("cam")));

    let second = h.session.shutdown().await;
    assert!(second.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_detached_snapshot() {
    let h = harness(2).await;
    h.session.start().await.unwrap();

    let handle = h
        .session
        .snapshots()
        .video_snapshot(Some(120), "clips/{session}.mp4", SnapshotMode::Detached)
        .await
        .unwrap();
    let worker = handle.worker().unwrap().to_string();
    tokio::task::yield_now().await;
    assert!(h
        .session
        .supervisor()
        .active()
        .iter()
        .any(|(name, _)| *name == worker));

    let report = h.session.shutdown().await;
    assert!(report.workers.joined.contains(&worker));
    assert!(report.is_clean(), "{report:?}");
    assert!(h.session.supervisor().active().is_empty());
    assert!(all_deleted(&h.session));

    // No new work is accepted afterwards.
    assert!(h
        .session
        .snapshots()
        .image_snapshot(&CameraSelection::All, "img/{cam_name}.jpg", SnapshotMode::Detached)
        .await
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_continues_past_failures() {
    let h = harness(2).await;
    h.session.start().await.unwrap();
    h.engine.inject_failure(
        EngineOp::Delete,
        "snap_jpeg",
        EngineError::Rejected {
            code: 13,
            description: "busy".into(),
        },
    );
    h.engine.inject_failure(
        EngineOp::Stop,
        "camA",
        EngineError::Transport("timed out".into()),
    );

    let report = h.session.shutdown().await;
    assert!(!report.is_clean());
    let steps: Vec<ShutdownStep> = report.failures.iter().map(|f| f.step).collect();
    assert!(steps.contains(&ShutdownStep::StopEntities));
    assert!(steps.contains(&ShutdownStep::DeleteEntities));

    assert!(report.host_terminated);
    assert!(h.engine.is_terminated());
    assert!(h.session.supervisor().active().is_empty());
    assert!(report.deleted.iter().any(|n| n == "camA"));
    assert!(!report.deleted.iter().any(|n| n == "snap_jpeg"));
    for (name, _, state) in h.session.status().entities {
        if name != "snap_jpeg" {
            assert_eq!(state, EntityState::Deleted, "{name}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_signal_during_start_tears_down_cleanly() {
    let h = harness(2).await;
    let stop = CancellationToken::new();
    let signal = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        signal.cancel();
    });

    // The signal lands inside the one second camera settle.
    assert!(!h.session.start_until(&stop).await.unwrap());
    assert_eq!(h.engine.play_count("camA"), 1);
    assert_eq!(h.engine.play_count("record_h264"), 0);

    let report = h.session.shutdown().await;
    assert!(report.is_clean(), "{report:?}");
    assert!(report.eos_sent.is_empty());
    assert!(report.host_terminated);
    assert!(h.engine.is_terminated());
    assert!(h.session.supervisor().active().is_empty());
    assert!(all_deleted(&h.session));
}

#[tokio::test(start_paused = true)]
async fn test_signal_before_start_skips_engine_work() {
    let h = harness(1).await;
    let stop = CancellationToken::new();
    stop.cancel();
    h.engine.clear_calls();

    assert!(!h.session.start_until(&stop).await.unwrap());
    assert_eq!(h.engine.play_count("camA"), 0);

    let report = h.session.shutdown().await;
    assert!(report.is_clean(), "{report:?}");
    assert!(all_deleted(&h.session));
}
