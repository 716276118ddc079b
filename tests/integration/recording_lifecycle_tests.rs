#![cfg(unix)]
//! End-to-end recording lifecycle over fakes and a stub pipeline process.

use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;

use relay_recorder::models::port::MediaKind;
use relay_recorder::models::session::RecordingState;
use relay_recorder::recorder::Peer;
use relay_recorder::AppError;

use super::test_helpers::{
    harness, harness_with, wait_until, EngineCall, FakeMediaEngine, Harness, EXIT_BEFORE_READY,
    NEVER_READY, PID_REPORTING, PLAY_THEN_CRASH, PLAY_THEN_WAIT,
};

const SETTLE: Duration = Duration::from_secs(5);

async fn register_peer(h: &Harness, id: &str, branches: &[MediaKind]) {
    let mut peer = Peer::new(id, "room-1", "Alice");
    for branch in branches {
        peer.set_producer(*branch, format!("producer-{id}-{branch}"));
    }
    h.registry.insert(peer).await;
}

async fn peer_state(h: &Harness, id: &str) -> RecordingState {
    let peer = h.registry.get(id).await.expect("peer registered");
    let state = peer.lock().await.state;
    state
}

async fn wait_for_state(h: &Harness, id: &str, want: RecordingState) -> bool {
    let deadline = tokio::time::Instant::now() + SETTLE;
    loop {
        if peer_state(h, id).await == want {
            return true;
        }
        if tokio::time::Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

async fn wait_for_free_ports(h: &Harness, want: u64) -> bool {
    let deadline = tokio::time::Instant::now() + SETTLE;
    loop {
        if h.ports.count_free().await.expect("count") == want {
            return true;
        }
        if tokio::time::Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
#[serial]
async fn start_claims_ports_writes_sdp_and_goes_live() {
    let h = harness(PLAY_THEN_WAIT).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio, MediaKind::Video]).await;

    h.coordinator
        .start_recording("peer-1")
        .await
        .expect("start");

    assert_eq!(peer_state(&h, "peer-1").await, RecordingState::Recording);
    assert_eq!(
        h.ports
            .ports_for_session("peer-1")
            .await
            .expect("query")
            .len(),
        4
    );

    let sdp = std::fs::read_to_string(h.sdp_dir.join("input-vp8-peer-1.sdp")).expect("sdp file");
    assert!(sdp.contains("m=audio"));
    assert!(sdp.contains("m=video"));

    let peer = h.registry.get("peer-1").await.expect("peer");
    let guard = peer.lock().await;
    let session = guard.recording.as_ref().expect("live session");
    assert!(session.pipeline_pid.is_some());
    drop(guard);

    // One transport and one paused-then-resumed consumer per branch.
    assert_eq!(
        h.engine
            .count(|c| matches!(c, EngineCall::TransportCreated)),
        2
    );
    assert_eq!(
        h.engine
            .count(|c| matches!(c, EngineCall::ConsumerCreated { paused: true, .. })),
        2
    );
    assert_eq!(
        h.engine
            .count(|c| matches!(c, EngineCall::ConsumerResumed { .. })),
        2
    );

    h.coordinator.stop_recording("peer-1").await.expect("stop");
    assert!(wait_for_state(&h, "peer-1", RecordingState::Idle).await);
}

#[tokio::test]
#[serial]
async fn audio_only_peer_claims_two_ports() {
    let h = harness(PLAY_THEN_WAIT).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio]).await;

    h.coordinator
        .start_recording("peer-1")
        .await
        .expect("start");

    let held = h
        .ports
        .ports_for_session("peer-1")
        .await
        .expect("query");
    assert_eq!(held.len(), 2);

    let sdp = std::fs::read_to_string(h.sdp_dir.join("input-vp8-peer-1.sdp")).expect("sdp file");
    assert!(sdp.contains("m=audio"));
    assert!(!sdp.contains("m=video"));
}

#[tokio::test]
#[serial]
async fn unknown_peer_is_not_found() {
    let h = harness(PLAY_THEN_WAIT).await;

    let err = h
        .coordinator
        .start_recording("ghost")
        .await
        .expect_err("unknown peer");
    assert!(matches!(err, AppError::NotFound(_)));

    let err = h
        .coordinator
        .stop_recording("ghost")
        .await
        .expect_err("unknown peer");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[serial]
async fn peer_without_producers_is_rejected_and_stays_idle() {
    let h = harness(PLAY_THEN_WAIT).await;
    register_peer(&h, "peer-1", &[]).await;

    let err = h
        .coordinator
        .start_recording("peer-1")
        .await
        .expect_err("no producer");

    assert!(matches!(err, AppError::NoMediaSource(_)));
    assert_eq!(peer_state(&h, "peer-1").await, RecordingState::Idle);
    assert_eq!(h.ports.count_free().await.expect("count"), 10);
}

#[tokio::test]
#[serial]
async fn start_while_recording_folds_into_a_no_op() {
    let h = harness(PLAY_THEN_WAIT).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio, MediaKind::Video]).await;

    h.coordinator
        .start_recording("peer-1")
        .await
        .expect("first start");
    h.coordinator
        .start_recording("peer-1")
        .await
        .expect("second start is a no-op");

    // No second allocation and no second pipeline setup happened.
    assert_eq!(h.ports.count_free().await.expect("count"), 6);
    assert_eq!(
        h.engine
            .count(|c| matches!(c, EngineCall::TransportCreated)),
        2
    );
}

#[tokio::test]
#[serial]
async fn stop_while_idle_is_a_no_op() {
    let h = harness(PLAY_THEN_WAIT).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio]).await;

    h.coordinator.stop_recording("peer-1").await.expect("stop");

    assert_eq!(peer_state(&h, "peer-1").await, RecordingState::Idle);
}

#[tokio::test]
#[serial]
async fn failed_consume_unwinds_ports_and_sdp() {
    let h = harness_with(PLAY_THEN_WAIT, FakeMediaEngine::failing_consume()).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio, MediaKind::Video]).await;

    let err = h
        .coordinator
        .start_recording("peer-1")
        .await
        .expect_err("consume fails");

    assert!(matches!(err, AppError::Media(_)));
    assert_eq!(peer_state(&h, "peer-1").await, RecordingState::Idle);
    assert_eq!(h.ports.count_free().await.expect("count"), 10);
    assert!(!h.sdp_dir.join("input-vp8-peer-1.sdp").exists());
}

#[tokio::test]
#[serial]
async fn pipeline_exit_before_readiness_unwinds() {
    let h = harness(EXIT_BEFORE_READY).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio, MediaKind::Video]).await;

    let err = h
        .coordinator
        .start_recording("peer-1")
        .await
        .expect_err("pipeline never became ready");

    assert!(matches!(err, AppError::PipelineNotReady(_)));
    assert_eq!(peer_state(&h, "peer-1").await, RecordingState::Idle);
    assert_eq!(h.ports.count_free().await.expect("count"), 10);
}

#[tokio::test]
#[serial]
async fn stop_releases_ports_and_dispatches_post_processing() {
    let h = harness(PLAY_THEN_WAIT).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio, MediaKind::Video]).await;

    h.coordinator
        .start_recording("peer-1")
        .await
        .expect("start");
    h.coordinator.stop_recording("peer-1").await.expect("stop");

    assert!(wait_for_state(&h, "peer-1", RecordingState::Idle).await);
    assert!(wait_for_free_ports(&h, 10).await);

    let uploads = h.uploads.clone();
    assert!(wait_until(SETTLE, move || uploads.lock().unwrap().len() == 1).await);
    {
        let uploads = h.uploads.lock().unwrap();
        let (bucket, key, _path) = &uploads[0];
        assert_eq!(bucket, "video-calls");
        assert_eq!(key, "chats/room-1/peers/peer-1/video.webm");
    }

    let jobs = h.jobs.clone();
    assert!(wait_until(SETTLE, move || jobs.lock().unwrap().len() == 1).await);
    {
        let jobs = h.jobs.lock().unwrap();
        let (queue, job, payload) = &jobs[0];
        assert_eq!(queue, "chatVideo");
        assert_eq!(job, "video");
        assert_eq!(
            payload,
            &serde_json::json!({ "roomId": "room-1", "peerId": "peer-1" })
        );
    }

    // Engine resources were torn down exactly once per branch.
    assert_eq!(
        h.engine
            .count(|c| matches!(c, EngineCall::ConsumerClosed { .. })),
        2
    );
    assert_eq!(h.engine.count(|c| matches!(c, EngineCall::TransportClosed)), 2);
}

#[tokio::test]
#[serial]
async fn stop_interrupts_a_pipeline_that_never_becomes_ready() {
    let h = harness(NEVER_READY).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio, MediaKind::Video]).await;

    let coordinator = Arc::clone(&h.coordinator);
    let start = tokio::spawn(async move { coordinator.start_recording("peer-1").await });

    // The stub never prints its marker, so the start stays pending at the
    // readiness gate.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!start.is_finished());

    // The stop must not block behind the pending start and must reach the
    // already-recorded pid.
    h.coordinator.stop_recording("peer-1").await.expect("stop");

    let result = tokio::time::timeout(SETTLE, start)
        .await
        .expect("start unblocks after the interrupt")
        .expect("join");
    assert!(matches!(result, Err(AppError::PipelineNotReady(_))));

    assert_eq!(peer_state(&h, "peer-1").await, RecordingState::Idle);
    assert!(wait_for_free_ports(&h, 10).await);
    assert!(!h.sdp_dir.join("input-vp8-peer-1.sdp").exists());
}

#[tokio::test]
#[serial]
async fn failed_resume_interrupts_the_spawned_pipeline() {
    let h = harness_with(PID_REPORTING, FakeMediaEngine::failing_resume()).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio]).await;

    let err = h
        .coordinator
        .start_recording("peer-1")
        .await
        .expect_err("resume fails");

    assert!(matches!(err, AppError::Media(_)));
    assert_eq!(peer_state(&h, "peer-1").await, RecordingState::Idle);
    assert_eq!(h.ports.count_free().await.expect("count"), 10);

    // The spawned process must not outlive the unwind still bound to the
    // released ports.
    let raw = std::fs::read_to_string(h._tempdir.path().join("fake-pipeline.sh.pid"))
        .expect("pid file");
    let pid = nix::unistd::Pid::from_raw(raw.trim().parse().expect("pid"));
    let gone = wait_until(SETTLE, move || {
        nix::sys::signal::kill(pid, None).is_err()
    })
    .await;
    assert!(gone, "pipeline process still alive after unwind");
}

#[tokio::test]
#[serial]
async fn double_stop_neither_releases_nor_dispatches_twice() {
    let h = harness(PLAY_THEN_WAIT).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio, MediaKind::Video]).await;

    h.coordinator
        .start_recording("peer-1")
        .await
        .expect("start");
    h.coordinator.stop_recording("peer-1").await.expect("stop");
    // Second stop lands while the first is still in flight.
    h.coordinator
        .stop_recording("peer-1")
        .await
        .expect("repeat stop is a no-op");

    assert!(wait_for_state(&h, "peer-1", RecordingState::Idle).await);
    assert!(wait_for_free_ports(&h, 10).await);

    let uploads = h.uploads.clone();
    assert!(wait_until(SETTLE, move || uploads.lock().unwrap().len() == 1).await);
    // Give any stray duplicate dispatch time to show up.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.uploads.lock().unwrap().len(), 1);
    assert_eq!(h.jobs.lock().unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn sdp_file_is_deleted_after_the_cleanup_delay() {
    let h = harness(PLAY_THEN_WAIT).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio]).await;

    h.coordinator
        .start_recording("peer-1")
        .await
        .expect("start");
    let sdp_path = h.sdp_dir.join("input-vp8-peer-1.sdp");
    assert!(sdp_path.exists());

    h.coordinator.stop_recording("peer-1").await.expect("stop");
    assert!(wait_for_state(&h, "peer-1", RecordingState::Idle).await);

    let path = sdp_path.clone();
    assert!(wait_until(SETTLE, move || !path.exists()).await);
}

#[tokio::test]
#[serial]
async fn abnormal_exit_still_cleans_up_and_dispatches() {
    let h = harness(PLAY_THEN_CRASH).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio, MediaKind::Video]).await;

    h.coordinator
        .start_recording("peer-1")
        .await
        .expect("start");

    // The stub crashes on its own; no stop request is issued.
    assert!(wait_for_state(&h, "peer-1", RecordingState::Idle).await);
    assert!(wait_for_free_ports(&h, 10).await);

    let uploads = h.uploads.clone();
    assert!(wait_until(SETTLE, move || uploads.lock().unwrap().len() == 1).await);
}

#[tokio::test]
#[serial]
async fn peer_can_record_again_after_a_full_cycle() {
    let h = harness(PLAY_THEN_WAIT).await;
    register_peer(&h, "peer-1", &[MediaKind::Audio, MediaKind::Video]).await;

    h.coordinator
        .start_recording("peer-1")
        .await
        .expect("first start");
    h.coordinator.stop_recording("peer-1").await.expect("stop");
    assert!(wait_for_state(&h, "peer-1", RecordingState::Idle).await);
    assert!(wait_for_free_ports(&h, 10).await);

    h.coordinator
        .start_recording("peer-1")
        .await
        .expect("second start");

    assert_eq!(peer_state(&h, "peer-1").await, RecordingState::Recording);
    assert_eq!(
        h.ports
            .ports_for_session("peer-1")
            .await
            .expect("query")
            .len(),
        4
    );
}
