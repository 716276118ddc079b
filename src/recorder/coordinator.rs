//! Recording coordinator.
//!
//! Per-peer state machine orchestrating port acquisition, SDP generation,
//! transport/consumer setup against the media engine, pipeline supervision,
//! and cleanup ordering. Transitions for one peer are serialized by the
//! peer's lock; across peers the coordinator is fully concurrent, with port
//! contention resolved in the durable store.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::media::MediaEngine;
use crate::models::port::{MediaKind, PortKind, ACQUISITION_ORDER};
use crate::models::session::{RecordingSession, RecordingState};
use crate::persistence::port_repo::PortRepo;
use crate::pipeline::{self, PipelineEvent, PipelineHandle, PipelineSpec};
use crate::postprocess::PostProcessDispatcher;
use crate::recorder::registry::{MediaHandle, Peer, PeerRegistry};
use crate::sdp;
use crate::{AppError, Result};

/// Orchestrates recording sessions for all registered peers.
pub struct RecordingCoordinator {
    config: Arc<GlobalConfig>,
    ports: PortRepo,
    engine: Arc<dyn MediaEngine>,
    registry: Arc<PeerRegistry>,
    dispatcher: Arc<PostProcessDispatcher>,
}

impl RecordingCoordinator {
    /// Create a coordinator over the given collaborators.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        ports: PortRepo,
        engine: Arc<dyn MediaEngine>,
        registry: Arc<PeerRegistry>,
        dispatcher: Arc<PostProcessDispatcher>,
    ) -> Self {
        Self {
            config,
            ports,
            engine,
            registry,
            dispatcher,
        }
    }

    /// Registry of peers this coordinator serves.
    #[must_use]
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Start recording a peer's live producers.
    ///
    /// Resolves once media is flowing into the pipeline. A start while a
    /// session is already live folds into a no-op success, so concurrent
    /// calls can never race into a second allocation.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` for an unknown peer, `AppError::NoMediaSource`
    /// if the peer has no live producer; allocation, engine and pipeline
    /// failures surface after all partially set-up state is unwound.
    pub async fn start_recording(&self, peer_id: &str) -> Result<()> {
        let peer_arc = self
            .registry
            .get(peer_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("peer {peer_id}")))?;
        let mut peer = peer_arc.lock().await;

        if peer.state != RecordingState::Idle {
            debug!(peer_id, state = %peer.state, "start requested while busy; no-op");
            return Ok(());
        }

        if !peer.has_producer() {
            return Err(AppError::NoMediaSource(format!(
                "peer {peer_id} has no live producer"
            )));
        }

        peer.transition(RecordingState::Acquiring);
        info!(peer_id, "recording start");

        let mut handle = match self.acquire_and_spawn(&mut peer).await {
            Ok(handle) => handle,
            Err(err) => {
                self.unwind(&mut peer).await;
                peer.transition(RecordingState::Idle);
                return Err(err);
            }
        };

        // Readiness gate: consumers stay paused until the sink is playing,
        // so no media is dropped before the pipeline can take it. The peer
        // lock is released here so a stop request can interrupt a pipeline
        // that never reaches its playing state.
        drop(peer);
        let ready = handle.next_event().await;
        let mut peer = peer_arc.lock().await;

        let outcome = match ready {
            Some(PipelineEvent::Ready) => resume_consumers(&peer).await,
            Some(PipelineEvent::Exited { code, signal }) => {
                Err(AppError::PipelineNotReady(format!(
                    "pipeline exited before readiness: code {code:?}, signal {signal:?}"
                )))
            }
            None => Err(AppError::PipelineNotReady(
                "pipeline event channel closed before readiness".into(),
            )),
        };

        match outcome {
            Ok(()) => {
                peer.transition(RecordingState::Recording);
                info!(peer_id, pid = handle.pid().unwrap_or(0), "recording live");
                drop(peer);

                self.spawn_exit_monitor(peer_arc, handle);
                Ok(())
            }
            Err(err) => {
                // The process may still be bound to the ports about to go
                // back to the pool; tell it to quit first.
                if !matches!(ready, Some(PipelineEvent::Exited { .. })) {
                    if let Err(int_err) = handle.interrupt() {
                        debug!(peer_id, %int_err, "pipeline interrupt during unwind failed");
                    }
                }
                self.unwind(&mut peer).await;
                peer.transition(RecordingState::Idle);
                Err(err)
            }
        }
    }

    /// Request a stop of the peer's recording.
    ///
    /// Idempotent: a stop while neither recording nor awaiting readiness
    /// succeeds as a no-op. During `AwaitingReady` the interrupt reaches a
    /// pipeline that never emitted its marker and the pending start unwinds
    /// when it observes the exit. The interrupt is delivered after the
    /// configured stop grace period; cleanup runs when the exit monitor
    /// observes the process exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown peer.
    pub async fn stop_recording(&self, peer_id: &str) -> Result<()> {
        let peer_arc = self
            .registry
            .get(peer_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("peer {peer_id}")))?;
        let mut peer = peer_arc.lock().await;

        if !matches!(
            peer.state,
            RecordingState::Recording | RecordingState::AwaitingReady
        ) {
            debug!(peer_id, state = %peer.state, "stop requested while not recording; no-op");
            return Ok(());
        }

        if peer.state == RecordingState::Recording {
            peer.transition(RecordingState::Stopping);
        }
        let pid = peer.recording.as_ref().and_then(|s| s.pipeline_pid);
        drop(peer);

        info!(peer_id, "recording stop requested");
        let grace = self.config.pipeline.stop_grace();
        let peer_id = peer_id.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match pid {
                Some(pid) => {
                    if let Err(err) = pipeline::interrupt_pid(pid) {
                        warn!(peer_id, pid, %err, "failed to interrupt pipeline");
                    }
                }
                None => warn!(peer_id, "no pipeline pid recorded; nothing to interrupt"),
            }
        });

        Ok(())
    }

    /// Acquire ports, persist the SDP file, set up engine resources and
    /// spawn the pipeline. Runs under the peer lock; the caller awaits
    /// readiness and unwinds on error.
    async fn acquire_and_spawn(&self, peer: &mut Peer) -> Result<PipelineHandle> {
        let branches = peer.present_branches();
        let kinds: Vec<PortKind> = ACQUISITION_ORDER
            .into_iter()
            .filter(|kind| {
                branches
                    .iter()
                    .any(|branch| branch.rtp_kind() == *kind || branch.rtcp_kind() == *kind)
            })
            .collect();

        let ports = self.ports.acquire_set(&kinds, &peer.id).await?;

        let recording = &self.config.recording;
        tokio::fs::create_dir_all(&recording.sdp_dir).await?;
        let sdp_path = sdp::sdp_file_path(&recording.sdp_dir, &peer.id);
        tokio::fs::write(&sdp_path, sdp::session_description(&ports)).await?;

        let output_dir = recording
            .output_dir
            .join("chats")
            .join(&peer.room_id)
            .join("peers")
            .join(&peer.id);
        tokio::fs::create_dir_all(&output_dir).await?;
        let output_path = output_dir.join("video.webm");

        peer.recording = Some(RecordingSession {
            session_id: peer.id.clone(),
            ports: ports.clone(),
            sdp_path: sdp_path.clone(),
            output_path: output_path.clone(),
            pipeline_pid: None,
        });

        for branch in &branches {
            let producer_id = peer
                .producer(*branch)
                .ok_or_else(|| AppError::Media(format!("{branch} producer vanished")))?
                .to_owned();

            let rtp_port = ports.get(&branch.rtp_kind()).copied().ok_or_else(|| {
                AppError::Media(format!("no {branch} rtp port despite live producer"))
            })?;
            let rtcp_port = ports.get(&branch.rtcp_kind()).copied().ok_or_else(|| {
                AppError::Media(format!("no {branch} rtcp port despite live producer"))
            })?;

            let transport = self.engine.create_plain_transport().await?;
            transport
                .connect(recording.listen_ip, rtp_port, rtcp_port)
                .await?;
            let consumer = transport.consume(&producer_id, true).await?;

            peer.handles.insert(
                *branch,
                MediaHandle {
                    transport,
                    consumer,
                },
            );
        }

        peer.transition(RecordingState::AwaitingReady);
        let spec = PipelineSpec {
            sdp_path,
            output_path,
            has_audio: branches.contains(&MediaKind::Audio),
            has_video: branches.contains(&MediaKind::Video),
        };
        let command = pipeline::build_command(&spec, &self.config.pipeline);
        let handle = pipeline::spawn_pipeline(&command, self.config.pipeline.ready_settle())?;

        // The pid is recorded before readiness so a stop request can reach
        // a process that never emits its marker.
        if let Some(session) = peer.recording.as_mut() {
            session.pipeline_pid = handle.pid();
        }

        Ok(handle)
    }

    /// Undo a partially set-up session: close engine handles, remove the
    /// SDP file, release any claimed ports. Best-effort; failures are logged.
    async fn unwind(&self, peer: &mut Peer) {
        for (_, media) in peer.handles.drain() {
            media.consumer.close().await;
            media.transport.close().await;
        }

        if let Some(session) = peer.recording.take() {
            if let Err(err) = tokio::fs::remove_file(&session.sdp_path).await {
                debug!(path = %session.sdp_path.display(), %err, "sdp file not removed during unwind");
            }
        }

        if let Err(err) = self.ports.release(&peer.id).await {
            warn!(peer_id = %peer.id, %err, "port release failed during unwind");
        }
    }

    /// Watch the supervisor's events for this session; on exit, classify it,
    /// run cleanup and hand the artifact to post-processing.
    fn spawn_exit_monitor(&self, peer_arc: Arc<Mutex<Peer>>, mut handle: PipelineHandle) {
        let ports = self.ports.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let cleanup_delay = self.config.pipeline.sdp_cleanup_delay();

        tokio::spawn(async move {
            while let Some(event) = handle.next_event().await {
                match event {
                    PipelineEvent::Ready => {
                        // Late duplicate readiness; nothing to do.
                    }
                    PipelineEvent::Exited { code, signal } => {
                        if let Err(err) = pipeline::classify_exit(code, signal) {
                            warn!(%err, "output file might be corrupt");
                        } else {
                            info!("recording stopped cleanly");
                        }

                        finalize(&peer_arc, &ports, &dispatcher, cleanup_delay).await;
                        break;
                    }
                }
            }
        });
    }
}

/// Resume every paused consumer of the session's branches.
async fn resume_consumers(peer: &Peer) -> Result<()> {
    for media in peer.handles.values() {
        media.consumer.resume().await?;
    }
    Ok(())
}

/// Cleanup after process exit: close engine resources, schedule SDP file
/// deletion after the grace delay, release ports, return the peer to idle,
/// then dispatch post-processing without blocking on its result.
async fn finalize(
    peer_arc: &Arc<Mutex<Peer>>,
    ports: &PortRepo,
    dispatcher: &Arc<PostProcessDispatcher>,
    cleanup_delay: std::time::Duration,
) {
    let mut peer = peer_arc.lock().await;
    peer.transition(RecordingState::Finalizing);

    for (_, media) in peer.handles.drain() {
        media.consumer.close().await;
        media.transport.close().await;
    }

    let Some(session) = peer.recording.take() else {
        peer.transition(RecordingState::Idle);
        return;
    };

    // The engine's internal state settles before the description file goes.
    let sdp_path = session.sdp_path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(cleanup_delay).await;
        if let Err(err) = tokio::fs::remove_file(&sdp_path).await {
            warn!(path = %sdp_path.display(), %err, "failed to delete sdp file");
        }
    });

    // Release is idempotent; retry once on storage error, never fatal.
    if let Err(err) = ports.release(&session.session_id).await {
        warn!(session_id = %session.session_id, %err, "port release failed; retrying");
        if let Err(err) = ports.release(&session.session_id).await {
            warn!(session_id = %session.session_id, %err, "port release retry failed");
        }
    }

    peer.transition(RecordingState::Idle);
    let room_id = peer.room_id.clone();
    let peer_id = peer.id.clone();
    info!(peer_id, "recording finalized");
    drop(peer);

    let dispatcher = Arc::clone(dispatcher);
    tokio::spawn(async move {
        if let Err(err) = dispatcher
            .dispatch(&session.output_path, &room_id, &peer_id)
            .await
        {
            warn!(peer_id, %err, "post-processing dispatch failed");
        }
    });
}
