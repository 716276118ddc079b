//! Recording session model and lifecycle helpers.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::port::PortKind;

/// Lifecycle state of a peer's recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// No recording in progress.
    Idle,
    /// Ports, SDP file and media handles are being set up.
    Acquiring,
    /// Pipeline spawned; waiting for its readiness marker.
    AwaitingReady,
    /// Media is flowing into the pipeline.
    Recording,
    /// Interrupt requested; waiting for the process to exit.
    Stopping,
    /// Process exited; cleanup in progress.
    Finalizing,
}

impl RecordingState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Acquiring)
                | (Self::Acquiring, Self::AwaitingReady | Self::Idle)
                | (Self::AwaitingReady, Self::Recording | Self::Finalizing | Self::Idle)
                | (Self::Recording, Self::Stopping | Self::Finalizing)
                | (Self::Stopping, Self::Finalizing)
                | (Self::Finalizing, Self::Idle)
        )
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::AwaitingReady => "awaiting_ready",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Finalizing => "finalizing",
        };
        f.write_str(s)
    }
}

/// In-memory state of one live recording, owned exclusively by its peer.
///
/// Media handles and the pipeline handle live in the coordinator's session
/// bookkeeping; this struct carries the durable facts needed for cleanup.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    /// Session identifier (equals the peer identity).
    pub session_id: String,
    /// Ports claimed from the allocator, by kind.
    pub ports: HashMap<PortKind, u16>,
    /// Path of the session description file.
    pub sdp_path: PathBuf,
    /// Destination container file written by the pipeline.
    pub output_path: PathBuf,
    /// Pipeline process id once spawned.
    pub pipeline_pid: Option<u32>,
}
