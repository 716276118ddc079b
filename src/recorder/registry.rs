//! Peer registry.
//!
//! An explicitly owned registry object held by the service root — no
//! module-level mutable maps. Each peer entry is individually locked so one
//! peer's recording transitions never block another's.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::media::{MediaConsumer, PlainTransport};
use crate::models::port::MediaKind;
use crate::models::session::{RecordingSession, RecordingState};

/// Engine-side resources owned exclusively by one media branch of a
/// recording session.
pub struct MediaHandle {
    /// The plain RTP transport feeding the pipeline.
    pub transport: Box<dyn PlainTransport>,
    /// The consumer pulling media off the peer's producer.
    pub consumer: Box<dyn MediaConsumer>,
}

/// A room participant tracked by the recorder.
///
/// Producer/consumer/transport registries for live relaying belong to the
/// media engine; the recorder only tracks producer ids per branch plus the
/// peer's single recording session.
pub struct Peer {
    /// Peer identity; doubles as the recording session id.
    pub id: String,
    /// Room the peer belongs to.
    pub room_id: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Live producer ids by media branch.
    producers: HashMap<MediaKind, String>,
    /// Current recording lifecycle state.
    pub state: RecordingState,
    /// Durable facts of the live recording, if any.
    pub recording: Option<RecordingSession>,
    /// Engine-side handles of the live recording, by branch.
    pub handles: HashMap<MediaKind, MediaHandle>,
}

impl Peer {
    /// Create a peer with no producers and no recording.
    #[must_use]
    pub fn new(id: impl Into<String>, room_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            room_id: room_id.into(),
            display_name: display_name.into(),
            producers: HashMap::new(),
            state: RecordingState::Idle,
            recording: None,
            handles: HashMap::new(),
        }
    }

    /// Move the recording lifecycle to `next`.
    ///
    /// Debug builds assert the move is one the state machine permits.
    pub fn transition(&mut self, next: RecordingState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal recording state transition {} -> {next}",
            self.state
        );
        self.state = next;
    }

    /// Register (or replace) the live producer for a branch.
    pub fn set_producer(&mut self, kind: MediaKind, producer_id: impl Into<String>) {
        self.producers.insert(kind, producer_id.into());
    }

    /// Remove the producer for a branch, e.g. when its transport closes.
    pub fn clear_producer(&mut self, kind: MediaKind) {
        self.producers.remove(&kind);
    }

    /// Producer id for a branch, if one is live.
    #[must_use]
    pub fn producer(&self, kind: MediaKind) -> Option<&str> {
        self.producers.get(&kind).map(String::as_str)
    }

    /// Whether the peer has at least one live producer.
    #[must_use]
    pub fn has_producer(&self) -> bool {
        !self.producers.is_empty()
    }

    /// Branches with a live producer, audio first.
    #[must_use]
    pub fn present_branches(&self) -> Vec<MediaKind> {
        [MediaKind::Audio, MediaKind::Video]
            .into_iter()
            .filter(|kind| self.producers.contains_key(kind))
            .collect()
    }
}

/// Registry of peers keyed by identity.
#[derive(Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<String, Arc<Mutex<Peer>>>>,
}

impl PeerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer, returning its shared handle. Replaces any existing
    /// entry with the same identity.
    pub async fn insert(&self, peer: Peer) -> Arc<Mutex<Peer>> {
        let id = peer.id.clone();
        let entry = Arc::new(Mutex::new(peer));
        self.peers.lock().await.insert(id, Arc::clone(&entry));
        entry
    }

    /// Look up a peer by identity.
    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Peer>>> {
        self.peers.lock().await.get(id).cloned()
    }

    /// Remove a peer, returning its handle if present.
    pub async fn remove(&self, id: &str) -> Option<Arc<Mutex<Peer>>> {
        self.peers.lock().await.remove(id)
    }

    /// Number of registered peers.
    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }

    /// Whether the registry holds no peers.
    pub async fn is_empty(&self) -> bool {
        self.peers.lock().await.is_empty()
    }
}
