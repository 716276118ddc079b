//! Recording orchestration: peer registry and per-peer coordinator.

pub mod coordinator;
pub mod registry;

pub use coordinator::RecordingCoordinator;
pub use registry::{MediaHandle, Peer, PeerRegistry};
