//! Port pool domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role tag for an allocated port.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    /// Audio RTP data.
    Audio,
    /// Audio RTCP control.
    AudioControl,
    /// Video RTP data.
    Video,
    /// Video RTCP control.
    VideoControl,
}

/// Fixed acquisition order used by multi-kind claims.
pub const ACQUISITION_ORDER: [PortKind; 4] = [
    PortKind::Audio,
    PortKind::AudioControl,
    PortKind::Video,
    PortKind::VideoControl,
];

impl PortKind {
    /// Stable string form stored in the `kind` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::AudioControl => "audio_rtcp",
            Self::Video => "video",
            Self::VideoControl => "video_rtcp",
        }
    }

    /// Parse the stored string form back into a kind.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(Self::Audio),
            "audio_rtcp" => Some(Self::AudioControl),
            "video" => Some(Self::Video),
            "video_rtcp" => Some(Self::VideoControl),
            _ => None,
        }
    }
}

impl std::fmt::Display for PortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media branch of a recording (one producer each at most).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Audio producer branch.
    Audio,
    /// Video producer branch.
    Video,
}

impl MediaKind {
    /// RTP data port kind for this branch.
    #[must_use]
    pub fn rtp_kind(self) -> PortKind {
        match self {
            Self::Audio => PortKind::Audio,
            Self::Video => PortKind::Video,
        }
    }

    /// RTCP control port kind for this branch.
    #[must_use]
    pub fn rtcp_kind(self) -> PortKind {
        match self {
            Self::Audio => PortKind::AudioControl,
            Self::Video => PortKind::VideoControl,
        }
    }

    /// Port kinds a recording of this branch needs, in acquisition order.
    #[must_use]
    pub fn port_kinds(self) -> [PortKind; 2] {
        [self.rtp_kind(), self.rtcp_kind()]
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// One pre-provisioned row of the durable port pool.
///
/// A slot is either fully free (`kind`, `session_id`, `locked_at` all absent)
/// or fully claimed (all three set); no partial state persists across a
/// successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSlot {
    /// Row identifier.
    pub id: i64,
    /// The port number; unique and immutable once provisioned.
    pub value: u16,
    /// Role tag when claimed.
    pub kind: Option<PortKind>,
    /// Owning recording session when claimed.
    pub session_id: Option<String>,
    /// Claim timestamp, set atomically with the allocation.
    pub locked_at: Option<DateTime<Utc>>,
}

impl PortSlot {
    /// Whether the slot is currently unclaimed.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.kind.is_none() && self.session_id.is_none() && self.locked_at.is_none()
    }
}
