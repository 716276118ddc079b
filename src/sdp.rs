//! Session description builder.
//!
//! Pure, stateless rendering of the SDP document the transcoding pipeline
//! reads its media from. Writing the result to disk and deleting it later
//! are coordinator responsibilities.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::port::PortKind;

/// Opus payload type used on the audio media line.
const AUDIO_PAYLOAD_TYPE: u8 = 111;
/// VP8 payload type used on the video media line.
const VIDEO_PAYLOAD_TYPE: u8 = 96;

/// Render a session description from the allocated kind→port mapping.
///
/// An audio section is emitted only when both `Audio` and `AudioControl`
/// ports are present, likewise for video — a recording of an audio-only peer
/// never references video ports.
#[must_use]
pub fn session_description(ports: &HashMap<PortKind, u16>) -> String {
    let mut lines = vec![
        "v=0".to_owned(),
        "o=- 0 0 IN IP4 127.0.0.1".to_owned(),
        "s=-".to_owned(),
        "c=IN IP4 127.0.0.1".to_owned(),
        "t=0 0".to_owned(),
    ];

    if let (Some(audio), Some(audio_rtcp)) = (
        ports.get(&PortKind::Audio),
        ports.get(&PortKind::AudioControl),
    ) {
        lines.push(format!("m=audio {audio} RTP/AVPF {AUDIO_PAYLOAD_TYPE}"));
        lines.push(format!("a=rtcp:{audio_rtcp}"));
        lines.push(format!("a=rtpmap:{AUDIO_PAYLOAD_TYPE} opus/48000/2"));
        lines.push(format!(
            "a=fmtp:{AUDIO_PAYLOAD_TYPE} minptime=10;useinbandfec=1"
        ));
    }

    if let (Some(video), Some(video_rtcp)) = (
        ports.get(&PortKind::Video),
        ports.get(&PortKind::VideoControl),
    ) {
        lines.push(format!("m=video {video} RTP/AVPF {VIDEO_PAYLOAD_TYPE}"));
        lines.push(format!("a=rtcp:{video_rtcp}"));
        lines.push(format!("a=rtpmap:{VIDEO_PAYLOAD_TYPE} VP8/90000"));
    }

    lines.join("\n")
}

/// Well-known per-session path of the description file.
#[must_use]
pub fn sdp_file_path(dir: &Path, session_id: &str) -> PathBuf {
    dir.join(format!("input-vp8-{session_id}.sdp"))
}
