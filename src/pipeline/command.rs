//! Pipeline command construction.
//!
//! Builds the `gst-launch-1.0` argument vector for one recording: an SDP
//! file source, a demux stage, a `WebM` mux stage, a file sink, and zero, one
//! or two branch fragments depending on which consumers exist.

use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;

/// Inputs describing one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    /// Session description file the pipeline reads media from.
    pub sdp_path: PathBuf,
    /// Destination container file.
    pub output_path: PathBuf,
    /// Whether an audio consumer exists for this recording.
    pub has_audio: bool,
    /// Whether a video consumer exists for this recording.
    pub has_video: bool,
}

/// A fully constructed pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineCommand {
    /// Launcher binary.
    pub program: String,
    /// Argument vector, one token per element.
    pub args: Vec<String>,
    /// Environment overrides merged over the inherited environment.
    pub env: Vec<(String, String)>,
}

fn location_token(path: &Path) -> String {
    format!("location={}", path.display())
}

/// Build the launch command for a recording.
#[must_use]
pub fn build_command(spec: &PipelineSpec, config: &PipelineConfig) -> PipelineCommand {
    let mut args: Vec<String> = vec![
        "--eos-on-shutdown".into(),
        "filesrc".into(),
        location_token(&spec.sdp_path),
        "!".into(),
        "sdpdemux".into(),
        "timeout=0".into(),
        "name=demux".into(),
        "webmmux".into(),
        "name=mux".into(),
        "!".into(),
        "filesink".into(),
        location_token(&spec.output_path),
    ];

    if spec.has_audio {
        args.extend(
            ["demux.", "!", "queue", "!", "rtpopusdepay", "!", "opusparse", "!", "mux."]
                .map(String::from),
        );
    }

    if spec.has_video {
        args.extend(["demux.", "!", "queue", "!", "rtpvp8depay", "!", "mux."].map(String::from));
    }

    PipelineCommand {
        program: config.program.clone(),
        args,
        env: vec![("GST_DEBUG".into(), config.gst_log_level.clone())],
    }
}
