//! Unit tests for pipeline command construction and exit classification.

use std::path::PathBuf;

use relay_recorder::config::PipelineConfig;
use relay_recorder::pipeline::{build_command, classify_exit, PipelineSpec};
use relay_recorder::AppError;

fn spec(has_audio: bool, has_video: bool) -> PipelineSpec {
    PipelineSpec {
        sdp_path: PathBuf::from("/tmp/sdps/input-vp8-peer-1.sdp"),
        output_path: PathBuf::from("/tmp/results/chats/room-1/peers/peer-1/video.webm"),
        has_audio,
        has_video,
    }
}

#[test]
fn command_carries_source_demux_mux_and_sink() {
    let command = build_command(&spec(true, true), &PipelineConfig::default());

    assert_eq!(command.program, "gst-launch-1.0");
    assert_eq!(command.args[0], "--eos-on-shutdown");
    assert!(command
        .args
        .contains(&"location=/tmp/sdps/input-vp8-peer-1.sdp".to_owned()));
    assert!(command.args.contains(&"sdpdemux".to_owned()));
    assert!(command.args.contains(&"timeout=0".to_owned()));
    assert!(command.args.contains(&"webmmux".to_owned()));
    assert!(command
        .args
        .contains(&"location=/tmp/results/chats/room-1/peers/peer-1/video.webm".to_owned()));
}

#[test]
fn both_branches_present_when_audio_and_video_exist() {
    let command = build_command(&spec(true, true), &PipelineConfig::default());

    assert!(command.args.contains(&"rtpopusdepay".to_owned()));
    assert!(command.args.contains(&"opusparse".to_owned()));
    assert!(command.args.contains(&"rtpvp8depay".to_owned()));
}

#[test]
fn audio_only_omits_the_video_branch() {
    let command = build_command(&spec(true, false), &PipelineConfig::default());

    assert!(command.args.contains(&"rtpopusdepay".to_owned()));
    assert!(!command.args.contains(&"rtpvp8depay".to_owned()));
}

#[test]
fn video_only_omits_the_audio_branch() {
    let command = build_command(&spec(false, true), &PipelineConfig::default());

    assert!(command.args.contains(&"rtpvp8depay".to_owned()));
    assert!(!command.args.contains(&"rtpopusdepay".to_owned()));
    assert!(!command.args.contains(&"opusparse".to_owned()));
}

#[test]
fn environment_merges_the_gst_log_level() {
    let config = PipelineConfig {
        gst_log_level: "4".into(),
        ..PipelineConfig::default()
    };
    let command = build_command(&spec(true, true), &config);

    assert!(command
        .env
        .contains(&("GST_DEBUG".to_owned(), "4".to_owned())));
}

#[test]
fn program_comes_from_configuration() {
    let config = PipelineConfig {
        program: "/usr/local/bin/gst-launch-1.0".into(),
        ..PipelineConfig::default()
    };
    let command = build_command(&spec(true, false), &config);

    assert_eq!(command.program, "/usr/local/bin/gst-launch-1.0");
}

#[test]
fn interrupt_signal_and_zero_code_classify_as_clean() {
    assert!(classify_exit(Some(0), None).is_ok());
    assert!(classify_exit(None, Some(2)).is_ok());
    // Interrupt without exit code on hosts reporting neither.
    assert!(classify_exit(None, None).is_ok());
}

#[test]
fn other_signals_and_nonzero_codes_classify_as_abnormal() {
    for (code, signal) in [(Some(1), None), (None, Some(9)), (Some(0), Some(15))] {
        let err = classify_exit(code, signal).expect_err("must be abnormal");
        assert!(matches!(err, AppError::PipelineAbnormalExit(_)));
    }
}
