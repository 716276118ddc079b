//! Unit tests for configuration parsing, defaults and validation.

use std::net::IpAddr;

use relay_recorder::config::GlobalConfig;
use relay_recorder::AppError;

#[test]
fn empty_toml_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");

    assert_eq!(config.recording.port_range_min, 5000);
    assert_eq!(config.recording.port_range_max, 5100);
    assert_eq!(
        config.recording.listen_ip,
        "127.0.0.1".parse::<IpAddr>().expect("ip")
    );
    assert_eq!(config.pipeline.program, "gst-launch-1.0");
    assert_eq!(config.pipeline.ready_settle_ms, 1000);
    assert_eq!(config.pipeline.stop_grace_ms, 1500);
    assert_eq!(config.pipeline.sdp_cleanup_delay_ms, 5000);
    assert_eq!(config.postprocess.bucket, "video-calls");
    assert_eq!(config.postprocess.queue, "chatVideo");
    assert_eq!(config.postprocess.job, "video");
}

#[test]
fn explicit_values_override_defaults() {
    let raw = r#"
db_path = "/var/lib/recorder/pool.sqlite"

[recording]
listen_ip = "10.0.0.7"
port_range_min = 6000
port_range_max = 6020

[pipeline]
program = "gst-launch-1.0"
gst_log_level = "4"
stop_grace_ms = 500

[postprocess]
bucket = "staging-video-calls"
"#;
    let config = GlobalConfig::from_toml_str(raw).expect("parse");

    assert_eq!(config.recording.port_range_min, 6000);
    assert_eq!(config.recording.port_range_max, 6020);
    assert_eq!(
        config.recording.listen_ip,
        "10.0.0.7".parse::<IpAddr>().expect("ip")
    );
    assert_eq!(config.pipeline.gst_log_level, "4");
    assert_eq!(config.pipeline.stop_grace_ms, 500);
    // Untouched sections keep defaults.
    assert_eq!(config.pipeline.ready_settle_ms, 1000);
    assert_eq!(config.postprocess.bucket, "staging-video-calls");
    assert_eq!(config.postprocess.queue, "chatVideo");
}

#[test]
fn inverted_port_range_is_rejected() {
    let raw = r"
[recording]
port_range_min = 6000
port_range_max = 5000
";
    let err = GlobalConfig::from_toml_str(raw).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn too_small_port_range_is_rejected() {
    let raw = r"
[recording]
port_range_min = 5000
port_range_max = 5003
";
    let err = GlobalConfig::from_toml_str(raw).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn empty_pipeline_program_is_rejected() {
    let raw = r#"
[pipeline]
program = ""
"#;
    let err = GlobalConfig::from_toml_str(raw).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = GlobalConfig::from_toml_str("recording = 3").expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn grace_periods_convert_to_durations() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");

    assert_eq!(config.pipeline.ready_settle().as_millis(), 1000);
    assert_eq!(config.pipeline.stop_grace().as_millis(), 1500);
    assert_eq!(config.pipeline.sdp_cleanup_delay().as_millis(), 5000);
}
