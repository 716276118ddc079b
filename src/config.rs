//! Global configuration parsing and validation.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Recording network and filesystem settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RecordingConfig {
    /// Address the plain RTP transports connect to (where the pipeline listens).
    #[serde(default = "default_listen_ip")]
    pub listen_ip: IpAddr,
    /// First port of the pre-provisioned pool (inclusive).
    #[serde(default = "default_port_range_min")]
    pub port_range_min: u16,
    /// End of the pre-provisioned pool (exclusive).
    #[serde(default = "default_port_range_max")]
    pub port_range_max: u16,
    /// Directory holding per-session SDP files.
    #[serde(default = "default_sdp_dir")]
    pub sdp_dir: PathBuf,
    /// Root directory for finished container files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_listen_ip() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)
}

fn default_port_range_min() -> u16 {
    5000
}

fn default_port_range_max() -> u16 {
    5100
}

fn default_sdp_dir() -> PathBuf {
    PathBuf::from("recording/sdps")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("recording/results")
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            listen_ip: default_listen_ip(),
            port_range_min: default_port_range_min(),
            port_range_max: default_port_range_max(),
            sdp_dir: default_sdp_dir(),
            output_dir: default_output_dir(),
        }
    }
}

/// External transcoding pipeline settings.
///
/// All grace periods are named, configurable durations rather than inline
/// waits so the state machine's timing contract stays testable.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Pipeline launcher binary.
    #[serde(default = "default_program")]
    pub program: String,
    /// Value for the `GST_DEBUG` environment variable merged over the
    /// inherited environment.
    #[serde(default = "default_gst_log_level")]
    pub gst_log_level: String,
    /// Settle delay after the readiness marker before consumers resume.
    #[serde(default = "default_ready_settle_ms")]
    pub ready_settle_ms: u64,
    /// Delay between a stop request and the interrupt signal.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Delay before the session description file is deleted after teardown.
    #[serde(default = "default_sdp_cleanup_delay_ms")]
    pub sdp_cleanup_delay_ms: u64,
}

fn default_program() -> String {
    "gst-launch-1.0".into()
}

fn default_gst_log_level() -> String {
    "3".into()
}

fn default_ready_settle_ms() -> u64 {
    1000
}

fn default_stop_grace_ms() -> u64 {
    1500
}

fn default_sdp_cleanup_delay_ms() -> u64 {
    5000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            gst_log_level: default_gst_log_level(),
            ready_settle_ms: default_ready_settle_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            sdp_cleanup_delay_ms: default_sdp_cleanup_delay_ms(),
        }
    }
}

impl PipelineConfig {
    /// Settle delay applied after the readiness marker is observed.
    #[must_use]
    pub fn ready_settle(&self) -> Duration {
        Duration::from_millis(self.ready_settle_ms)
    }

    /// Grace period between a stop request and the interrupt signal.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Grace period before the per-session SDP file is removed.
    #[must_use]
    pub fn sdp_cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.sdp_cleanup_delay_ms)
    }
}

/// Post-processing collaborator settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PostProcessConfig {
    /// Object-storage bucket receiving finished recordings.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Work-queue name for downstream jobs.
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Job name attached to each enqueued record.
    #[serde(default = "default_job")]
    pub job: String,
}

fn default_bucket() -> String {
    "video-calls".into()
}

fn default_queue() -> String {
    "chatVideo".into()
}

fn default_job() -> String {
    "video".into()
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            queue: default_queue(),
            job: default_job(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Path to the `SQLite` database holding the port pool.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Recording network and filesystem settings.
    #[serde(default)]
    pub recording: RecordingConfig,
    /// Pipeline process settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Post-processing collaborator settings.
    #[serde(default)]
    pub postprocess: PostProcessConfig,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("recorder.sqlite")
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.recording.port_range_min >= self.recording.port_range_max {
            return Err(AppError::Config(
                "recording port range must be non-empty (min < max)".into(),
            ));
        }

        // Each session needs up to four ports; a smaller pool can never record.
        if self.recording.port_range_max - self.recording.port_range_min < 4 {
            return Err(AppError::Config(
                "recording port range must hold at least four ports".into(),
            ));
        }

        if self.pipeline.program.is_empty() {
            return Err(AppError::Config("pipeline program must not be empty".into()));
        }

        Ok(())
    }
}
