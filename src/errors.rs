//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Recording requested for a peer with no live producer.
    NoMediaSource(String),
    /// The durable port pool has no free slot left.
    PoolExhausted(String),
    /// A multi-kind acquisition failed midway; already-claimed ports were rolled back.
    PartialAllocation(String),
    /// Media-engine capability call failure (transport/consumer setup).
    Media(String),
    /// The transcoding pipeline process could not be spawned.
    PipelineSpawn(String),
    /// The pipeline process exited before emitting its readiness marker.
    PipelineNotReady(String),
    /// The pipeline exited with a non-clean code or signal; output may be corrupt.
    PipelineAbnormalExit(String),
    /// Upload to object storage failed.
    Upload(String),
    /// Enqueue on the work queue failed.
    Enqueue(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::NoMediaSource(msg) => write!(f, "no media source: {msg}"),
            Self::PoolExhausted(msg) => write!(f, "port pool exhausted: {msg}"),
            Self::PartialAllocation(msg) => write!(f, "partial allocation rolled back: {msg}"),
            Self::Media(msg) => write!(f, "media engine: {msg}"),
            Self::PipelineSpawn(msg) => write!(f, "pipeline spawn: {msg}"),
            Self::PipelineNotReady(msg) => write!(f, "pipeline not ready: {msg}"),
            Self::PipelineAbnormalExit(msg) => write!(f, "pipeline abnormal exit: {msg}"),
            Self::Upload(msg) => write!(f, "upload: {msg}"),
            Self::Enqueue(msg) => write!(f, "enqueue: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
