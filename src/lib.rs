#![forbid(unsafe_code)]

//! Call recording for a multi-party media relay: durable port pooling, SDP
//! generation, transcoding pipeline supervision, and post-processing handoff.

pub mod config;
pub mod errors;
pub mod media;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod postprocess;
pub mod recorder;
pub mod sdp;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
