//! External transcoding pipeline: command construction and process
//! supervision.

pub mod command;
pub mod supervisor;

pub use command::{build_command, PipelineCommand, PipelineSpec};
pub use supervisor::{
    classify_exit, interrupt_pid, spawn_pipeline, PipelineEvent, PipelineHandle, READY_MARKER,
};
