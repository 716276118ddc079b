//! Pipeline process supervisor.
//!
//! Runs the external transcoding process and exposes its lifecycle as typed
//! events: readiness (scanned from stdout) and exit (code and/or terminating
//! signal). The secondary output stream carries the pipeline's progress logs;
//! it is forwarded to tracing line-by-line and never parsed for control
//! signals.

use std::process::Stdio;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use crate::pipeline::command::PipelineCommand;
use crate::{AppError, Result};

/// Stdout line prefix indicating the pipeline reached its playing state.
pub const READY_MARKER: &str = "Setting pipeline to PLAYING";

/// Signal number delivered by a graceful interrupt (`SIGINT`).
const INTERRUPT_SIGNAL: i32 = 2;

/// Lifecycle events emitted by a supervised pipeline process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The readiness marker was observed and the settle delay has elapsed.
    Ready,
    /// The process exited.
    Exited {
        /// Exit code, if the process terminated normally.
        code: Option<i32>,
        /// Terminating signal number, if killed by a signal (unix only).
        signal: Option<i32>,
    },
}

/// Handle to a supervised pipeline process.
///
/// Events arrive in spawn order: at most one `Ready`, always a final
/// `Exited`. If the process dies before emitting the readiness marker, the
/// first event is `Exited`.
#[derive(Debug)]
pub struct PipelineHandle {
    pid: Option<u32>,
    events: mpsc::Receiver<PipelineEvent>,
}

impl PipelineHandle {
    /// OS process id of the child, when still known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Receive the next lifecycle event; `None` once the channel is drained.
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Send a graceful interrupt to the process.
    ///
    /// No forced kill follows; the exit event arrives whenever the process
    /// decides to terminate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the signal cannot be delivered.
    pub fn interrupt(&self) -> Result<()> {
        let pid = self
            .pid
            .ok_or_else(|| AppError::Io("pipeline pid unknown".into()))?;
        interrupt_pid(pid)
    }
}

/// Send a graceful interrupt (`SIGINT`) to a pipeline process by pid.
///
/// # Errors
///
/// Returns `AppError::Io` if the signal cannot be delivered.
#[cfg(unix)]
pub fn interrupt_pid(pid: u32) -> Result<()> {
    let pid = i32::try_from(pid).map_err(|_| AppError::Io("pipeline pid out of range".into()))?;

    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), nix::sys::signal::Signal::SIGINT)
        .map_err(|err| AppError::Io(format!("failed to interrupt pipeline: {err}")))
}

/// Graceful interrupt is not supported off unix.
///
/// # Errors
///
/// Always returns `AppError::Io`.
#[cfg(not(unix))]
pub fn interrupt_pid(_pid: u32) -> Result<()> {
    Err(AppError::Io(
        "graceful pipeline interrupt requires a unix host".into(),
    ))
}

/// Spawn the pipeline process and start its supervision tasks.
///
/// `settle` is the delay between observing the readiness marker and signaling
/// `Ready`, giving the pipeline graph time to settle before consumers resume.
///
/// # Errors
///
/// Returns `AppError::PipelineSpawn` if the process fails to start.
pub fn spawn_pipeline(command: &PipelineCommand, settle: Duration) -> Result<PipelineHandle> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(command.env.iter().cloned())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::PipelineSpawn(format!("{}: {err}", command.program)))?;

    let pid = child.id();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::PipelineSpawn("pipeline stdout not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::PipelineSpawn("pipeline stderr not captured".into()))?;

    info!(pid = pid.unwrap_or(0), program = %command.program, "pipeline process spawned");

    let (tx, events) = mpsc::channel(8);

    tokio::spawn(scan_stdout(stdout, tx.clone(), settle));
    tokio::spawn(forward_stderr(stderr));
    tokio::spawn(async move {
        let event = match child.wait().await {
            Ok(status) => exit_event(&status),
            Err(err) => {
                warn!(%err, "failed to await pipeline exit");
                PipelineEvent::Exited {
                    code: None,
                    signal: None,
                }
            }
        };

        if let PipelineEvent::Exited { code, signal } = event {
            info!(?code, ?signal, "pipeline process exited");
        }
        let _ = tx.send(event).await;
    });

    Ok(PipelineHandle { pid, events })
}

/// Classify a pipeline exit: `Ok` for a clean stop, the abnormal-exit error
/// otherwise.
///
/// Clean means terminated by the expected interrupt signal, or a normal exit
/// with code zero (or no code at all, on hosts that report neither).
///
/// # Errors
///
/// Returns `AppError::PipelineAbnormalExit` for any other signal or non-zero
/// code; the output file may be corrupt, but the recording is still handed
/// to post-processing.
pub fn classify_exit(code: Option<i32>, signal: Option<i32>) -> Result<()> {
    match (code, signal) {
        (_, Some(INTERRUPT_SIGNAL)) | (Some(0) | None, None) => Ok(()),
        (code, signal) => Err(AppError::PipelineAbnormalExit(format!(
            "code {code:?}, signal {signal:?}"
        ))),
    }
}

fn exit_event(status: &std::process::ExitStatus) -> PipelineEvent {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    PipelineEvent::Exited {
        code: status.code(),
        signal,
    }
}

/// Scan stdout for the readiness marker; keep draining afterwards so the
/// child never blocks on a full pipe.
async fn scan_stdout(stdout: ChildStdout, tx: mpsc::Sender<PipelineEvent>, settle: Duration) {
    let mut framed = FramedRead::new(stdout, LinesCodec::new());
    let mut ready_sent = false;

    while let Some(item) = framed.next().await {
        match item {
            Ok(line) => {
                if !ready_sent && line.starts_with(READY_MARKER) {
                    ready_sent = true;
                    tokio::time::sleep(settle).await;
                    if tx.send(PipelineEvent::Ready).await.is_err() {
                        break;
                    }
                }
            }
            Err(err) => {
                warn!(%err, "pipeline stdout read error");
                break;
            }
        }
    }
}

/// Forward the pipeline's progress log lines to tracing.
async fn forward_stderr(stderr: ChildStderr) {
    let mut framed = FramedRead::new(stderr, LinesCodec::new());

    while let Some(item) = framed.next().await {
        match item {
            Ok(line) => {
                if !line.is_empty() {
                    debug!(target: "relay_recorder::pipeline::gst", "{line}");
                }
            }
            Err(err) => {
                warn!(%err, "pipeline stderr read error");
                break;
            }
        }
    }
}
