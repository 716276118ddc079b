//! Post-processing handoff.
//!
//! Uploads a finished recording to object storage and enqueues the
//! downstream job. Fire-and-forget from the coordinator's perspective:
//! failures are surfaced to the caller for logging but never roll back
//! recording cleanup.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::media::BoxFuture;
use crate::{AppError, Result};

/// Object-storage collaborator (implementation out of scope).
pub trait ObjectStorage: Send + Sync {
    /// Upload a local file under the given bucket and key; returns the
    /// stored object's location.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Upload`](crate::AppError::Upload) on failure.
    fn upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Work-queue collaborator (implementation out of scope).
pub trait WorkQueue: Send + Sync {
    /// Enqueue a named job with a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Enqueue`](crate::AppError::Enqueue) on failure.
    fn enqueue<'a>(
        &'a self,
        queue: &'a str,
        job: &'a str,
        payload: serde_json::Value,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Uploads finished artifacts and enqueues downstream jobs.
#[derive(Clone)]
pub struct PostProcessDispatcher {
    storage: Arc<dyn ObjectStorage>,
    queue: Arc<dyn WorkQueue>,
    bucket: String,
    queue_name: String,
    job_name: String,
}

impl PostProcessDispatcher {
    /// Create a dispatcher over the given collaborators.
    #[must_use]
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        queue: Arc<dyn WorkQueue>,
        bucket: String,
        queue_name: String,
        job_name: String,
    ) -> Self {
        Self {
            storage,
            queue,
            bucket,
            queue_name,
            job_name,
        }
    }

    /// Upload the finished file and enqueue the downstream job.
    ///
    /// The storage key is derived from the room and peer identifiers so
    /// recordings land under `chats/<room>/peers/<peer>/`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Upload`](crate::AppError::Upload) or
    /// [`AppError::Enqueue`](crate::AppError::Enqueue); cleanup already
    /// performed by the coordinator is never rolled back.
    pub async fn dispatch(
        &self,
        output_path: &Path,
        room_id: &str,
        peer_id: &str,
    ) -> Result<String> {
        let file_name = output_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AppError::Upload(format!("output path has no file name: {}", output_path.display()))
            })?;
        let key = format!("chats/{room_id}/peers/{peer_id}/{file_name}");

        let location = self
            .storage
            .upload(&self.bucket, &key, output_path)
            .await?;
        info!(room_id, peer_id, %location, "recording uploaded");

        self.queue
            .enqueue(
                &self.queue_name,
                &self.job_name,
                json!({ "roomId": room_id, "peerId": peer_id }),
            )
            .await?;
        info!(room_id, peer_id, queue = %self.queue_name, "post-processing job enqueued");

        Ok(location)
    }
}
