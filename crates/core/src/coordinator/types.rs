//! Types for the coordinator module.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

use crate::storage::FileLease;
use crate::transfer::{serve, ServeStream};

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job was still queued and is now failed.
    Cancelled,
    /// The job is running; it stops at its next checkpoint.
    Requested,
    /// The job had already completed or failed.
    AlreadyFinished,
}

/// Status of the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Jobs currently holding a permit.
    pub active_jobs: usize,
    /// Maximum concurrent jobs.
    pub max_concurrent: usize,
    /// Jobs waiting for a permit.
    pub queued_jobs: usize,
    /// Jobs known to the coordinator, finished ones included.
    pub tracked_jobs: usize,
    /// Total jobs completed since startup.
    pub total_completed: u64,
    /// Total jobs failed since startup.
    pub total_failed: u64,
}

/// A completed job's output, opened for download.
///
/// Holds a storage lease so the file outlives any concurrent reclaim until
/// the stream is finished or dropped.
#[derive(Debug)]
pub struct ResultDownload {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub(super) lease: FileLease,
    pub(super) chunk_size: usize,
}

impl ResultDownload {
    /// Streams the file, consuming the lease.
    pub async fn into_stream(self) -> io::Result<ServeStream> {
        serve(&self.path, self.lease, self.chunk_size).await
    }
}
