//! Background execution of one job: fetch, transform, publish the outcome.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::slot::JobSlot;
use crate::job::{ErrorKind, JobError, JobId, JobResult, Phase};
use crate::metrics::{ACTIVE_JOBS, BYTES_FETCHED, IMAGES_TRANSFORMED, JOBS_FINISHED, JOB_DURATION};
use crate::storage::{StorageError, WorkStorage};
use crate::transfer::{FetchError, Fetcher, TransferProgress};
use crate::transform::{TransformError, TransformProgress, Transformer};

const PROGRESS_BUFFER: usize = 64;

/// Tracks statistics for the worker pool.
#[derive(Default)]
pub(super) struct PoolStats {
    pub(super) active: AtomicU64,
    pub(super) queued: AtomicU64,
    pub(super) total_completed: AtomicU64,
    pub(super) total_failed: AtomicU64,
}

/// Everything a background job needs, cloned out of the coordinator.
#[derive(Clone)]
pub(super) struct JobRunner {
    pub(super) fetcher: Arc<dyn Fetcher>,
    pub(super) transformer: Arc<dyn Transformer>,
    pub(super) storage: Arc<WorkStorage>,
    pub(super) semaphore: Arc<Semaphore>,
    pub(super) stats: Arc<PoolStats>,
}

impl JobRunner {
    /// Runs the job to a terminal phase. Never returns an error: every
    /// failure ends up as the job's single terminal event.
    pub(super) async fn run(self, slot: Arc<JobSlot>) {
        let id = slot.id().clone();

        self.stats.queued.fetch_add(1, Ordering::Relaxed);
        let permit = Arc::clone(&self.semaphore).acquire_owned().await;
        self.stats.queued.fetch_sub(1, Ordering::Relaxed);

        let _permit = match permit {
            Ok(permit) => permit,
            Err(_) => {
                // Semaphore closed: the coordinator is shutting down.
                slot.fail(ErrorKind::Cancelled, "cancelled");
                return;
            }
        };

        if slot.is_terminal() {
            debug!(job_id = %id, "Job finished before it started");
            return;
        }
        if slot.cancel_flag().is_cancelled() {
            slot.fail(ErrorKind::Cancelled, "cancelled");
            return;
        }

        self.stats.active.fetch_add(1, Ordering::Relaxed);
        ACTIVE_JOBS.inc();
        let start = Instant::now();

        let outcome = self.execute(&slot).await.and_then(|result| {
            // A cancel that lands after the last checkpoint still wins.
            if slot.cancel_flag().is_cancelled() {
                Err(JobError::Cancelled)
            } else {
                Ok(result)
            }
        });

        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        ACTIVE_JOBS.dec();

        let label = match outcome {
            Ok(result) => {
                let filename = result.filename.clone();
                let compression = result.compression_percent;
                match slot.complete(result) {
                    Ok(_) => {
                        self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                        info!(
                            job_id = %id,
                            filename = %filename,
                            compression_percent = compression,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Job completed"
                        );
                        "completed"
                    }
                    Err(e) => {
                        // Lost a race with a cancel that already failed the job.
                        debug!(job_id = %id, error = %e, "Job finished elsewhere");
                        self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
                        self.discard_files(&id).await;
                        ErrorKind::Cancelled.as_str()
                    }
                }
            }
            Err(e) => {
                let kind = e.kind();
                if slot.fail(kind, e.failure_message()).is_some() {
                    match kind {
                        ErrorKind::Cancelled => info!(job_id = %id, "Job cancelled"),
                        _ => warn!(job_id = %id, kind = %kind, error = %e, "Job failed"),
                    }
                }
                self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
                self.discard_files(&id).await;
                kind.as_str()
            }
        };

        JOBS_FINISHED.with_label_values(&[label]).inc();
        JOB_DURATION
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
    }

    async fn execute(&self, slot: &Arc<JobSlot>) -> Result<JobResult, JobError> {
        let id = slot.id();
        let job = slot.snapshot();
        let dir = self.storage.allocate(id).await.map_err(storage_failure)?;

        // Fetching
        slot.advance(Phase::Fetching, "fetching source document")
            .map_err(|_| JobError::Cancelled)?;
        info!(job_id = %id, url = %job.source_url, fetcher = self.fetcher.name(), "Fetching");

        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let forwarder = tokio::spawn(forward_transfer(Arc::clone(slot), rx));
        let fetched = self
            .fetcher
            .fetch(&job.source_url, &dir.source_path(), tx, slot.cancel_flag())
            .await;
        join_forwarder(id, forwarder).await;
        let fetched = fetched?;
        BYTES_FETCHED.inc_by(fetched.bytes);

        // Transforming
        slot.advance(Phase::Transforming, "transforming images")
            .map_err(|_| JobError::Cancelled)?;
        let filename = output_filename(&job.source_url);
        let output = dir.output_path(&filename);
        info!(
            job_id = %id,
            bytes = fetched.bytes,
            transformer = self.transformer.name(),
            "Transforming"
        );

        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let forwarder = tokio::spawn(forward_transform(Arc::clone(slot), rx));
        let transformer = Arc::clone(&self.transformer);
        let input = fetched.path.clone();
        let target = output.clone();
        let params = job.params.clone();
        let cancel = slot.cancel_flag().clone();
        let report = tokio::task::spawn_blocking(move || {
            transformer.transform(&input, &target, &params, &tx, &cancel)
        })
        .await;
        join_forwarder(id, forwarder).await;
        let report = report.map_err(|e| TransformError::Io(io::Error::other(e.to_string())))??;
        IMAGES_TRANSFORMED.inc_by(report.images.len() as u64);

        Ok(JobResult {
            filename,
            path: output,
            original_bytes: fetched.bytes,
            output_bytes: report.output_bytes,
            compression_percent: JobResult::compression_percent(fetched.bytes, report.output_bytes),
            images_transformed: report.images.len(),
        })
    }

    /// Failed jobs have nothing to download.
    async fn discard_files(&self, id: &JobId) {
        self.storage.reclaim(id).await;
        self.storage.forget(id);
    }
}

/// Waits for a progress forwarder. Returns `false` if it panicked or was aborted.
async fn join_forwarder(id: &JobId, forwarder: JoinHandle<()>) -> bool {
    match forwarder.await {
        Ok(()) => true,
        Err(e) => {
            warn!(job_id = %id, error = %e, "Progress forwarder failed");
            false
        }
    }
}

async fn forward_transfer(slot: Arc<JobSlot>, mut rx: mpsc::Receiver<TransferProgress>) {
    while let Some(progress) = rx.recv().await {
        match progress.fraction() {
            Some(fraction) => {
                slot.progress(Some(fraction), None);
            }
            None => {
                let message = format!("{} bytes received", progress.bytes_received);
                slot.progress(None, Some(message));
            }
        }
    }
}

async fn forward_transform(slot: Arc<JobSlot>, mut rx: mpsc::Receiver<TransformProgress>) {
    while let Some(progress) = rx.recv().await {
        let message = if progress.images_total == 0 {
            "no images to transform".to_string()
        } else {
            format!("image {}/{}", progress.images_done, progress.images_total)
        };
        slot.progress(Some(progress.fraction()), Some(message));
    }
}

fn storage_failure(err: StorageError) -> JobError {
    match err {
        StorageError::Io(e) => JobError::Fetch(FetchError::Io(e)),
        other => JobError::Fetch(FetchError::Io(io::Error::other(other.to_string()))),
    }
}

/// `<source stem>_converted.pdf`, from the last path segment of the URL.
pub(super) fn output_filename(url: &str) -> String {
    let segment = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();
    let decoded = urlencoding::decode(&segment)
        .map(|s| s.into_owned())
        .unwrap_or(segment);

    let stem = Path::new(&decoded)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim().trim_matches('.');

    let stem = if sanitized.is_empty() {
        "document"
    } else {
        sanitized
    };
    format!("{}_converted.pdf", stem)
}
