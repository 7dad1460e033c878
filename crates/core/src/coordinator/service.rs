//! The job coordinator.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::runner::{JobRunner, PoolStats};
use super::slot::JobSlot;
use super::types::{CancelOutcome, CoordinatorStats, ResultDownload};
use crate::config::Config;
use crate::job::{
    validate_params, validate_source_url, ErrorKind, Job, JobError, JobId, JobParams, Phase,
    SubmitRequest,
};
use crate::metrics::{JOBS_SUBMITTED, RESULTS_SERVED};
use crate::progress::EventStream;
use crate::storage::WorkStorage;
use crate::transfer::Fetcher;
use crate::transform::Transformer;

/// Owns every job, runs each one on its own task and fans out its progress.
///
/// Concurrency is bounded by `coordinator.max_concurrent_jobs`; jobs beyond
/// the limit stay `queued` until a permit frees up.
pub struct JobCoordinator {
    fetcher: Arc<dyn Fetcher>,
    transformer: Arc<dyn Transformer>,
    storage: Arc<WorkStorage>,
    slots: Arc<RwLock<HashMap<JobId, Arc<JobSlot>>>>,
    semaphore: Arc<Semaphore>,
    stats: Arc<PoolStats>,
    max_concurrent: usize,
    event_buffer: usize,
    chunk_size: usize,
    retention: Duration,
    sweep_interval: Duration,
}

impl JobCoordinator {
    /// Creates a coordinator using the configured working directory.
    pub fn new(config: &Config, fetcher: Arc<dyn Fetcher>, transformer: Arc<dyn Transformer>) -> Self {
        let max_concurrent = config.coordinator.max_concurrent_jobs.max(1);
        Self {
            fetcher,
            transformer,
            storage: Arc::new(WorkStorage::from_config(&config.storage)),
            slots: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            stats: Arc::new(PoolStats::default()),
            max_concurrent,
            event_buffer: config.coordinator.event_buffer,
            chunk_size: config.transfer.chunk_size_bytes,
            retention: Duration::from_secs(config.storage.retention_secs),
            sweep_interval: Duration::from_secs(config.storage.sweep_interval_secs.max(1)),
        }
    }

    pub fn storage(&self) -> &Arc<WorkStorage> {
        &self.storage
    }

    fn runner(&self) -> JobRunner {
        JobRunner {
            fetcher: Arc::clone(&self.fetcher),
            transformer: Arc::clone(&self.transformer),
            storage: Arc::clone(&self.storage),
            semaphore: Arc::clone(&self.semaphore),
            stats: Arc::clone(&self.stats),
        }
    }

    async fn slot(&self, id: &JobId) -> Result<Arc<JobSlot>, JobError> {
        self.slots
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    /// Validates the request, registers a `queued` job and starts it in the
    /// background. Returns as soon as the job exists.
    pub async fn submit(&self, source_url: &str, params: JobParams) -> Result<JobId, JobError> {
        let url = validate_source_url(source_url)?;
        validate_params(&params)?;

        let job = Job::new(url, params);
        let id = job.id.clone();
        let slot = Arc::new(JobSlot::new(job, self.event_buffer));
        slot.announce("queued");

        self.slots.write().await.insert(id.clone(), Arc::clone(&slot));
        JOBS_SUBMITTED.inc();
        info!(job_id = %id, url = %source_url, "Job submitted");

        tokio::spawn(self.runner().run(slot));
        Ok(id)
    }

    /// Validates a raw client request, then submits it.
    pub async fn submit_request(&self, request: &SubmitRequest) -> Result<JobId, JobError> {
        let (url, params) = request.validate()?;
        self.submit(&url, params).await
    }

    pub async fn status(&self, id: &JobId) -> Result<Job, JobError> {
        Ok(self.slot(id).await?.snapshot())
    }

    /// All known jobs, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .slots
            .read()
            .await
            .values()
            .map(|slot| slot.snapshot())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn cancel(&self, id: &JobId) -> Result<CancelOutcome, JobError> {
        let slot = self.slot(id).await?;
        let outcome = slot.request_cancel();
        info!(job_id = %id, outcome = ?outcome, "Cancel requested");
        Ok(outcome)
    }

    /// Opens an event stream that starts with a replay of the current state.
    pub async fn subscribe(&self, id: &JobId) -> Result<EventStream, JobError> {
        Ok(self.slot(id).await?.channel().subscribe())
    }

    /// Leases a completed job's output for download.
    pub async fn open_result(&self, id: &JobId) -> Result<ResultDownload, JobError> {
        let job = self.slot(id).await?.snapshot();
        let result = match (job.phase, job.result) {
            (Phase::Completed, Some(result)) => result,
            (phase, _) => {
                return Err(JobError::ResultNotReady {
                    id: id.clone(),
                    phase,
                })
            }
        };

        let lease = self
            .storage
            .lease(id)
            .map_err(|_| JobError::ResultGone(id.clone()))?;
        let size = tokio::fs::metadata(&result.path)
            .await
            .map_err(|_| JobError::ResultGone(id.clone()))?
            .len();

        RESULTS_SERVED.inc();
        debug!(job_id = %id, size, "Result opened");
        Ok(ResultDownload {
            filename: result.filename,
            path: result.path,
            size,
            lease,
            chunk_size: self.chunk_size,
        })
    }

    /// Forgets a job: cancels it if still running and removes its files.
    pub async fn discard(&self, id: &JobId) -> Result<(), JobError> {
        let slot = self
            .slots
            .write()
            .await
            .remove(id)
            .ok_or_else(|| JobError::NotFound(id.clone()))?;

        if slot.request_cancel() == CancelOutcome::Requested {
            slot.fail(ErrorKind::Cancelled, "cancelled");
        }
        self.storage.reclaim(id).await;
        self.storage.forget(id);
        info!(job_id = %id, "Job discarded");
        Ok(())
    }

    /// Reclaims the files of jobs finished longer than the retention period
    /// ago, and drops jobs finished more than twice that long ago.
    ///
    /// Returns the number of directories reclaimed.
    pub async fn reap_expired(&self) -> usize {
        let now = Utc::now();
        let mut reclaimed = 0;
        let mut expired = Vec::new();

        for (id, slot) in self.slots.read().await.iter() {
            let Some(finished_at) = slot.snapshot().finished_at else {
                continue;
            };
            let age = (now - finished_at).to_std().unwrap_or_default();
            if age < self.retention {
                continue;
            }
            if !self.storage.is_reclaimed(id) && self.storage.reclaim(id).await {
                reclaimed += 1;
            }
            if age >= self.retention * 2 {
                expired.push(id.clone());
            }
        }

        if !expired.is_empty() {
            let mut slots = self.slots.write().await;
            for id in &expired {
                slots.remove(id);
                self.storage.forget(id);
            }
        }
        if reclaimed > 0 || !expired.is_empty() {
            info!(reclaimed, forgotten = expired.len(), "Retention sweep");
        }
        reclaimed
    }

    /// Runs [`reap_expired`](Self::reap_expired) every `sweep_interval_secs`.
    pub fn start_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(coordinator.sweep_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                coordinator.reap_expired().await;
            }
        })
    }

    /// Stops accepting work: queued jobs fail as cancelled, running ones are
    /// asked to stop.
    pub async fn shutdown(&self) {
        self.semaphore.close();
        let slots = self.slots.read().await;
        for slot in slots.values() {
            slot.request_cancel();
        }
        info!(jobs = slots.len(), "Coordinator shut down");
    }

    pub async fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            active_jobs: self.stats.active.load(Ordering::Relaxed) as usize,
            max_concurrent: self.max_concurrent,
            queued_jobs: self.stats.queued.load(Ordering::Relaxed) as usize,
            tracked_jobs: self.slots.read().await.len(),
            total_completed: self.stats.total_completed.load(Ordering::Relaxed),
            total_failed: self.stats.total_failed.load(Ordering::Relaxed),
        }
    }
}
