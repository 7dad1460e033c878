//! The single owner of one job's mutable state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::types::CancelOutcome;
use crate::job::{CancelFlag, ErrorKind, InvalidTransition, Job, JobId, JobResult, Phase, ProgressEvent};
use crate::progress::ProgressChannel;

/// Every mutation happens under `job` and is published before the lock is
/// released, so events leave in the order the state changed.
pub(super) struct JobSlot {
    id: JobId,
    job: Mutex<Job>,
    channel: Arc<ProgressChannel>,
    cancel: CancelFlag,
}

impl JobSlot {
    pub(super) fn new(job: Job, event_buffer: usize) -> Self {
        let channel = Arc::new(ProgressChannel::new(&job, event_buffer));
        Self {
            id: job.id.clone(),
            job: Mutex::new(job),
            channel,
            cancel: CancelFlag::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Job> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn id(&self) -> &JobId {
        &self.id
    }

    pub(super) fn channel(&self) -> &Arc<ProgressChannel> {
        &self.channel
    }

    pub(super) fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub(super) fn snapshot(&self) -> Job {
        self.lock().clone()
    }

    pub(super) fn is_terminal(&self) -> bool {
        self.lock().is_terminal()
    }

    /// Publishes the current state as-is. Used once, for the initial `queued` event.
    pub(super) fn announce(&self, message: &str) -> ProgressEvent {
        let job = self.lock();
        self.channel.publish(&job, Some(message.to_string()))
    }

    pub(super) fn advance(&self, phase: Phase, message: &str) -> Result<ProgressEvent, InvalidTransition> {
        let mut job = self.lock();
        job.advance_to(phase)?;
        Ok(self.channel.publish(&job, Some(message.to_string())))
    }

    /// Records phase progress. A `None` fraction publishes the message alone
    /// (indeterminate progress). Nothing is published once the job is terminal.
    pub(super) fn progress(&self, fraction: Option<f32>, message: Option<String>) -> Option<ProgressEvent> {
        let mut job = self.lock();
        if job.is_terminal() {
            return None;
        }
        let changed = fraction.is_some_and(|f| job.set_progress(f));
        if !changed && message.is_none() {
            return None;
        }
        Some(self.channel.publish(&job, message))
    }

    pub(super) fn complete(&self, result: JobResult) -> Result<ProgressEvent, InvalidTransition> {
        let mut job = self.lock();
        job.complete(result)?;
        Ok(self.channel.publish(&job, Some("completed".to_string())))
    }

    /// Fails the job unless it already reached a terminal phase.
    pub(super) fn fail(&self, kind: ErrorKind, message: impl Into<String>) -> Option<ProgressEvent> {
        let mut job = self.lock();
        job.fail(kind, message).ok()?;
        Some(self.channel.publish(&job, None))
    }

    /// Raises the cancel flag. A queued job fails on the spot; a running one
    /// notices at its next checkpoint.
    pub(super) fn request_cancel(&self) -> CancelOutcome {
        let mut job = self.lock();
        if job.is_terminal() {
            return CancelOutcome::AlreadyFinished;
        }
        self.cancel.cancel();
        if job.phase != Phase::Queued {
            return CancelOutcome::Requested;
        }
        match job.fail(ErrorKind::Cancelled, "cancelled") {
            Ok(()) => {
                self.channel.publish(&job, None);
                CancelOutcome::Cancelled
            }
            Err(_) => CancelOutcome::AlreadyFinished,
        }
    }
}
