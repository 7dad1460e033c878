use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use super::stream::EventStream;
use crate::job::{Job, ProgressEvent};

struct Snapshot {
    job: Job,
    seq: u64,
    message: Option<String>,
}

/// Single-producer, multi-observer event channel for one job.
pub struct ProgressChannel {
    snapshot: Mutex<Snapshot>,
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressChannel {
    /// Creates a channel whose replay reflects `job` until the first publish.
    pub fn new(job: &Job, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            snapshot: Mutex::new(Snapshot {
                job: job.clone(),
                seq: 0,
                message: None,
            }),
            sender,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the new state and broadcasts it under the next sequence number.
    ///
    /// Holding the snapshot lock while sending keeps subscription and
    /// publication ordered: a subscriber sees either the old snapshot and
    /// the new event, or the new snapshot alone.
    pub fn publish(&self, job: &Job, message: Option<String>) -> ProgressEvent {
        let mut snapshot = self.lock();
        snapshot.seq += 1;
        snapshot.job = job.clone();
        snapshot.message = message.clone();

        let event = ProgressEvent::from_job(job, snapshot.seq, message);
        // No receivers is fine.
        let _ = self.sender.send(event.clone());
        event
    }

    /// Opens a new observer stream starting with a replay event.
    pub fn subscribe(self: &Arc<Self>) -> EventStream {
        let snapshot = self.lock();
        let receiver = self.sender.subscribe();
        let replay = replay_event(&snapshot);
        drop(snapshot);
        EventStream::new(self, receiver, replay)
    }

    /// Fresh receiver positioned after the current state, with the replay
    /// describing that state. Used to recover a lagged observer.
    pub(super) fn resync(&self) -> (broadcast::Receiver<ProgressEvent>, ProgressEvent) {
        let snapshot = self.lock();
        let receiver = self.sender.subscribe();
        (receiver, replay_event(&snapshot))
    }

    /// Synthetic event describing the current state.
    pub fn replay(&self) -> ProgressEvent {
        replay_event(&self.lock())
    }

    /// Current job state as last published.
    pub fn snapshot(&self) -> Job {
        self.lock().job.clone()
    }

    pub fn last_seq(&self) -> u64 {
        self.lock().seq
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn replay_event(snapshot: &Snapshot) -> ProgressEvent {
    let mut event = ProgressEvent::from_job(&snapshot.job, snapshot.seq, snapshot.message.clone());
    event.replay = true;
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ErrorKind, JobParams, Phase};

    fn job() -> Job {
        Job::new("https://example.com/a.pdf", JobParams::default())
    }

    #[test]
    fn test_publish_increments_seq() {
        let mut job = job();
        let channel = ProgressChannel::new(&job, 8);

        let first = channel.publish(&job, None);
        job.advance_to(Phase::Fetching).unwrap();
        let second = channel.publish(&job, Some("connecting".to_string()));

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(channel.last_seq(), 2);
        assert_eq!(channel.snapshot().phase, Phase::Fetching);
    }

    #[test]
    fn test_replay_reflects_latest_state() {
        let mut job = job();
        let channel = ProgressChannel::new(&job, 8);
        job.advance_to(Phase::Fetching).unwrap();
        job.set_progress(0.5);
        channel.publish(&job, Some("halfway".to_string()));

        let replay = channel.replay();
        assert!(replay.replay);
        assert_eq!(replay.seq, 1);
        assert_eq!(replay.phase, Phase::Fetching);
        assert_eq!(replay.progress, 0.5);
        assert_eq!(replay.message.as_deref(), Some("halfway"));
    }

    #[test]
    fn test_replay_of_failed_job_carries_error() {
        let mut job = job();
        let channel = ProgressChannel::new(&job, 8);
        job.fail(ErrorKind::Fetch, "HTTP 404").unwrap();
        channel.publish(&job, None);

        let replay = channel.replay();
        assert!(replay.is_terminal());
        assert_eq!(replay.error_kind, Some(ErrorKind::Fetch));
        assert_eq!(replay.message.as_deref(), Some("HTTP 404"));
    }

    #[tokio::test]
    async fn test_observer_count() {
        let job = job();
        let channel = Arc::new(ProgressChannel::new(&job, 8));
        assert_eq!(channel.observer_count(), 0);
        let stream = channel.subscribe();
        assert_eq!(channel.observer_count(), 1);
        drop(stream);
        assert_eq!(channel.observer_count(), 0);
    }
}
