use futures::Stream;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use super::channel::ProgressChannel;
use crate::job::ProgressEvent;

/// One observer's view of a job's progress.
///
/// The stream holds only a weak reference to its channel, so dropping the
/// channel closes every open stream.
pub struct EventStream {
    channel: Weak<ProgressChannel>,
    receiver: broadcast::Receiver<ProgressEvent>,
    pending: Option<ProgressEvent>,
    last_seq: u64,
    finished: bool,
}

impl EventStream {
    pub(super) fn new(
        channel: &Arc<ProgressChannel>,
        receiver: broadcast::Receiver<ProgressEvent>,
        replay: ProgressEvent,
    ) -> Self {
        Self {
            channel: Arc::downgrade(channel),
            receiver,
            pending: Some(replay),
            last_seq: 0,
            finished: false,
        }
    }

    /// Next event, or `None` after the terminal event or once the channel closes.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }
        if let Some(replay) = self.pending.take() {
            return Some(self.deliver(replay));
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) if event.seq <= self.last_seq => continue,
                Ok(event) => return Some(self.deliver(event)),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Observer lagged, replaying current state");
                    let Some(channel) = self.channel.upgrade() else {
                        self.finished = true;
                        return None;
                    };
                    let (receiver, replay) = channel.resync();
                    self.receiver = receiver;
                    if replay.seq > self.last_seq {
                        return Some(self.deliver(replay));
                    }
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    fn deliver(&mut self, event: ProgressEvent) -> ProgressEvent {
        self.last_seq = event.seq;
        if event.is_terminal() {
            self.finished = true;
        }
        event
    }

    /// Adapts the observer into a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut events| async move {
            events.next().await.map(|event| (event, events))
        })
    }
}
