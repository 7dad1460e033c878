use std::sync::Arc;

use super::work::WorkStorage;
use crate::job::JobId;

/// Keeps a job's directory alive while a reader streams from it.
///
/// Dropping the lease releases it. A lease marked with [`FileLease::complete`]
/// additionally asks for the directory to be reclaimed once no other lease
/// remains, when the storage is configured to remove results after download.
#[derive(Debug)]
pub struct FileLease {
    storage: Arc<WorkStorage>,
    job_id: JobId,
    consumed: bool,
}

impl FileLease {
    pub(super) fn new(storage: Arc<WorkStorage>, job_id: JobId) -> Self {
        Self {
            storage,
            job_id,
            consumed: false,
        }
    }

    /// Records that the reader saw the whole file.
    pub fn complete(mut self) {
        self.consumed = true;
    }
}

impl Drop for FileLease {
    fn drop(&mut self) {
        self.storage.release(&self.job_id, self.consumed);
    }
}
