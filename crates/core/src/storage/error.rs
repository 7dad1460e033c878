use thiserror::Error;

use crate::job::JobId;

/// Errors from the working storage arena.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("No working directory for job {0}")]
    Unknown(JobId),

    /// The directory has been deleted or is scheduled for deletion.
    #[error("Files for job {0} have been reclaimed")]
    Reclaimed(JobId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
