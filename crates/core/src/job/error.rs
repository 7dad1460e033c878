//! Error type surfaced by the job coordinator.

use thiserror::Error;

use super::types::{ErrorKind, JobId, Phase};
use super::validate::ValidationError;
use crate::transfer::FetchError;
use crate::transform::TransformError;

/// Errors produced by coordinator operations and by the background job itself.
#[derive(Debug, Error)]
pub enum JobError {
    /// Rejected before a job was created.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Downloading the source failed.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Rewriting the document failed.
    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    /// Unknown job id.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// User-requested abort.
    #[error("cancelled")]
    Cancelled,

    /// The job has not reached `completed`.
    #[error("Result for job {id} is not ready (phase: {phase})")]
    ResultNotReady { id: JobId, phase: Phase },

    /// The job completed but its files were already reclaimed.
    #[error("Result for job {0} is no longer available")]
    ResultGone(JobId),
}

impl JobError {
    /// Classification carried by terminal events.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Fetch(FetchError::Cancelled) => ErrorKind::Cancelled,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Transform(TransformError::Cancelled) => ErrorKind::Cancelled,
            Self::Transform(_) => ErrorKind::Transform,
            Self::NotFound(_) | Self::ResultNotReady { .. } | Self::ResultGone(_) => {
                ErrorKind::NotFound
            }
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Message recorded on a failed job. Cancellation always reads "cancelled".
    pub fn failure_message(&self) -> String {
        match self.kind() {
            ErrorKind::Cancelled => "cancelled".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_kinds_collapse() {
        assert_eq!(JobError::Fetch(FetchError::Cancelled).kind(), ErrorKind::Cancelled);
        assert_eq!(
            JobError::Transform(TransformError::Cancelled).kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(JobError::Cancelled.failure_message(), "cancelled");
        assert_eq!(
            JobError::Fetch(FetchError::Cancelled).failure_message(),
            "cancelled"
        );
    }

    #[test]
    fn test_error_kind_preserved() {
        let fetch = JobError::Fetch(FetchError::Status {
            url: "https://example.com/a.pdf".to_string(),
            status: 404,
        });
        assert_eq!(fetch.kind(), ErrorKind::Fetch);
        assert!(fetch.failure_message().contains("404"));

        let transform = JobError::Transform(TransformError::Encrypted);
        assert_eq!(transform.kind(), ErrorKind::Transform);

        let validation = JobError::Validation(ValidationError::new("quality", "too high"));
        assert_eq!(validation.kind(), ErrorKind::Validation);

        assert_eq!(JobError::NotFound(JobId::from("x")).kind(), ErrorKind::NotFound);
    }
}
