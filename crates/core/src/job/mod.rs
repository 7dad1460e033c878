//! Job model: identity, parameters, the phase state machine and progress events.

mod cancel;
mod error;
mod types;
mod validate;

pub use cancel::CancelFlag;
pub use error::JobError;
pub use types::{
    ErrorKind, ImageFormat, InvalidTransition, Job, JobFailure, JobId, JobParams, JobResult,
    Phase, ProgressEvent,
};
pub use validate::{validate_params, validate_source_url, SubmitRequest, ValidationError};
