pub mod config;
pub mod coordinator;
pub mod job;
pub mod metrics;
pub mod progress;
pub mod storage;
pub mod testing;
pub mod transfer;
pub mod transform;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, CoordinatorConfig,
    ServerConfig, StorageConfig, TransferConfig,
};
pub use coordinator::{CancelOutcome, CoordinatorStats, JobCoordinator, ResultDownload};
pub use job::{
    CancelFlag, ErrorKind, ImageFormat, Job, JobError, JobFailure, JobId, JobParams, JobResult,
    Phase, ProgressEvent, SubmitRequest, ValidationError,
};
pub use progress::{EventStream, ProgressChannel};
pub use storage::{FileLease, StorageError, WorkStorage};
pub use transfer::{FetchError, Fetcher, HttpFetcher, SourceInfo, TransferProgress};
pub use transform::{PdfTransformer, TransformError, Transformer};
