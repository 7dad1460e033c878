//! Transformer trait definition.

use std::path::Path;
use tokio::sync::mpsc;

use super::error::TransformError;
use super::types::{ImageUnit, TransformProgress, TransformReport};
use crate::job::{CancelFlag, JobParams};

/// Rewrites the images embedded in a document.
///
/// Transforming is CPU-bound, so the trait is synchronous and callers run it
/// on a blocking thread. Progress is sent with `blocking_send` once per image;
/// implementations must not be called from inside an async context.
///
/// The output is all-or-nothing: on error nothing is written to `output`
/// that a caller should use.
pub trait Transformer: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Reads `input`, rewrites every image per `params` and writes `output`.
    fn transform(
        &self,
        input: &Path,
        output: &Path,
        params: &JobParams,
        progress_tx: &mpsc::Sender<TransformProgress>,
        cancel: &CancelFlag,
    ) -> Result<TransformReport, TransformError>;

    /// Lists the images a transform would touch, without decoding them.
    fn inspect(&self, input: &Path) -> Result<Vec<ImageUnit>, TransformError>;
}
