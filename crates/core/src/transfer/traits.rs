//! Fetcher trait definition.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::FetchError;
use super::types::{FetchOutcome, SourceInfo, TransferProgress};
use crate::job::CancelFlag;

/// Downloads a source document into working storage.
///
/// Implementations must write the body chunk by chunk, send one
/// [`TransferProgress`] per chunk written, and check `cancel` between
/// chunks. A full `progress_tx` applies backpressure; a closed one is ignored.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Streams `url` into `destination`.
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: mpsc::Sender<TransferProgress>,
        cancel: &CancelFlag,
    ) -> Result<FetchOutcome, FetchError>;

    /// Checks a URL without downloading the body.
    async fn probe(&self, url: &str) -> Result<SourceInfo, FetchError>;
}
