//! Mock fetcher for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::job::CancelFlag;
use crate::transfer::{
    ChunkSink, FetchError, FetchOutcome, Fetcher, SourceInfo, TransferProgress,
};

/// Mock implementation of the Fetcher trait.
///
/// Serves documents registered by URL from memory, through the same chunked
/// writer as the real fetcher:
/// - Unknown URLs answer HTTP 404
/// - A per-chunk delay makes transfers slow enough to cancel
/// - A queued error fails the next operation
///
/// # Example
///
/// ```rust,ignore
/// use pressroom_core::testing::{fixtures, MockFetcher};
///
/// let fetcher = MockFetcher::new();
/// fetcher.add_document("https://example.com/a.pdf", fixtures::pdf_with_images(3, &spec)).await;
/// fetcher.set_chunk_delay(Duration::from_millis(20)).await;
/// ```
#[derive(Debug, Clone)]
pub struct MockFetcher {
    documents: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    fetches: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<FetchError>>>,
    chunk_size: Arc<RwLock<usize>>,
    chunk_delay_ms: Arc<RwLock<u64>>,
    announce_length: Arc<RwLock<bool>>,
    max_size_bytes: u64,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            fetches: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            chunk_size: Arc::new(RwLock::new(4096)),
            chunk_delay_ms: Arc::new(RwLock::new(0)),
            announce_length: Arc::new(RwLock::new(true)),
            max_size_bytes: 500 * 1024 * 1024,
        }
    }

    /// Register a document body for a URL.
    pub async fn add_document(&self, url: impl Into<String>, body: Vec<u8>) {
        self.documents.write().await.insert(url.into(), body);
    }

    /// URLs fetched so far, in order.
    pub async fn recorded_fetches(&self) -> Vec<String> {
        self.fetches.read().await.clone()
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: FetchError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_chunk_size(&self, size: usize) {
        *self.chunk_size.write().await = size.max(1);
    }

    /// Delay before each chunk is written.
    pub async fn set_chunk_delay(&self, delay: Duration) {
        *self.chunk_delay_ms.write().await = delay.as_millis() as u64;
    }

    /// Whether fetches report a total length (determinate progress).
    pub async fn set_announce_length(&self, announce: bool) {
        *self.announce_length.write().await = announce;
    }

    async fn take_error(&self) -> Option<FetchError> {
        self.next_error.write().await.take()
    }

    async fn lookup(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.documents
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: mpsc::Sender<TransferProgress>,
        cancel: &CancelFlag,
    ) -> Result<FetchOutcome, FetchError> {
        self.fetches.write().await.push(url.to_string());
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        let body = self.lookup(url).await?;

        let chunk_size = *self.chunk_size.read().await;
        let delay = Duration::from_millis(*self.chunk_delay_ms.read().await);
        let total = if *self.announce_length.read().await {
            Some(body.len() as u64)
        } else {
            None
        };

        let mut sink = ChunkSink::create(
            destination,
            chunk_size,
            total,
            self.max_size_bytes,
            progress_tx,
            cancel.clone(),
        )
        .await?;
        for chunk in body.chunks(chunk_size) {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            sink.write(chunk).await?;
        }
        let bytes = sink.finish().await?;

        Ok(FetchOutcome {
            path: destination.to_path_buf(),
            bytes,
            content_type: Some("application/pdf".to_string()),
        })
    }

    async fn probe(&self, url: &str) -> Result<SourceInfo, FetchError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        let body = self.lookup(url).await?;
        if body.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(SourceInfo {
            url: url.to_string(),
            status: 200,
            content_type: Some("application/pdf".to_string()),
            size_bytes: Some(body.len() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unknown_url_is_404() {
        let fetcher = MockFetcher::new();
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(8);

        let err = fetcher
            .fetch("https://example.com/missing.pdf", &dir.path().join("a"), tx, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_writes_body_and_reports_chunks() {
        let fetcher = MockFetcher::new();
        fetcher.add_document("https://example.com/a.pdf", vec![1u8; 10]).await;
        fetcher.set_chunk_size(4).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.pdf");
        let (tx, mut rx) = mpsc::channel(8);

        let outcome = fetcher
            .fetch("https://example.com/a.pdf", &dest, tx, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(outcome.bytes, 10);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 10);

        let mut count = 0;
        while let Ok(p) = rx.try_recv() {
            assert_eq!(p.total_bytes, Some(10));
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(fetcher.recorded_fetches().await.len(), 1);
    }
}
