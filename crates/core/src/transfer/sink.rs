//! Chunked writer shared by fetcher implementations.

use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use super::error::FetchError;
use super::types::TransferProgress;
use crate::job::CancelFlag;

/// Re-chunks arbitrary body fragments into fixed-size writes.
///
/// Every full chunk is written, then reported, then followed by a
/// cancellation check. The size limit is enforced on bytes actually received.
pub struct ChunkSink {
    file: File,
    buffer: Vec<u8>,
    chunk_size: usize,
    received: u64,
    total: Option<u64>,
    limit: u64,
    progress_tx: mpsc::Sender<TransferProgress>,
    cancel: CancelFlag,
}

impl ChunkSink {
    /// Creates (or truncates) `path` and returns a sink writing to it.
    pub async fn create(
        path: &Path,
        chunk_size: usize,
        total: Option<u64>,
        limit: u64,
        progress_tx: mpsc::Sender<TransferProgress>,
        cancel: CancelFlag,
    ) -> Result<Self, FetchError> {
        let file = File::create(path).await?;
        let chunk_size = chunk_size.max(1);
        Ok(Self {
            file,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
            received: 0,
            total,
            limit,
            progress_tx,
            cancel,
        })
    }

    /// Bytes flushed to disk so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Appends a body fragment, flushing each chunk as it fills.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<(), FetchError> {
        while !data.is_empty() {
            let take = (self.chunk_size - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buffer.len() == self.chunk_size {
                self.flush_chunk().await?;
            }
        }
        Ok(())
    }

    /// Flushes the trailing partial chunk and returns the total byte count.
    pub async fn finish(mut self) -> Result<u64, FetchError> {
        if !self.buffer.is_empty() {
            self.flush_chunk().await?;
        }
        self.file.flush().await?;
        if self.received == 0 {
            return Err(FetchError::Empty);
        }
        Ok(self.received)
    }

    async fn flush_chunk(&mut self) -> Result<(), FetchError> {
        let len = self.buffer.len() as u64;
        if self.received + len > self.limit {
            return Err(FetchError::TooLarge {
                size: self.received + len,
                limit: self.limit,
            });
        }

        self.file.write_all(&self.buffer).await?;
        self.received += len;
        self.buffer.clear();

        let _ = self
            .progress_tx
            .send(TransferProgress {
                bytes_received: self.received,
                total_bytes: self.total,
            })
            .await;

        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        Ok(())
    }
}
