//! HTTP(S) fetcher built on reqwest.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::error::FetchError;
use super::sink::ChunkSink;
use super::traits::Fetcher;
use super::types::{is_pdf_content_type, FetchOutcome, SourceInfo, TransferProgress};
use crate::config::TransferConfig;
use crate::job::CancelFlag;

/// Streams remote documents over HTTP(S).
///
/// Only the connect timeout is set on the client; a slow but steady body is
/// fine, while a body that stops producing bytes trips the stall timeout.
pub struct HttpFetcher {
    client: Client,
    config: TransferConfig,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: TransferConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::network("<client>", e))?;
        Ok(Self { client, config })
    }

    /// Create a fetcher with the default transfer settings.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(TransferConfig::default())
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Starts a GET and reads one chunk, so a source whose body cannot be
    /// streamed fails the probe. The rest of the body is never read.
    async fn first_chunk(&self, url: &str) -> Result<usize, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        self.check_response(url, &response)?;

        let stall = Duration::from_secs(self.config.stall_timeout_secs);
        let mut body = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(stall, body.next())
                .await
                .map_err(|_| FetchError::Stalled {
                    secs: self.config.stall_timeout_secs,
                })?;
            match next {
                Some(Ok(bytes)) if bytes.is_empty() => continue,
                Some(Ok(bytes)) => return Ok(bytes.len()),
                Some(Err(e)) => return Err(FetchError::network(url, e)),
                None => return Err(FetchError::Empty),
            }
        }
    }

    /// Status, content type and announced length checks shared by GET and HEAD.
    fn check_response(&self, url: &str, response: &Response) -> Result<(), FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if self.config.require_pdf_content_type {
            if let Some(value) = header_content_type(response) {
                if !is_pdf_content_type(&value) {
                    return Err(FetchError::content_type(value));
                }
            }
        }

        if let Some(size) = header_content_length(response) {
            if size > self.config.max_size_bytes {
                return Err(FetchError::TooLarge {
                    size,
                    limit: self.config.max_size_bytes,
                });
            }
        }
        Ok(())
    }
}

fn header_content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

// `Response::content_length` reports the body size hint, which is zero for HEAD.
fn header_content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: mpsc::Sender<TransferProgress>,
        cancel: &CancelFlag,
    ) -> Result<FetchOutcome, FetchError> {
        debug!(url = %url, "Starting fetch");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        self.check_response(url, &response)?;

        let content_type = header_content_type(&response);
        let total = header_content_length(&response);
        let stall = Duration::from_secs(self.config.stall_timeout_secs);

        let mut sink = ChunkSink::create(
            destination,
            self.config.chunk_size_bytes,
            total,
            self.config.max_size_bytes,
            progress_tx,
            cancel.clone(),
        )
        .await?;

        let mut body = response.bytes_stream();
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let next = tokio::time::timeout(stall, body.next())
                .await
                .map_err(|_| FetchError::Stalled {
                    secs: self.config.stall_timeout_secs,
                })?;
            match next {
                Some(Ok(bytes)) => sink.write(&bytes).await?,
                Some(Err(e)) => return Err(FetchError::network(url, e)),
                None => break,
            }
        }

        let bytes = sink.finish().await?;
        if let Some(expected) = total {
            if bytes < expected {
                return Err(FetchError::Truncated {
                    received: bytes,
                    expected,
                });
            }
        }

        info!(url = %url, bytes, "Fetch complete");

        Ok(FetchOutcome {
            path: destination.to_path_buf(),
            bytes,
            content_type,
        })
    }

    async fn probe(&self, url: &str) -> Result<SourceInfo, FetchError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        self.check_response(url, &response)?;

        let content_type = header_content_type(&response);
        if self.config.require_pdf_content_type
            && !content_type.as_deref().is_some_and(is_pdf_content_type)
        {
            return Err(FetchError::content_type(
                content_type.unwrap_or_else(|| "<missing>".to_string()),
            ));
        }

        self.first_chunk(url).await?;

        Ok(SourceInfo {
            url: url.to_string(),
            status: response.status().as_u16(),
            content_type,
            size_bytes: header_content_length(&response),
        })
    }
}
