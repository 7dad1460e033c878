//! Error types for the transfer module.

use thiserror::Error;

/// Errors that can occur while fetching a source document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or protocol failure.
    #[error("Request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The response is not a PDF.
    #[error("Not a PDF content type: {content_type}")]
    ContentType { content_type: String },

    /// The body exceeds the configured size limit.
    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    /// The body ended before the announced length.
    #[error("Transfer truncated: received {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },

    /// No data arrived within the stall timeout.
    #[error("Transfer stalled for {secs} seconds")]
    Stalled { secs: u64 },

    /// The response body was empty.
    #[error("Empty response body")]
    Empty,

    /// Writing to working storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The job was cancelled between chunks.
    #[error("Transfer cancelled")]
    Cancelled,
}

impl FetchError {
    /// Creates a network error from any displayable cause.
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a content type mismatch error.
    pub fn content_type(content_type: impl Into<String>) -> Self {
        Self::ContentType {
            content_type: content_type.into(),
        }
    }
}
