//! Types for the transfer module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Byte-level progress of a running fetch, reported once per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub bytes_received: u64,
    /// `None` when the server did not announce a length.
    pub total_bytes: Option<u64>,
}

impl TransferProgress {
    /// Fraction received, or `None` when progress is indeterminate.
    pub fn fraction(&self) -> Option<f32> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some((self.bytes_received as f64 / total as f64).min(1.0) as f32)
            }
            _ => None,
        }
    }
}

/// A completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    pub content_type: Option<String>,
}

/// What a HEAD request reveals about a source URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub url: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Whether a Content-Type header value denotes a PDF.
pub fn is_pdf_content_type(value: &str) -> bool {
    value.to_ascii_lowercase().contains("pdf")
}
