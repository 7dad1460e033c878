//! Transfer module: fetching source documents and streaming results back.
//!
//! Fetching goes through the [`Fetcher`] trait so the coordinator can be
//! driven by a mock in tests. [`HttpFetcher`] is the production
//! implementation; it writes the body in fixed-size chunks, reports progress
//! per chunk and honours cancellation between chunks.
//!
//! [`serve`] is the reverse direction: it streams a finished result file
//! while holding a storage lease, so the file cannot be reclaimed mid-download.

mod error;
mod http;
mod serve;
mod sink;
mod traits;
mod types;

pub use error::FetchError;
pub use http::HttpFetcher;
pub use serve::{serve, ServeStream};
pub use sink::ChunkSink;
pub use traits::Fetcher;
pub use types::{is_pdf_content_type, FetchOutcome, SourceInfo, TransferProgress};
