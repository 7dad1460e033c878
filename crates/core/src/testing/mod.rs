//! Testing utilities: a mock fetcher and in-memory PDF fixtures.
//!
//! Lets the coordinator and the HTTP layer be exercised end to end without
//! network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use pressroom_core::testing::{fixtures, MockFetcher};
//!
//! let fetcher = MockFetcher::new();
//! let pdf = fixtures::pdf_with_images(10, &fixtures::ImageSpec::rgb(64, 32));
//! fetcher.add_document("https://example.com/paper.pdf", pdf).await;
//! ```

pub mod fixtures;
mod mock_fetcher;

pub use mock_fetcher::MockFetcher;
