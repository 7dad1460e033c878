//! Job coordinator: the owner of every job's state.
//!
//! Each submitted job gets a slot holding its [`Job`](crate::job::Job), a
//! [`ProgressChannel`](crate::progress::ProgressChannel) and a cancel flag,
//! plus one tokio task that drives it through
//! `queued -> fetching -> transforming -> completed`, or to `failed`.
//!
//! Image work runs on `spawn_blocking`; progress from the fetcher and the
//! transformer is forwarded into the slot, which publishes it in order.
//!
//! # Example
//!
//! ```ignore
//! use pressroom_core::{JobCoordinator, HttpFetcher, PdfTransformer};
//!
//! let coordinator = JobCoordinator::new(
//!     &config,
//!     Arc::new(HttpFetcher::new(config.transfer.clone())?),
//!     Arc::new(PdfTransformer::new()),
//! );
//! let id = coordinator.submit("https://example.com/paper.pdf", params).await?;
//! let mut events = coordinator.subscribe(&id).await?;
//! while let Some(event) = events.next().await {
//!     println!("{} {:.0}%", event.phase, event.overall);
//! }
//! ```

mod runner;
mod service;
mod slot;
mod types;

pub use service::JobCoordinator;
pub use types::{CancelOutcome, CoordinatorStats, ResultDownload};
